// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use snafu::Snafu;

/// Why a probe cycle produced no usable sample. Never leaves the probe loop;
/// each variant is logged and counted, then replaced by a fallback value.
#[derive(Debug, Snafu, strum_macros::IntoStaticStr)]
#[snafu(visibility(pub))]
#[strum(serialize_all = "snake_case")]
pub enum ProbeError {
    #[snafu(display("Failed to build HTTP client: {source}"))]
    BuildClient { source: reqwest::Error },

    #[snafu(display("Network error: {source}"))]
    Network { source: reqwest::Error },

    #[snafu(display("HTTP error {status} for URL: {url}"))]
    Http { status: u16, url: String },

    #[snafu(display("Expected {expected} bytes from {url}, received {received}"))]
    ShortBody {
        url:      String,
        expected: u64,
        received: u64,
    },

    #[snafu(display("Received more than the {expected} requested bytes from {url}"))]
    OversizedBody { url: String, expected: u64 },

    #[snafu(display("Failed to get asset size from server"))]
    AssetSizeUnknown,

    #[snafu(display("Sample of {mbps:.3} Mbps over {elapsed_secs:.6}s is implausible"))]
    Implausible { mbps: f64, elapsed_secs: f64 },
}

impl ProbeError {
    /// Short label used for metrics.
    #[must_use]
    pub fn reason(&self) -> &'static str { self.into() }

    /// Whether the server answered at all; transport failures are logged
    /// louder than rejected samples.
    #[must_use]
    pub const fn is_transport_failure(&self) -> bool { !matches!(self, Self::Implausible { .. }) }
}
