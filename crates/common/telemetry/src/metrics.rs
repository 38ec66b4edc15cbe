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

//! Prometheus text exposition for the default registry.

use prometheus::{Encoder, TextEncoder};

/// Content type of the Prometheus text format.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Render every metric registered in the default registry.
///
/// Encoding failures are logged and yield whatever was written so far.
#[must_use]
pub fn gather_text() -> String {
    let families = prometheus::gather();
    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&families, &mut buf) {
        tracing::warn!(error = %e, "failed to encode prometheus metrics");
    }
    String::from_utf8(buf).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use prometheus::{IntCounter, register_int_counter};

    use super::*;

    #[test]
    fn test_gather_includes_registered_counter() {
        let counter: IntCounter =
            register_int_counter!("telemetry_test_counter_total", "test counter").unwrap();
        counter.inc_by(3);
        let text = gather_text();
        assert!(text.contains("telemetry_test_counter_total 3"));
    }
}
