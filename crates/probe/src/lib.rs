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

//! Client side of the bandwidth probe.
//!
//! [`ThroughputProbe`] repeatedly downloads random byte ranges of a served
//! asset, turns each timed transfer into megabits per second and publishes
//! the latest value and the running maximum through a watch channel.
//! [`SpeedTest`] is the explicit one-shot variant measuring ping, download
//! and upload once.

pub mod asset_info;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod probe;
pub mod sample;
pub mod speedtest;
pub mod state;

pub use config::{FallbackConfig, PlausibilityConfig, ProbeConfig, ProbeEndpoints};
pub use error::ProbeError;
pub use probe::{ProbeHandle, ThroughputProbe};
pub use sample::{RangeRequest, ThroughputSample};
pub use speedtest::{SpeedTest, SpeedTestConfig, SpeedTestReport};
pub use state::{ProbeSnapshot, Reading, SampleOrigin};
