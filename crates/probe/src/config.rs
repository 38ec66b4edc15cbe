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

use bandprobe_base::readable_size::ReadableSize;
use bon::Builder;
use jiff::SignedDuration;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Where the probe sends its requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault, Builder)]
#[serde(default)]
pub struct ProbeEndpoints {
    /// Server root, without a trailing slash
    #[default(_code = "\"http://127.0.0.1:3001\".to_string()")]
    #[builder(into, default = "http://127.0.0.1:3001".to_string())]
    pub base_url:   String,
    /// Path of the asset whose ranges are timed
    #[default(_code = "\"/video\".to_string()")]
    #[builder(into, default = "/video".to_string())]
    pub asset_path: String,
    /// Path answering `{"size": n}` for the asset
    #[default(_code = "\"/video-info\".to_string()")]
    #[builder(into, default = "/video-info".to_string())]
    pub info_path:  String,
}

impl ProbeEndpoints {
    /// Endpoints rooted at `base_url` with the default paths.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn asset_url(&self) -> String { self.join(&self.asset_path) }

    #[must_use]
    pub fn info_url(&self) -> String { self.join(&self.info_path) }

    #[must_use]
    pub fn join(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Bounds outside which a measurement is treated as noise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SmartDefault, Builder)]
#[serde(default)]
pub struct PlausibilityConfig {
    /// Transfers completing faster than this are cache hits or timer noise
    #[default(SignedDuration::from_millis(2))]
    #[builder(default = SignedDuration::from_millis(2))]
    pub min_elapsed: SignedDuration,
    #[default = 0.01]
    #[builder(default = 0.01)]
    pub min_mbps:    f64,
    #[default = 10_000.0]
    #[builder(default = 10_000.0)]
    pub max_mbps:    f64,
}

impl PlausibilityConfig {
    #[must_use]
    pub fn accepts_rate(&self, mbps: f64) -> bool {
        mbps.is_finite() && (self.min_mbps..=self.max_mbps).contains(&mbps)
    }
}

/// Where substitute values come from when a cycle yields no usable sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SmartDefault, Builder)]
#[serde(default)]
pub struct FallbackConfig {
    /// Lower edge of the band used before any value was shown
    #[default = 150.0]
    #[builder(default = 150.0)]
    pub min_mbps: f64,
    /// Upper edge of the band used before any value was shown
    #[default = 900.0]
    #[builder(default = 900.0)]
    pub max_mbps: f64,
    /// Relative jitter applied to a held-over value
    #[default = 0.1]
    #[builder(default = 0.1)]
    pub jitter:   f64,
}

/// Configuration for the throughput probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SmartDefault, Builder)]
#[serde(default)]
pub struct ProbeConfig {
    #[default(ProbeEndpoints::default())]
    #[builder(default)]
    pub endpoints: ProbeEndpoints,

    /// Time between cycle starts (default: 3s)
    #[default(SignedDuration::from_secs(3))]
    #[builder(default = SignedDuration::from_secs(3))]
    pub interval: SignedDuration,

    /// Candidate range lengths, one drawn uniformly per cycle
    #[default(_code = "vec![ReadableSize::kb(256), ReadableSize::kb(512), ReadableSize::mb(1)]")]
    #[builder(default = vec![ReadableSize::kb(256), ReadableSize::kb(512), ReadableSize::mb(1)])]
    pub chunk_sizes: Vec<ReadableSize>,

    /// Whole-request timeout, body included (default: 10s)
    #[default(SignedDuration::from_secs(10))]
    #[builder(default = SignedDuration::from_secs(10))]
    pub request_timeout: SignedDuration,

    /// Upper bound for offsets while the asset size is unknown
    #[default(ReadableSize::mb(8))]
    #[builder(default = ReadableSize::mb(8))]
    pub fallback_asset_size: ReadableSize,

    #[default(PlausibilityConfig::default())]
    #[builder(default)]
    pub plausibility: PlausibilityConfig,

    #[default(FallbackConfig::default())]
    #[builder(default)]
    pub fallback: FallbackConfig,

    /// Weight of the newest sample in the displayed value, in `(0, 1]`
    #[default = 1.0]
    #[builder(default = 1.0)]
    pub smoothing: f64,

    /// Fixed RNG seed; entropy from the OS when unset
    pub seed: Option<u64>,

    /// Custom User-Agent header
    #[builder(into)]
    pub user_agent: Option<String>,
}

impl ProbeConfig {
    /// Smoothing factor forced into `(0, 1]`.
    #[must_use]
    pub fn smoothing_factor(&self) -> f64 {
        if self.smoothing.is_finite() && self.smoothing > 0.0 {
            self.smoothing.min(1.0)
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_live_probe() {
        let config = ProbeConfig::default();
        assert_eq!(config.interval, SignedDuration::from_secs(3));
        assert_eq!(config.chunk_sizes.len(), 3);
        assert_eq!(config.chunk_sizes[1], ReadableSize::kb(512));
        assert_eq!(config.fallback_asset_size, ReadableSize::mb(8));
        assert!((config.smoothing_factor() - 1.0).abs() < f64::EPSILON);
        assert_eq!(config, ProbeConfig::builder().build());
    }

    #[test]
    fn endpoints_join_without_double_slashes() {
        let endpoints = ProbeEndpoints::with_base_url("http://localhost:9000/");
        assert_eq!(endpoints.asset_url(), "http://localhost:9000/video");
        assert_eq!(endpoints.info_url(), "http://localhost:9000/video-info");
        assert_eq!(endpoints.join("health"), "http://localhost:9000/health");
    }

    #[test]
    fn smoothing_outside_the_unit_interval_is_ignored() {
        let mut config = ProbeConfig::default();
        config.smoothing = 0.0;
        assert!((config.smoothing_factor() - 1.0).abs() < f64::EPSILON);
        config.smoothing = 7.0;
        assert!((config.smoothing_factor() - 1.0).abs() < f64::EPSILON);
        config.smoothing = 0.25;
        assert!((config.smoothing_factor() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn plausible_band_is_inclusive() {
        let band = PlausibilityConfig::default();
        assert!(band.accepts_rate(0.01));
        assert!(band.accepts_rate(10_000.0));
        assert!(!band.accepts_rate(10_000.5));
        assert!(!band.accepts_rate(f64::NAN));
    }

    #[test]
    fn config_reads_partial_json() {
        let config: ProbeConfig =
            serde_json::from_str(r#"{"interval": "PT1S", "smoothing": 0.5}"#).unwrap();
        assert_eq!(config.interval, SignedDuration::from_secs(1));
        assert!((config.smoothing - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.endpoints, ProbeEndpoints::default());
    }
}
