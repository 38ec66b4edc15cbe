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

use std::time::{Duration, Instant};

use bandprobe_base::readable_size::ReadableSize;
use bon::Builder;
use jiff::SignedDuration;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::{ResultExt, ensure};
use tracing::{info, warn};

use crate::{
    asset_info::AssetInfoFetcher,
    config::ProbeEndpoints,
    error::{AssetSizeUnknownSnafu, HttpSnafu, NetworkSnafu, ProbeError},
    fetcher::RangeFetcher,
    probe::build_client,
    sample::{RangeRequest, ThroughputSample},
};

/// Configuration for a one-shot ping, download and upload measurement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault, Builder)]
#[serde(default)]
pub struct SpeedTestConfig {
    #[default(ProbeEndpoints::default())]
    #[builder(default)]
    pub endpoints: ProbeEndpoints,

    /// Cheap endpoint whose round trip counts as the ping
    #[default(_code = "\"/health\".to_string()")]
    #[builder(into, default = "/health".to_string())]
    pub ping_path: String,

    /// Endpoint draining the upload body
    #[default(_code = "\"/api/speedtest\".to_string()")]
    #[builder(into, default = "/api/speedtest".to_string())]
    pub upload_path: String,

    /// Bytes downloaded, capped at the asset size
    #[default(ReadableSize::mb(1))]
    #[builder(default = ReadableSize::mb(1))]
    pub download_size: ReadableSize,

    /// Bytes uploaded
    #[default(ReadableSize::mb(1))]
    #[builder(default = ReadableSize::mb(1))]
    pub upload_size: ReadableSize,

    #[default(SignedDuration::from_secs(30))]
    #[builder(default = SignedDuration::from_secs(30))]
    pub request_timeout: SignedDuration,

    #[builder(into)]
    pub user_agent: Option<String>,
}

/// Results of one run; a phase that failed is `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SpeedTestReport {
    pub ping_ms:       Option<f64>,
    pub download_mbps: Option<f64>,
    pub upload_mbps:   Option<f64>,
}

/// Explicit, user-triggered measurement. Unlike the live probe it reports
/// failures as missing values instead of substituting numbers.
pub struct SpeedTest {
    config:     SpeedTestConfig,
    client:     reqwest::Client,
    asset_info: AssetInfoFetcher,
    fetcher:    RangeFetcher,
}

impl SpeedTest {
    pub fn new(config: SpeedTestConfig) -> Result<Self, ProbeError> {
        let client = build_client(config.request_timeout, config.user_agent.as_deref())?;
        Ok(Self {
            asset_info: AssetInfoFetcher::new(client.clone()),
            fetcher: RangeFetcher::new(client.clone(), config.endpoints.asset_url()),
            client,
            config,
        })
    }

    pub async fn run(&self) -> SpeedTestReport {
        let ping_ms = self
            .ping()
            .await
            .inspect_err(|error| warn!(%error, "Ping failed"))
            .ok()
            .map(|rtt| rtt.as_secs_f64() * 1000.0);
        let download_mbps = self
            .download()
            .await
            .inspect_err(|error| warn!(%error, "Download test failed"))
            .ok()
            .map(|sample| sample.bitrate_mbps);
        let upload_mbps = self
            .upload()
            .await
            .inspect_err(|error| warn!(%error, "Upload test failed"))
            .ok()
            .map(|sample| sample.bitrate_mbps);

        let report = SpeedTestReport {
            ping_ms,
            download_mbps,
            upload_mbps,
        };
        info!(?report, "Speed test finished");
        report
    }

    /// Round trip of a request to the ping endpoint.
    pub async fn ping(&self) -> Result<Duration, ProbeError> {
        let url = self.config.endpoints.join(&self.config.ping_path);
        let started = Instant::now();
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await
            .context(NetworkSnafu)?;
        ensure!(
            response.status().is_success(),
            HttpSnafu {
                status: response.status().as_u16(),
                url,
            }
        );
        response.bytes().await.context(NetworkSnafu)?;
        Ok(started.elapsed())
    }

    /// Time the leading `download_size` bytes of the asset.
    pub async fn download(&self) -> Result<ThroughputSample, ProbeError> {
        let size = self
            .asset_info
            .fetch(&self.config.endpoints.info_url(), self.fetcher.url())
            .await?;
        ensure!(size > 0, AssetSizeUnknownSnafu);
        let range = RangeRequest {
            start: 0,
            end:   self.config.download_size.as_bytes().clamp(1, size) - 1,
        };
        let transfer = self.fetcher.fetch(range).await?;
        Ok(ThroughputSample::new(transfer.bytes, transfer.elapsed))
    }

    /// Time a `POST` of `upload_size` zero bytes.
    pub async fn upload(&self) -> Result<ThroughputSample, ProbeError> {
        let url = self.config.endpoints.join(&self.config.upload_path);
        let body = vec![0_u8; self.config.upload_size.as_usize()];
        let bytes = body.len() as u64;
        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .context(NetworkSnafu)?;
        ensure!(
            response.status().is_success(),
            HttpSnafu {
                status: response.status().as_u16(),
                url,
            }
        );
        response.bytes().await.context(NetworkSnafu)?;
        Ok(ThroughputSample::new(bytes, started.elapsed()))
    }
}
