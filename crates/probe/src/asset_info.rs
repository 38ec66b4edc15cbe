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

use serde::Deserialize;
use snafu::{ResultExt, ensure};
use tracing::debug;

use crate::error::{AssetSizeUnknownSnafu, HttpSnafu, NetworkSnafu, ProbeError};

/// Body of the asset info endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AssetInfo {
    pub size: u64,
}

/// Looks up how large the probed asset is.
#[derive(Debug, Clone)]
pub struct AssetInfoFetcher {
    client: reqwest::Client,
}

impl AssetInfoFetcher {
    pub const fn new(client: reqwest::Client) -> Self { Self { client } }

    /// Ask the info endpoint; when it is unavailable, fall back to the
    /// `Content-Length` of a `HEAD` on the asset itself.
    pub async fn fetch(&self, info_url: &str, asset_url: &str) -> Result<u64, ProbeError> {
        match self.fetch_info(info_url).await {
            Ok(info) => Ok(info.size),
            Err(error) => {
                debug!(%error, info_url, "asset info lookup failed, trying HEAD");
                self.fetch_head(asset_url).await
            }
        }
    }

    async fn fetch_info(&self, url: &str) -> Result<AssetInfo, ProbeError> {
        let response = self.client.get(url).send().await.context(NetworkSnafu)?;
        ensure!(
            response.status().is_success(),
            HttpSnafu {
                status: response.status().as_u16(),
                url,
            }
        );
        response.json().await.context(NetworkSnafu)
    }

    async fn fetch_head(&self, url: &str) -> Result<u64, ProbeError> {
        let response = self.client.head(url).send().await.context(NetworkSnafu)?;
        ensure!(
            response.status().is_success(),
            HttpSnafu {
                status: response.status().as_u16(),
                url,
            }
        );
        response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| AssetSizeUnknownSnafu.build())
    }
}
