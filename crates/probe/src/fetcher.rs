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

use futures::StreamExt;
use reqwest::{StatusCode, header};
use snafu::{ResultExt, ensure};

use crate::{
    error::{HttpSnafu, NetworkSnafu, OversizedBodySnafu, ProbeError, ShortBodySnafu},
    sample::RangeRequest,
};

/// A completed transfer: how many bytes, and how long from send to last byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub bytes:   u64,
    pub elapsed: Duration,
}

/// Times range requests against a single asset URL. Bodies are counted as
/// they arrive and never buffered.
#[derive(Debug, Clone)]
pub struct RangeFetcher {
    client: reqwest::Client,
    url:    String,
}

impl RangeFetcher {
    pub const fn new(client: reqwest::Client, url: String) -> Self { Self { client, url } }

    pub fn url(&self) -> &str { &self.url }

    /// Request `range` and wait for the complete body. Anything other than a
    /// `206` carrying exactly `range.len()` bytes is an error.
    pub async fn fetch(&self, range: RangeRequest) -> Result<Transfer, ProbeError> {
        let started = Instant::now();
        let response = self
            .client
            .get(&self.url)
            .header(header::RANGE, range.header_value())
            .header(header::CACHE_CONTROL, "no-store")
            .send()
            .await
            .context(NetworkSnafu)?;

        let status = response.status();
        ensure!(
            status == StatusCode::PARTIAL_CONTENT,
            HttpSnafu {
                status: status.as_u16(),
                url:    &self.url,
            }
        );

        let expected = range.len();
        let mut received = 0_u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            received += chunk.context(NetworkSnafu)?.len() as u64;
            ensure!(
                received <= expected,
                OversizedBodySnafu {
                    url: &self.url,
                    expected,
                }
            );
        }
        let elapsed = started.elapsed();

        ensure!(
            received == expected,
            ShortBodySnafu {
                url: &self.url,
                expected,
                received,
            }
        );
        Ok(Transfer {
            bytes: received,
            elapsed,
        })
    }
}
