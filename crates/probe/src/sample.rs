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

//! Range selection and the bytes/time to megabits conversion.

use std::{fmt, time::Duration};

use bandprobe_base::readable_size::ReadableSize;
use rand::Rng;

/// Floor applied to measured durations so a rate is always defined.
pub const ELAPSED_EPSILON: Duration = Duration::from_micros(1);

/// Smallest rate ever reported; keeps samples strictly positive.
pub const MIN_POSITIVE_MBPS: f64 = 1e-9;

const BITS_PER_BYTE: f64 = 8.0;
const BITS_PER_MEGABIT: f64 = 1024.0 * 1024.0;

/// An inclusive byte span requested from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRequest {
    pub start: u64,
    pub end:   u64,
}

impl RangeRequest {
    #[must_use]
    pub const fn len(&self) -> u64 { self.end - self.start + 1 }

    #[must_use]
    pub const fn is_empty(&self) -> bool { false }

    /// Value of the `Range` header.
    #[must_use]
    pub fn header_value(&self) -> String { format!("bytes={}-{}", self.start, self.end) }

    /// Draw a chunk size from `chunk_sizes` and a start offset so the span
    /// lies within `asset_size`. `None` when the asset is empty.
    pub fn random<R: Rng + ?Sized>(
        rng: &mut R,
        asset_size: u64,
        chunk_sizes: &[ReadableSize],
    ) -> Option<Self> {
        if asset_size == 0 {
            return None;
        }
        let chunk = if chunk_sizes.is_empty() {
            asset_size
        } else {
            chunk_sizes[rng.random_range(0..chunk_sizes.len())].as_bytes()
        };
        let chunk = chunk.clamp(1, asset_size);
        let start = if chunk < asset_size {
            rng.random_range(0..asset_size - chunk)
        } else {
            0
        };
        Some(Self {
            start,
            end: start + chunk - 1,
        })
    }
}

impl fmt::Display for RangeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// One timed transfer reduced to a rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSample {
    pub bytes_transferred: u64,
    pub elapsed_seconds:   f64,
    pub bitrate_mbps:      f64,
}

impl ThroughputSample {
    #[must_use]
    pub fn new(bytes_transferred: u64, elapsed: Duration) -> Self {
        let elapsed_seconds = elapsed.max(ELAPSED_EPSILON).as_secs_f64();
        Self {
            bytes_transferred,
            elapsed_seconds,
            bitrate_mbps: bitrate_mbps(bytes_transferred, elapsed_seconds),
        }
    }
}

/// `bytes * 8 / 2^20 / seconds`, floored to a tiny positive value.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bitrate_mbps(bytes: u64, elapsed_seconds: f64) -> f64 {
    let seconds = elapsed_seconds.max(ELAPSED_EPSILON.as_secs_f64());
    let rate = bytes as f64 * BITS_PER_BYTE / BITS_PER_MEGABIT / seconds;
    if rate.is_finite() {
        rate.max(MIN_POSITIVE_MBPS)
    } else {
        f64::MAX
    }
}
