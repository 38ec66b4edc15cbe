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

use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use rand::{Rng, SeedableRng, rngs::StdRng};
use snafu::{OptionExt, ResultExt, ensure};
use tokio::{
    sync::{OnceCell, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    asset_info::AssetInfoFetcher,
    config::ProbeConfig,
    error::{AssetSizeUnknownSnafu, BuildClientSnafu, ImplausibleSnafu, ProbeError},
    fetcher::RangeFetcher,
    metrics::{PROBE_CURRENT_MBPS, PROBE_CYCLES, PROBE_MAX_MBPS, PROBE_REJECTED_SAMPLES},
    sample::{MIN_POSITIVE_MBPS, RangeRequest, ThroughputSample},
    state::{ProbeSnapshot, ProbeState, Reading, SampleOrigin},
};

/// Shortest period accepted for the probe timer.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

pub(crate) fn build_client(
    timeout: jiff::SignedDuration,
    user_agent: Option<&str>,
) -> Result<reqwest::Client, ProbeError> {
    let mut builder = reqwest::Client::builder().timeout(timeout.unsigned_abs());
    if let Some(ua) = user_agent {
        builder = builder.user_agent(ua);
    }
    builder.build().context(BuildClientSnafu)
}

/// Estimates link throughput by timing randomized range requests.
///
/// Components:
/// - `AssetInfoFetcher`: learns the asset size once, retrying until it
///   succeeds
/// - `RangeFetcher`: times one range transfer
/// - `ProbeState`: folds readings into the displayed value and running max
///
/// A cycle never fails from the caller's point of view: a transfer that
/// errors or looks implausible is replaced by a fallback value.
pub struct ThroughputProbe {
    config:     ProbeConfig,
    info_url:   String,
    asset_info: AssetInfoFetcher,
    fetcher:    RangeFetcher,
    asset_size: OnceCell<u64>,
    rng:        Mutex<StdRng>,
    next_seq:   AtomicU64,
    state:      ProbeState,
    token:      CancellationToken,
}

impl ThroughputProbe {
    pub fn new(config: ProbeConfig) -> Result<Self, ProbeError> {
        let client = build_client(config.request_timeout, config.user_agent.as_deref())?;
        let rng = config
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        Ok(Self {
            info_url: config.endpoints.info_url(),
            asset_info: AssetInfoFetcher::new(client.clone()),
            fetcher: RangeFetcher::new(client, config.endpoints.asset_url()),
            asset_size: OnceCell::new(),
            rng: Mutex::new(rng),
            next_seq: AtomicU64::new(0),
            state: ProbeState::new(config.smoothing_factor()),
            token: CancellationToken::new(),
            config,
        })
    }

    pub const fn config(&self) -> &ProbeConfig { &self.config }

    #[must_use]
    pub fn snapshot(&self) -> ProbeSnapshot { self.state.snapshot() }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ProbeSnapshot> { self.state.subscribe() }

    /// Stop accepting readings. A cycle already in flight finishes but its
    /// result is dropped.
    pub fn dispose(&self) { self.token.cancel(); }

    #[must_use]
    pub fn is_disposed(&self) -> bool { self.token.is_cancelled() }

    /// Run one cycle and fold its reading into the shared state, unless the
    /// probe was disposed meanwhile. Cycles may overlap; a reading that
    /// started before the one currently shown only updates the maximum.
    pub async fn measure_once(&self) -> Reading {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let reading = match self.measure().await {
            Ok(sample) => {
                debug!(
                    seq,
                    bytes = sample.bytes_transferred,
                    elapsed_secs = sample.elapsed_seconds,
                    mbps = sample.bitrate_mbps,
                    "Probe sample"
                );
                Reading {
                    seq,
                    mbps: sample.bitrate_mbps,
                    origin: SampleOrigin::Measured,
                }
            }
            Err(error) => {
                if error.is_transport_failure() {
                    warn!(seq, %error, "Probe transfer failed, substituting fallback");
                } else {
                    debug!(seq, %error, "Probe sample rejected, substituting fallback");
                }
                PROBE_REJECTED_SAMPLES
                    .with_label_values(&[error.reason()])
                    .inc();
                Reading {
                    seq,
                    mbps: self.fallback_mbps(),
                    origin: SampleOrigin::Fallback,
                }
            }
        };

        if self.is_disposed() {
            debug!(seq, "Probe disposed, discarding reading");
            return reading;
        }

        let origin: &'static str = reading.origin.into();
        PROBE_CYCLES.with_label_values(&[origin]).inc();
        let snapshot = self.state.apply(reading);
        if let Some(current) = snapshot.current_mbps {
            PROBE_CURRENT_MBPS.set(current);
        }
        if let Some(max) = snapshot.max_mbps {
            PROBE_MAX_MBPS.set(max);
        }
        reading
    }

    /// Start the timer loop. The first cycle runs immediately.
    pub fn spawn(self) -> ProbeHandle {
        let probe = Arc::new(self);
        let period = probe.config.interval.unsigned_abs().max(MIN_INTERVAL);
        let worker = Arc::clone(&probe);
        let join_handle = tokio::spawn(async move { worker.run(period).await });
        ProbeHandle {
            probe,
            join_handle: Some(join_handle),
        }
    }

    async fn run(&self, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(url = self.fetcher.url(), ?period, "Throughput probe started");

        loop {
            tokio::select! {
                biased;
                () = self.token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.measure_once().await;
        }

        info!(url = self.fetcher.url(), "Throughput probe disposed");
    }

    async fn measure(&self) -> Result<ThroughputSample, ProbeError> {
        let size = self.asset_size().await;
        let range = {
            let mut rng = self.rng();
            RangeRequest::random(&mut *rng, size, &self.config.chunk_sizes)
        }
        .context(AssetSizeUnknownSnafu)?;

        let transfer = self.fetcher.fetch(range).await?;
        let sample = ThroughputSample::new(transfer.bytes, transfer.elapsed);

        let plausibility = &self.config.plausibility;
        ensure!(
            transfer.elapsed >= plausibility.min_elapsed.unsigned_abs()
                && plausibility.accepts_rate(sample.bitrate_mbps),
            ImplausibleSnafu {
                mbps:         sample.bitrate_mbps,
                elapsed_secs: sample.elapsed_seconds,
            }
        );
        Ok(sample)
    }

    /// Cached asset size; the fallback size while the lookup keeps failing.
    async fn asset_size(&self) -> u64 {
        let lookup = self
            .asset_size
            .get_or_try_init(|| {
                self.asset_info
                    .fetch(&self.info_url, self.fetcher.url())
            })
            .await;
        match lookup {
            Ok(size) => *size,
            Err(error) => {
                let fallback = self.config.fallback_asset_size.as_bytes();
                warn!(%error, fallback, "Asset size lookup failed, using fallback size");
                fallback
            }
        }
    }

    /// A held-over value with jitter, or a draw from the fallback band when
    /// nothing has been shown yet.
    fn fallback_mbps(&self) -> f64 {
        let fallback = &self.config.fallback;
        let held_over = self.state.snapshot().current_mbps;
        let mut rng = self.rng();
        let value = match held_over {
            Some(previous) => {
                let jitter = if fallback.jitter.is_finite() {
                    fallback.jitter.abs().min(1.0)
                } else {
                    0.0
                };
                previous * rng.random_range(1.0 - jitter..=1.0 + jitter)
            }
            None => {
                let (low, high) = ordered_band(fallback.min_mbps, fallback.max_mbps);
                rng.random_range(low..=high)
            }
        };
        value.max(MIN_POSITIVE_MBPS)
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Sorted, finite band edges; the default band when the configured one is
/// unusable.
fn ordered_band(a: f64, b: f64) -> (f64, f64) {
    if a.is_finite() && b.is_finite() {
        (a.min(b), a.max(b))
    } else {
        (150.0, 900.0)
    }
}

/// Owner of a running probe loop. Dropping the handle disposes the probe.
pub struct ProbeHandle {
    probe:       Arc<ThroughputProbe>,
    join_handle: Option<JoinHandle<()>>,
}

impl ProbeHandle {
    pub fn dispose(&self) { self.probe.dispose(); }

    #[must_use]
    pub fn snapshot(&self) -> ProbeSnapshot { self.probe.snapshot() }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ProbeSnapshot> { self.probe.subscribe() }

    #[must_use]
    pub fn probe(&self) -> &ThroughputProbe { &self.probe }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }

    /// Dispose and wait for the loop to exit, including any in-flight cycle.
    pub async fn wait_for_stop(mut self) {
        self.dispose();
        if let Some(join_handle) = self.join_handle.take() {
            if let Err(error) = join_handle.await {
                warn!(%error, "Throughput probe task ended abnormally");
            }
        }
    }
}

impl Drop for ProbeHandle {
    fn drop(&mut self) { self.probe.dispose(); }
}
