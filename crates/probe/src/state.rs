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

//! Display state shared between the probe loop and its observers.

use serde::Serialize;
use tokio::sync::watch;

/// Whether a displayed value came from a real transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display, strum_macros::IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SampleOrigin {
    Measured,
    Fallback,
}

/// Outcome of one cycle, tagged with the order in which cycles started.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    pub seq:    u64,
    pub mbps:   f64,
    pub origin: SampleOrigin,
}

/// What observers see. Values are megabits per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProbeSnapshot {
    /// Smoothed latest value, `None` until the first cycle completes
    pub current_mbps: Option<f64>,
    /// Largest value applied so far; never decreases
    pub max_mbps:     Option<f64>,
    /// Origin of the value behind `current_mbps`
    pub origin:       Option<SampleOrigin>,
    /// Readings applied, stale ones included
    pub cycles:       u64,
    /// Sequence number behind `current_mbps`
    pub last_seq:     u64,
}

impl ProbeSnapshot {
    /// Fold a reading in. A reading that started before the one currently
    /// shown only competes for the maximum.
    pub fn apply(&mut self, reading: Reading, smoothing: f64) {
        self.cycles += 1;
        self.max_mbps = Some(self.max_mbps.map_or(reading.mbps, |max| max.max(reading.mbps)));

        if self.current_mbps.is_some() && reading.seq <= self.last_seq {
            return;
        }
        self.current_mbps = Some(match self.current_mbps {
            Some(previous) => smoothing.mul_add(reading.mbps - previous, previous),
            None => reading.mbps,
        });
        self.origin = Some(reading.origin);
        self.last_seq = reading.seq;
    }
}

/// Single writer, many readers, backed by a watch channel.
#[derive(Debug)]
pub struct ProbeState {
    sender:    watch::Sender<ProbeSnapshot>,
    smoothing: f64,
}

impl ProbeState {
    #[must_use]
    pub fn new(smoothing: f64) -> Self {
        let (sender, _) = watch::channel(ProbeSnapshot::default());
        Self { sender, smoothing }
    }

    /// Fold `reading` in and return the snapshot exactly as this call left it.
    pub fn apply(&self, reading: Reading) -> ProbeSnapshot {
        let smoothing = self.smoothing;
        let mut applied = ProbeSnapshot::default();
        self.sender.send_modify(|snapshot| {
            snapshot.apply(reading, smoothing);
            applied = *snapshot;
        });
        applied
    }

    #[must_use]
    pub fn snapshot(&self) -> ProbeSnapshot { *self.sender.borrow() }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ProbeSnapshot> { self.sender.subscribe() }
}
