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

use std::sync::LazyLock;

use prometheus::{Gauge, IntCounterVec, register_gauge, register_int_counter_vec};

pub const ORIGIN_LABEL: &str = "origin";
pub const REASON_LABEL: &str = "reason";

pub static PROBE_CYCLES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "bandprobe_probe_cycles_total",
        "Total number of completed probe cycles by sample origin",
        &[ORIGIN_LABEL]
    )
    .unwrap()
});

pub static PROBE_REJECTED_SAMPLES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "bandprobe_probe_rejected_samples_total",
        "Total number of cycles replaced by a fallback value, by reason",
        &[REASON_LABEL]
    )
    .unwrap()
});

pub static PROBE_CURRENT_MBPS: LazyLock<Gauge> = LazyLock::new(|| {
    register_gauge!(
        "bandprobe_probe_current_mbps",
        "Most recently displayed throughput in megabits per second"
    )
    .unwrap()
});

pub static PROBE_MAX_MBPS: LazyLock<Gauge> = LazyLock::new(|| {
    register_gauge!(
        "bandprobe_probe_max_mbps",
        "Largest throughput displayed so far in megabits per second"
    )
    .unwrap()
});
