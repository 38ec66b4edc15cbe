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

use prometheus::{IntCounter, IntCounterVec, register_int_counter, register_int_counter_vec};

pub const STATUS_LABEL: &str = "status";

pub static ASSET_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "bandprobe_asset_requests_total",
        "Total number of asset GET requests by response status",
        &[STATUS_LABEL]
    )
    .unwrap()
});

pub static ASSET_BYTES_SERVED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "bandprobe_asset_bytes_served_total",
        "Total number of asset body bytes written to clients"
    )
    .unwrap()
});

pub static ASSET_STREAM_ERRORS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "bandprobe_asset_stream_errors_total",
        "Total number of response bodies aborted by a read error"
    )
    .unwrap()
});

pub static UPLOAD_BYTES_RECEIVED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "bandprobe_upload_bytes_received_total",
        "Total number of bytes drained from upload probes"
    )
    .unwrap()
});
