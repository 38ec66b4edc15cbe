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

//! Panic hook that routes panics through `tracing` with a backtrace.

use std::{panic, sync::LazyLock};

use backtrace::Backtrace;
use prometheus::{IntCounter, register_int_counter};

/// Number of panics observed by the hook.
pub static PANIC_COUNTER: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!("bandprobe_panic_total", "Total number of panics").unwrap()
});

/// Replace the panic hook with one that logs the panic and its location as a
/// structured `error` event, bumps [`PANIC_COUNTER`], then defers to the
/// previous hook.
pub fn set_panic_hook() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic| {
        let backtrace = format!("{:?}", Backtrace::new());
        if let Some(location) = panic.location() {
            tracing::error!(
                message = %panic,
                backtrace = %backtrace,
                panic.file = location.file(),
                panic.line = location.line(),
                panic.column = location.column(),
            );
        } else {
            tracing::error!(message = %panic, backtrace = %backtrace);
        }
        PANIC_COUNTER.inc();
        default_hook(panic);
    }));
}
