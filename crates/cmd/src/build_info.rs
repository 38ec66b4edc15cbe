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

//! Version strings baked in at compile time.

use shadow_rs::{formatcp, shadow};

shadow!(build);

pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");

/// Set `BANDPROBE_RELEASE` at build time to drop the development suffix.
const RELEASE: bool = option_env!("BANDPROBE_RELEASE").is_some();

const DIRTY: &str = if build::GIT_CLEAN { "" } else { "-dirty" };

/// `0.1.0` for releases, `0.1.0-unofficial+abc1234` (or `-dirty`) otherwise.
#[allow(clippy::const_is_empty)]
pub const FULL_VERSION: &str = if RELEASE {
    build::PKG_VERSION
} else if build::SHORT_COMMIT.is_empty() {
    formatcp!("{}-unofficial", build::PKG_VERSION)
} else {
    formatcp!("{}-unofficial+{}{}", build::PKG_VERSION, build::SHORT_COMMIT, DIRTY)
};

/// Shown by `--version` in long form.
pub const LONG_VERSION: &str = formatcp!(
    "{}\nbranch: {}\nbuilt:  {}\nrustc:  {}\ntarget: {}",
    FULL_VERSION,
    build::BRANCH,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::BUILD_TARGET
);
