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

//! HTTP byte-range server for the bandwidth probe.
//!
//! - [`range`]: pure `Range` header parsing and clamping
//! - [`asset`]: the served files and their cached descriptors
//! - [`routes`]: `/video`, `/video-info`, `/asset/{id}`, `/api/speedtest`
//! - [`http`]: REST server lifecycle

pub mod asset;
pub mod error;
pub mod http;
pub mod metrics;
pub mod range;
pub mod routes;

use std::net::SocketAddr;

use bandprobe_error::Result;
use tokio::{sync::oneshot::Receiver, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// Handle for managing a running service.
///
/// Allows waiting for the listener to accept connections, signalling graceful
/// shutdown and waiting for the server task to finish.
pub struct ServiceHandler {
    /// Join handle for the server task
    join_handle:        JoinHandle<()>,
    /// Token for signalling shutdown
    cancellation_token: CancellationToken,
    /// Receiver for server start notification
    started_rx:         Option<Receiver<()>>,
    /// Address the listener is bound to
    local_addr:         SocketAddr,
}

impl ServiceHandler {
    /// Waits for the server to start accepting connections. Returns
    /// immediately when the start signal was already consumed.
    pub async fn wait_for_start(&mut self) -> Result<()> {
        if let Some(started_rx) = self.started_rx.take() {
            // A dropped sender means the server task already ended.
            let _ = started_rx.await;
        }
        Ok(())
    }

    /// Waits for the server task to completely stop. Call
    /// [`shutdown`](Self::shutdown) first.
    pub async fn wait_for_stop(self) -> Result<()> {
        if let Err(e) = self.join_handle.await {
            tracing::error!("server task failed: {}", e);
        }
        Ok(())
    }

    /// Signals the server to begin graceful shutdown.
    pub fn shutdown(&self) { self.cancellation_token.cancel(); }

    /// Checks if the server task has completed.
    #[must_use]
    pub fn is_finished(&self) -> bool { self.join_handle.is_finished() }

    /// Address the server is listening on.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr { self.local_addr }
}
