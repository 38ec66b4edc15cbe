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
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use bandprobe_common_telemetry::{
    WorkerGuard,
    logging::{LoggingOptions, init_global_logging},
};
use bandprobe_server::{
    asset::{AssetConfig, AssetStore},
    http::{RestServerConfig, start_rest_server},
    routes::asset_routes,
};
use bon::Builder;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::{ResultExt, Whatever};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Name used for log files and the startup banner.
pub const APP_NAME: &str = "bandprobe";

/// Represents the main application with lifecycle management
#[derive(SmartDefault)]
pub struct App {
    /// Application configuration
    pub config:             AppConfig,
    /// Controls if the application should continue running
    #[default(_code = "Arc::new(AtomicBool::new(false))")]
    pub running:            Arc<AtomicBool>,
    /// Cancelled once every server has stopped
    #[default(_code = "CancellationToken::new()")]
    pub cancellation_token: CancellationToken,
}

/// Configuration for the application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault, Builder)]
#[serde(default)]
pub struct AppConfig {
    /// REST server configuration
    #[builder(default)]
    pub http_config:              RestServerConfig,
    /// Files served by the range server
    #[builder(default)]
    pub asset_config:             AssetConfig,
    /// Logging configuration
    #[builder(default)]
    pub logging:                  LoggingOptions,
    /// Whether Ctrl+C and SIGTERM stop the application
    #[default = true]
    #[builder(default = true)]
    pub enable_graceful_shutdown: bool,
}

impl AppConfig {
    #[must_use]
    pub fn open(self) -> App {
        App {
            config: self,
            ..Default::default()
        }
    }
}

/// Handle for controlling a running application
pub struct AppHandle {
    /// Sender for triggering shutdown
    shutdown_tx:        Option<oneshot::Sender<()>>,
    /// Application running flag
    running:            Arc<AtomicBool>,
    /// Cancelled once the servers have drained
    cancellation_token: CancellationToken,
    /// Address the REST server is bound to
    local_addr:         SocketAddr,
    /// Keeps the non-blocking log writers alive
    _log_guards:        Vec<WorkerGuard>,
}

impl AppHandle {
    /// Gracefully shutdown the application
    pub fn shutdown(&mut self) {
        info!("Initiating graceful shutdown");
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Check if the application is still running
    #[must_use]
    pub fn is_running(&self) -> bool { self.running.load(Ordering::SeqCst) }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr { self.local_addr }

    /// Wait until every server has stopped
    pub async fn wait_for_shutdown(&self) { self.cancellation_token.cancelled().await; }
}

impl App {
    /// Start the application and return a handle for controlling it
    pub async fn start(&self) -> Result<AppHandle, Whatever> {
        let log_guards = init_global_logging(APP_NAME, &self.config.logging);

        info!(
            video = %self.config.asset_config.video_path.display(),
            extra_assets = self.config.asset_config.extra_assets.len(),
            "Starting bandprobe server"
        );

        let store = Arc::new(AssetStore::new(&self.config.asset_config));
        let mut http_handle =
            start_rest_server(self.config.http_config.clone(), vec![asset_routes(store)])
                .await
                .whatever_context("Failed to start REST server")?;
        http_handle
            .wait_for_start()
            .await
            .whatever_context("REST server failed to start")?;
        let local_addr = http_handle.local_addr();

        self.running.store(true, Ordering::SeqCst);
        info!(%local_addr, "Application started successfully");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let running = Arc::clone(&self.running);
        let cancellation_token = self.cancellation_token.clone();
        let enable_graceful_shutdown = self.config.enable_graceful_shutdown;

        tokio::spawn(async move {
            if enable_graceful_shutdown {
                shutdown_signal(shutdown_rx).await;
            } else {
                let _ = shutdown_rx.await;
            }

            info!("Shutting down servers");
            http_handle.shutdown();
            if let Err(error) = http_handle.wait_for_stop().await {
                warn!(%error, "REST server did not stop cleanly");
            }

            running.store(false, Ordering::SeqCst);
            cancellation_token.cancel();
            info!("Application shutdown complete");
        });

        Ok(AppHandle {
            shutdown_tx: Some(shutdown_tx),
            running: Arc::clone(&self.running),
            cancellation_token: self.cancellation_token.clone(),
            local_addr,
            _log_guards: log_guards,
        })
    }

    /// Run the application blocking until it's shut down
    pub async fn run(self) -> Result<(), Whatever> {
        let handle = self.start().await?;
        handle.wait_for_shutdown().await;
        Ok(())
    }
}

async fn shutdown_signal(shutdown_rx: oneshot::Receiver<()>) {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!(%error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C signal"); },
        () = terminate => { info!("Received terminate signal"); },
        _ = shutdown_rx => { info!("Received shutdown signal"); },
    }
}
