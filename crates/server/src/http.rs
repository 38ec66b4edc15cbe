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

use std::net::SocketAddr;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use bandprobe_base::readable_size::ReadableSize;
use bandprobe_common_telemetry::metrics::{PROMETHEUS_CONTENT_TYPE, gather_text};
use bandprobe_error::{BindSnafu, ParseAddressSnafu, Result};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::ResultExt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use super::ServiceHandler;

/// Default maximum HTTP request body size for buffered extractors (16 MiB).
/// The upload probe route streams its body and is exempt.
pub const DEFAULT_MAX_HTTP_BODY_SIZE: ReadableSize = ReadableSize::mb(16);

/// Configuration options for a REST server
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, bon::Builder)]
#[serde(default)]
pub struct RestServerConfig {
    /// The address to bind the REST server
    #[default = "127.0.0.1:3001"]
    #[builder(into, default = "127.0.0.1:3001".to_string())]
    pub bind_address:  String,
    /// Maximum HTTP request body size
    #[default(_code = "DEFAULT_MAX_HTTP_BODY_SIZE")]
    #[builder(default = DEFAULT_MAX_HTTP_BODY_SIZE)]
    pub max_body_size: ReadableSize,
    /// Whether to enable CORS
    #[default = true]
    #[builder(default = true)]
    pub enable_cors:   bool,
}

/// Starts the REST server and returns a handle for managing its lifecycle.
///
/// The listener is bound before this returns, so bind failures surface here
/// and `bind_address` may use port 0; [`ServiceHandler::local_addr`] reports
/// the port actually bound. Every route handler is applied before the shared
/// layers (CORS, body limit), so the layers cover all routes.
///
/// # Example
///
/// ```rust,no_run
/// use axum::{Router, routing::get};
/// use bandprobe_server::http::{RestServerConfig, start_rest_server};
///
/// # async fn run() -> bandprobe_error::Result<()> {
/// fn my_routes(router: Router) -> Router {
///     router.route("/api/v1/hello", get(|| async { "Hello, World!" }))
/// }
///
/// let mut handle = start_rest_server(RestServerConfig::default(), vec![my_routes]).await?;
/// handle.wait_for_start().await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_rest_server<F>(
    config: RestServerConfig,
    route_handlers: Vec<F>,
) -> Result<ServiceHandler>
where
    F: Fn(Router) -> Router + Send + Sync + 'static,
{
    let bind_addr = config
        .bind_address
        .parse::<SocketAddr>()
        .context(ParseAddressSnafu {
            addr: config.bind_address.clone(),
        })?;

    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler));
    router = health_routes(router);

    for handler in &route_handlers {
        info!("Registering REST route handler");
        router = handler(router);
    }

    router = router.layer(DefaultBodyLimit::max(config.max_body_size.as_usize()));
    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(Any);
        router = router.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .context(BindSnafu {
            addr: config.bind_address.clone(),
        })?;
    let local_addr = listener.local_addr().context(BindSnafu {
        addr: config.bind_address.clone(),
    })?;

    let cancellation_token = CancellationToken::new();
    let (join_handle, started_rx) = {
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let cancellation_token_clone = cancellation_token.clone();
        let join_handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = started_tx.send(());
                    info!("REST server (on {}) started", local_addr);
                    cancellation_token_clone.cancelled().await;
                    info!("REST server (on {}) received shutdown signal", local_addr);
                })
                .await;

            if let Err(e) = result {
                warn!("REST server (on {}) stopped with error: {}", local_addr, e);
            } else {
                info!("REST server (on {}) task completed", local_addr);
            }
        });
        (join_handle, started_rx)
    };

    Ok(ServiceHandler {
        join_handle,
        cancellation_token,
        started_rx: Some(started_rx),
        local_addr,
    })
}

/// Health check endpoint for the REST server
async fn health_check() -> impl IntoResponse { (StatusCode::OK, "OK") }

async fn api_health_handler() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "bandprobe",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        gather_text(),
    )
}

/// Add the JSON health endpoint.
pub fn health_routes(router: Router) -> Router { router.route("/api/health", get(api_health_handler)) }
