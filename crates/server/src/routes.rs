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

//! Asset and upload-probe routes.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::{fs::File, io::Take};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::{
    asset::{AssetDescriptor, AssetStore, VIDEO_ASSET_ID},
    error::{ApiError, ApiResult},
    metrics::{ASSET_BYTES_SERVED, ASSET_REQUESTS, ASSET_STREAM_ERRORS, UPLOAD_BYTES_RECEIVED},
    range::{ByteRange, RangeError, parse_range},
};

/// Body of `GET /video-info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub size: u64,
}

/// Body of `GET /asset/{id}/info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub size:         u64,
    pub content_type: String,
}

/// Body of `POST /api/speedtest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub message: String,
}

pub const UPLOAD_RECEIVED_MESSAGE: &str = "Upload received";

/// Route handler for [`crate::http::start_rest_server`] mounting every asset
/// route over `store`.
pub fn asset_routes(store: Arc<AssetStore>) -> impl Fn(Router) -> Router + Send + Sync + 'static {
    move |router: Router| router.merge(asset_router(Arc::clone(&store)))
}

/// Router with the asset, metadata and upload-probe endpoints.
pub fn asset_router(store: Arc<AssetStore>) -> Router {
    Router::new()
        .route("/video", get(serve_video))
        .route("/video-info", get(video_info))
        .route("/asset/{id}", get(serve_asset))
        .route("/asset/{id}/info", get(asset_info))
        .route(
            "/api/speedtest",
            post(receive_upload).layer(DefaultBodyLimit::disable()),
        )
        .with_state(store)
}

async fn serve_video(State(store): State<Arc<AssetStore>>, headers: HeaderMap) -> Response {
    serve_range(&store, VIDEO_ASSET_ID, &headers).await
}

async fn serve_asset(
    State(store): State<Arc<AssetStore>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    serve_range(&store, &id, &headers).await
}

async fn video_info(State(store): State<Arc<AssetStore>>) -> ApiResult<Json<VideoInfo>> {
    let descriptor = store.descriptor(VIDEO_ASSET_ID).await?;
    Ok(Json(VideoInfo {
        size: descriptor.size_bytes,
    }))
}

async fn asset_info(
    State(store): State<Arc<AssetStore>>,
    Path(id): Path<String>,
) -> ApiResult<Json<AssetInfo>> {
    let descriptor = store.descriptor(&id).await?;
    Ok(Json(AssetInfo {
        size:         descriptor.size_bytes,
        content_type: descriptor.content_type.clone(),
    }))
}

/// Serve `id` honouring an optional single `Range` header.
pub async fn serve_range(store: &AssetStore, id: &str, headers: &HeaderMap) -> Response {
    let response = match build_range_response(store, id, headers).await {
        Ok(response) => response,
        Err(e) => {
            debug!(asset = id, error = %e, "asset request rejected");
            e.into_response()
        }
    };
    ASSET_REQUESTS
        .with_label_values(&[response.status().as_str()])
        .inc();
    response
}

async fn build_range_response(
    store: &AssetStore,
    id: &str,
    headers: &HeaderMap,
) -> ApiResult<Response> {
    let descriptor = store.descriptor(id).await?;
    let size = descriptor.size_bytes;
    let range_header = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());

    let span = match parse_range(range_header, size) {
        Ok(span) => span,
        Err(RangeError::NotSatisfiable { size, .. }) => {
            return Err(ApiError::RangeNotSatisfiable { size });
        }
        Err(e @ RangeError::Malformed { .. }) => {
            debug!(asset = id, error = %e, "ignoring range header");
            None
        }
    };

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&descriptor.content_type).map_err(|_| ApiError::Internal)?,
    );
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    let (status, span) = match span {
        Some(span) => {
            response_headers.insert(
                header::CONTENT_RANGE,
                HeaderValue::from_str(&span.content_range(size)).map_err(|_| ApiError::Internal)?,
            );
            (StatusCode::PARTIAL_CONTENT, Some(span))
        }
        None if size == 0 => (StatusCode::OK, None),
        None => (
            StatusCode::OK,
            Some(ByteRange {
                start: 0,
                end:   size - 1,
            }),
        ),
    };

    let Some(span) = span else {
        response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(0u64));
        return Ok((status, response_headers, Body::empty()).into_response());
    };

    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(span.len()));
    let reader = descriptor.open_span(span).await?;
    debug!(asset = id, range = %span, status = status.as_u16(), "streaming asset span");
    let body = span_body(reader, store.buffer_size(), descriptor);
    Ok((status, response_headers, body).into_response())
}

/// Stream a span through a fixed-size buffer. A read error ends the body
/// early; dropping the body (client gone) closes the file.
fn span_body(reader: Take<File>, buffer_size: usize, descriptor: &AssetDescriptor) -> Body {
    let path = descriptor.path.clone();
    let stream = ReaderStream::with_capacity(reader, buffer_size)
        .inspect_ok(|chunk| ASSET_BYTES_SERVED.inc_by(chunk.len() as u64))
        .inspect_err(move |e| {
            ASSET_STREAM_ERRORS.inc();
            warn!(path = %path.display(), error = %e, "asset read failed, aborting response");
        });
    Body::from_stream(stream)
}

async fn receive_upload(body: Body) -> ApiResult<Json<UploadReceipt>> {
    let mut stream = body.into_data_stream();
    let mut received: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ApiError::InvalidArgument {
            reason: format!("upload aborted: {e}"),
        })?;
        received += chunk.len() as u64;
    }
    UPLOAD_BYTES_RECEIVED.inc_by(received);
    debug!(bytes = received, "upload probe drained");
    Ok(Json(UploadReceipt {
        message: UPLOAD_RECEIVED_MESSAGE.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use axum_test::TestServer;

    use super::*;
    use crate::asset::AssetConfig;

    fn server_with(dir: &std::path::Path, video: &[u8]) -> TestServer {
        std::fs::write(dir.join("video.mp4"), video).unwrap();
        let config = AssetConfig::builder()
            .video_path(dir.join("video.mp4"))
            .extra_assets(BTreeMap::from([("empty".to_string(), dir.join("empty.dat"))]))
            .build();
        std::fs::write(dir.join("empty.dat"), b"").unwrap();
        TestServer::try_new(asset_router(Arc::new(AssetStore::new(&config)))).unwrap()
    }

    #[tokio::test]
    async fn test_full_body_without_range() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_with(dir.path(), b"0123456789");

        let response = server.get("/video").await;
        response.assert_status_ok();
        assert_eq!(response.header("content-length"), "10");
        assert_eq!(response.header("content-type"), "video/mp4");
        assert_eq!(response.header("accept-ranges"), "bytes");
        assert_eq!(response.as_bytes().as_ref(), b"0123456789");
    }

    #[tokio::test]
    async fn test_malformed_range_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_with(dir.path(), b"0123456789");

        let response = server
            .get("/video")
            .add_header(header::RANGE, HeaderValue::from_static("bytes=0-1,4-5"))
            .await;
        response.assert_status_ok();
        assert_eq!(response.as_bytes().as_ref(), b"0123456789");
    }

    #[tokio::test]
    async fn test_partial_content() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_with(dir.path(), b"0123456789");

        let response = server
            .get("/video")
            .add_header(header::RANGE, HeaderValue::from_static("bytes=2-5"))
            .await;
        response.assert_status(StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.header("content-range"), "bytes 2-5/10");
        assert_eq!(response.header("content-length"), "4");
        assert_eq!(response.as_bytes().as_ref(), b"2345");
    }

    #[tokio::test]
    async fn test_empty_asset() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_with(dir.path(), b"x");

        let response = server.get("/asset/empty").await;
        response.assert_status_ok();
        assert_eq!(response.header("content-length"), "0");

        let response = server
            .get("/asset/empty")
            .add_header(header::RANGE, HeaderValue::from_static("bytes=0-"))
            .await;
        response.assert_status(StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.header("content-range"), "bytes */0");
    }

    #[tokio::test]
    async fn test_video_info_and_missing_assets() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_with(dir.path(), &[1u8; 321]);

        let info: VideoInfo = server.get("/video-info").await.json();
        assert_eq!(info, VideoInfo { size: 321 });

        let info: AssetInfo = server.get("/asset/video/info").await.json();
        assert_eq!(info.size, 321);
        assert_eq!(info.content_type, "video/mp4");

        server
            .get("/asset/unknown")
            .expect_failure()
            .await
            .assert_status_not_found();
        server
            .get("/asset/unknown/info")
            .expect_failure()
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn test_upload_is_drained() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_with(dir.path(), b"x");

        let response = server
            .post("/api/speedtest")
            .bytes(vec![0u8; 3 * 1024 * 1024].into())
            .await;
        response.assert_status_ok();
        let receipt: UploadReceipt = response.json();
        assert_eq!(receipt.message, "Upload received");
    }
}
