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
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use axum_test::TestServer;
use bandprobe_base::readable_size::ReadableSize;
use bandprobe_probe::{
    PlausibilityConfig, ProbeConfig, ProbeEndpoints, ProbeSnapshot, SampleOrigin, ThroughputProbe,
};
use bandprobe_server::{
    asset::{AssetConfig, AssetStore},
    routes::asset_router,
};
use jiff::SignedDuration;
use tempfile::TempDir;
use tokio::sync::{Mutex, Notify, oneshot};

/// Lets a test hold the first `GET /video` until it says so.
#[derive(Clone)]
struct GetHooks {
    started: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    release: Arc<Notify>,
}

#[derive(Clone)]
struct MemoryAsset {
    content:       Arc<Vec<u8>>,
    honour_ranges: bool,
    hooks:         Option<GetHooks>,
    gets:          Arc<AtomicUsize>,
    ranges:        Arc<std::sync::Mutex<Vec<(usize, usize)>>>,
}

impl MemoryAsset {
    fn new(len: usize) -> Self {
        Self {
            content:       Arc::new(vec![7_u8; len]),
            honour_ranges: true,
            hooks:         None,
            gets:          Arc::new(AtomicUsize::new(0)),
            ranges:        Arc::default(),
        }
    }
}

async fn memory_info(State(state): State<MemoryAsset>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "size": state.content.len() }))
}

async fn memory_get(headers: HeaderMap, State(state): State<MemoryAsset>) -> Response {
    let nth = state.gets.fetch_add(1, Ordering::SeqCst);
    if let (0, Some(hooks)) = (nth, state.hooks.as_ref()) {
        if let Some(tx) = hooks.started.lock().await.take() {
            let _ = tx.send(());
        }
        hooks.release.notified().await;
    }

    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("bytes="))
        .and_then(|value| value.split_once('-'))
        .and_then(|(start, end)| Some((start.parse::<usize>().ok()?, end.parse::<usize>().ok()?)));
    if let Some(requested) = range {
        state.ranges.lock().unwrap().push(requested);
    }

    match range {
        Some((start, end)) if state.honour_ranges && end < state.content.len() => {
            let mut response_headers = HeaderMap::new();
            response_headers.insert(
                header::CONTENT_RANGE,
                HeaderValue::from_str(&format!("bytes {start}-{end}/{}", state.content.len()))
                    .unwrap(),
            );
            (
                StatusCode::PARTIAL_CONTENT,
                response_headers,
                Bytes::copy_from_slice(&state.content[start..=end]),
            )
                .into_response()
        }
        _ => (StatusCode::OK, Bytes::copy_from_slice(&state.content)).into_response(),
    }
}

fn memory_server(asset: MemoryAsset) -> TestServer {
    let app = Router::new()
        .route("/video", get(memory_get))
        .route("/video-info", get(memory_info))
        .with_state(asset);
    test_server(app)
}

fn test_server(app: Router) -> TestServer {
    TestServer::builder()
        .http_transport()
        .try_build(app)
        .expect("failed to create test server")
}

fn base_url(server: &TestServer) -> String {
    server
        .server_address()
        .expect("server should have HTTP address")
        .to_string()
        .trim_end_matches('/')
        .to_string()
}

/// Loopback transfers are far faster than any real link; accept them all.
fn loopback_config(server: &TestServer) -> ProbeConfig {
    ProbeConfig::builder()
        .endpoints(ProbeEndpoints::with_base_url(base_url(server)))
        .chunk_sizes(vec![ReadableSize::kb(64), ReadableSize::kb(128)])
        .plausibility(
            PlausibilityConfig::builder()
                .min_elapsed(SignedDuration::ZERO)
                .min_mbps(0.0)
                .max_mbps(f64::MAX)
                .build(),
        )
        .request_timeout(SignedDuration::from_secs(5))
        .seed(11)
        .build()
}

async fn serve_file(len: usize) -> (TempDir, TestServer) {
    let dir = tempfile::tempdir().unwrap();
    let video = dir.path().join("video.mp4");
    tokio::fs::write(&video, vec![1_u8; len]).await.unwrap();
    let store = Arc::new(AssetStore::new(
        &AssetConfig::builder().video_path(video).build(),
    ));
    (dir, test_server(asset_router(store)))
}

#[tokio::test]
async fn range_server_yields_measured_readings() {
    let (_dir, server) = serve_file(1024 * 1024).await;
    let probe = ThroughputProbe::new(loopback_config(&server)).unwrap();

    let mut last_max = 0.0;
    for seq in 1..=6 {
        let reading = probe.measure_once().await;
        assert_eq!(reading.seq, seq);
        assert_eq!(reading.origin, SampleOrigin::Measured);
        assert!(reading.mbps > 0.0 && reading.mbps.is_finite());

        let snapshot = probe.snapshot();
        let max = snapshot.max_mbps.unwrap();
        assert!(max >= last_max);
        assert!(max >= reading.mbps);
        assert_eq!(snapshot.current_mbps, Some(reading.mbps));
        last_max = max;
    }
    assert_eq!(probe.snapshot().cycles, 6);
}

#[tokio::test]
async fn missing_asset_falls_back_to_the_band() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(AssetStore::new(
        &AssetConfig::builder()
            .video_path(dir.path().join("absent.mp4"))
            .build(),
    ));
    let server = test_server(asset_router(store));
    let probe = ThroughputProbe::new(loopback_config(&server)).unwrap();

    let reading = probe.measure_once().await;
    assert_eq!(reading.origin, SampleOrigin::Fallback);
    assert!((150.0..=900.0).contains(&reading.mbps));
    assert_eq!(probe.snapshot().origin, Some(SampleOrigin::Fallback));
}

#[tokio::test]
async fn size_comes_from_head_when_info_is_missing() {
    let asset = MemoryAsset::new(300_000);
    let ranges = Arc::clone(&asset.ranges);
    // `get` also answers HEAD with the full Content-Length.
    let server = test_server(
        Router::new()
            .route("/video", get(memory_get))
            .with_state(asset),
    );
    let config = ProbeConfig::builder()
        .endpoints(ProbeEndpoints::with_base_url(base_url(&server)))
        .chunk_sizes(vec![ReadableSize::kb(64)])
        .plausibility(
            PlausibilityConfig::builder()
                .min_elapsed(SignedDuration::ZERO)
                .min_mbps(0.0)
                .max_mbps(f64::MAX)
                .build(),
        )
        .request_timeout(SignedDuration::from_secs(5))
        .seed(5)
        .build();
    let meter = ThroughputProbe::new(config).unwrap();

    for _ in 0..8 {
        let reading = meter.measure_once().await;
        assert_eq!(reading.origin, SampleOrigin::Measured);
    }

    let ranges = ranges.lock().unwrap();
    assert_eq!(ranges.len(), 8);
    for &(start, end) in ranges.iter() {
        assert!(start <= end);
        assert!(end < 300_000, "range {start}-{end} runs past the asset");
    }
}

#[tokio::test]
async fn full_body_instead_of_partial_content_is_a_failure() {
    let mut asset = MemoryAsset::new(512 * 1024);
    asset.honour_ranges = false;
    let server = memory_server(asset);
    let probe = ThroughputProbe::new(loopback_config(&server)).unwrap();

    let reading = probe.measure_once().await;
    assert_eq!(reading.origin, SampleOrigin::Fallback);
}

#[tokio::test]
async fn implausibly_fast_samples_are_replaced() {
    let server = memory_server(MemoryAsset::new(512 * 1024));
    let mut config = loopback_config(&server);
    config.plausibility.max_mbps = 1e-6;
    let probe = ThroughputProbe::new(config).unwrap();

    let first = probe.measure_once().await;
    assert_eq!(first.origin, SampleOrigin::Fallback);
    let second = probe.measure_once().await;
    assert_eq!(second.origin, SampleOrigin::Fallback);
    assert!(second.mbps >= first.mbps * 0.9 - 1e-9);
    assert!(second.mbps <= first.mbps * 1.1 + 1e-9);
}

#[tokio::test]
async fn late_reading_never_overwrites_a_newer_one() {
    let (started_tx, started_rx) = oneshot::channel();
    let release = Arc::new(Notify::new());
    let mut asset = MemoryAsset::new(512 * 1024);
    asset.hooks = Some(GetHooks {
        started: Arc::new(Mutex::new(Some(started_tx))),
        release: Arc::clone(&release),
    });
    let server = memory_server(asset);
    let probe = Arc::new(ThroughputProbe::new(loopback_config(&server)).unwrap());

    let slow = tokio::spawn({
        let probe = Arc::clone(&probe);
        async move { probe.measure_once().await }
    });
    started_rx.await.unwrap();

    let fast = probe.measure_once().await;
    assert_eq!(fast.seq, 2);
    release.notify_one();
    let slow = slow.await.unwrap();
    assert_eq!(slow.seq, 1);

    let snapshot = probe.snapshot();
    assert_eq!(snapshot.last_seq, 2);
    assert_eq!(snapshot.current_mbps, Some(fast.mbps));
    assert_eq!(snapshot.max_mbps, Some(fast.mbps.max(slow.mbps)));
    assert_eq!(snapshot.cycles, 2);
}

#[tokio::test]
async fn dispose_discards_the_in_flight_cycle() {
    let (started_tx, started_rx) = oneshot::channel();
    let release = Arc::new(Notify::new());
    let mut asset = MemoryAsset::new(512 * 1024);
    asset.hooks = Some(GetHooks {
        started: Arc::new(Mutex::new(Some(started_tx))),
        release: Arc::clone(&release),
    });
    let server = memory_server(asset);
    let handle = ThroughputProbe::new(loopback_config(&server))
        .unwrap()
        .spawn();

    let rx = handle.subscribe();
    started_rx.await.unwrap();
    handle.dispose();
    release.notify_one();

    tokio::time::timeout(Duration::from_secs(5), handle.wait_for_stop())
        .await
        .expect("probe loop should stop after dispose");
    assert_eq!(*rx.borrow(), ProbeSnapshot::default());
}

#[tokio::test]
async fn timer_loop_publishes_snapshots_until_disposed() {
    let server = memory_server(MemoryAsset::new(512 * 1024));
    let mut config = loopback_config(&server);
    config.interval = SignedDuration::from_millis(20);
    let handle = ThroughputProbe::new(config).unwrap().spawn();
    let mut rx = handle.subscribe();

    tokio::time::timeout(Duration::from_secs(10), async {
        while rx.borrow_and_update().cycles < 3 {
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("three cycles should complete");

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.origin, Some(SampleOrigin::Measured));
    assert!(snapshot.max_mbps.unwrap() >= snapshot.current_mbps.unwrap());

    handle.dispose();
    assert!(handle.probe().is_disposed());
    handle.wait_for_stop().await;
}
