//! Integration tests for `/stream` and `/ext/stream`.

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::Utc;
use common::{body_bytes, header, media_file, test_bytes, TestHarness};
use streamforged::config::{Config, PlayerConfig};
use streamforged_common::{MediaFileId, PlaylistId, User};

#[tokio::test]
async fn streams_whole_raw_file() {
    let harness = TestHarness::new();
    let content = test_bytes(5000);
    harness.add_file(1, "mp3", &content);

    let response = harness.get("/stream?id=1").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("audio/mpeg"));
    assert_eq!(header(&response, "content-length"), Some("5000"));
    assert_eq!(header(&response, "accept-ranges"), Some("bytes"));
    assert_eq!(header(&response, "etag"), Some("\"1\""));
    assert_eq!(header(&response, "x-content-duration"), Some("100.0"));
    assert_eq!(body_bytes(response).await, content);
}

#[tokio::test]
async fn closed_range_returns_partial_content() {
    let harness = TestHarness::new();
    let content = test_bytes(5000);
    harness.add_file(1, "mp3", &content);

    let response = harness
        .request(
            Request::get("/stream?id=1")
                .header(header::RANGE, "bytes=1000-1999")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header(&response, "content-length"), Some("1000"));
    assert_eq!(
        header(&response, "content-range"),
        Some("bytes 1000-1999/5000")
    );
    assert_eq!(body_bytes(response).await, &content[1000..2000]);
}

#[tokio::test]
async fn open_range_streams_to_end() {
    let harness = TestHarness::new();
    let content = test_bytes(5000);
    harness.add_file(1, "mp3", &content);

    let response = harness
        .request(
            Request::get("/stream?id=1")
                .header(header::RANGE, "bytes=4500-")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header(&response, "content-range"),
        Some("bytes 4500-4999/5000")
    );
    assert_eq!(body_bytes(response).await, &content[4500..]);
}

#[tokio::test]
async fn range_past_end_is_unsatisfiable() {
    let harness = TestHarness::new();
    harness.add_file(1, "mp3", &test_bytes(5000));

    let response = harness
        .request(
            Request::get("/stream?id=1")
                .header(header::RANGE, "bytes=6000-")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(header(&response, "content-range"), Some("bytes */5000"));
    assert!(harness.ctx.registry.snapshot().is_empty());
}

#[tokio::test]
async fn unknown_file_is_not_found() {
    let harness = TestHarness::new();

    let response = harness.get("/stream?id=99").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = harness.get("/stream?id=abc").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn file_missing_on_disk_is_not_found() {
    let harness = TestHarness::new();
    harness.add_entry(media_file(
        3,
        harness.dir.path().join("gone.mp3"),
        "mp3",
        1000,
    ));

    let response = harness.get("/stream?id=3").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn user_without_stream_role_is_forbidden() {
    let mut config = Config::default();
    config.users.push(User {
        name: "bob".into(),
        stream_role: false,
        max_bit_rate: 0,
    });
    config.players.push(PlayerConfig {
        id: "bobs-radio".into(),
        username: "bob".into(),
        client_id: None,
        max_bit_rate: 0,
    });
    let harness = TestHarness::with_config(config);
    harness.add_file(1, "mp3", &test_bytes(100));

    let response = harness.get("/stream?id=1&player=bobs-radio").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = harness.get("/stream?id=1").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn shoutcast_request_gets_icy_headers_and_metadata() {
    let harness = TestHarness::new();
    let content = test_bytes(20_000);
    harness.add_file(1, "mp3", &content);

    let response = harness
        .request(
            Request::get("/stream?id=1")
                .header("Icy-MetaData", "1")
                .header(header::RANGE, "bytes=100-")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "icy-metaint"), Some("8192"));
    assert_eq!(header(&response, "icy-name"), Some("streamforged"));
    assert_eq!(header(&response, "icy-genre"), Some("Mixed"));
    assert!(header(&response, "content-length").is_none());
    assert!(header(&response, "content-range").is_none());

    let body = body_bytes(response).await;
    assert!(body.len() > content.len());
    assert_eq!(&body[..8192], &content[..8192]);
}

#[tokio::test]
async fn stream_counts_bytes_per_user() {
    let harness = TestHarness::new();
    harness.add_file(1, "mp3", &test_bytes(3000));

    let response = harness.get("/stream?id=1").await;
    assert_eq!(body_bytes(response).await.len(), 3000);

    // The session records its totals when it is dropped on the blocking pool.
    for _ in 0..50 {
        if harness.ctx.stats.bytes_streamed("guest") == 3000 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(harness.ctx.stats.bytes_streamed("guest"), 3000);
}

#[tokio::test]
async fn saturated_pool_rejects_with_503() {
    let mut config = Config::default();
    config.streaming.max_concurrent_streams = 1;
    let harness = TestHarness::with_config(config);
    harness.add_file(1, "mp3", &test_bytes(100));

    let held = harness.ctx.streams.clone().try_acquire_owned().unwrap();
    let response = harness.get("/stream?id=1").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    drop(held);
    let response = harness.get("/stream?id=1").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn ext_stream_requires_valid_signature() {
    let harness = TestHarness::new();
    let content = test_bytes(500);
    harness.add_file(1, "mp3", &content);

    let response = harness.get("/ext/stream?id=1").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let signed = harness
        .ctx
        .signer
        .sign("/ext/stream?id=1", Utc::now() + chrono::Duration::minutes(5));
    let response = harness.get(&signed).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, content);

    let expired = harness
        .ctx
        .signer
        .sign("/ext/stream?id=1", Utc::now() - chrono::Duration::minutes(5));
    let response = harness.get(&expired).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn status_lists_users() {
    let harness = TestHarness::new();
    harness.ctx.stats.add_bytes_streamed("alice", 42);

    let response = harness.get("/api/status").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["users"]["alice"], 42);
    assert!(body["transfers"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn health_check_is_ok() {
    let harness = TestHarness::new();
    assert_eq!(harness.get("/health").await.status(), StatusCode::OK);
}

/// Read `response` until it ends, failing after `limit`.
async fn drain(mut response: reqwest::Response, limit: Duration) -> usize {
    tokio::time::timeout(limit, async move {
        let mut total = 0;
        while let Some(chunk) = response.chunk().await.expect("stream failed") {
            total += chunk.len();
        }
        total
    })
    .await
    .expect("stream did not end")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn new_queue_stream_terminates_previous_one() {
    let mut config = Config::default();
    config.streaming.chunk_size = 1024;
    config.streaming.idle_filler_delay_ms = 200;
    let harness = TestHarness::with_config(config);
    let file = harness.add_file(1, "mp3", &test_bytes(4000));
    harness
        .ctx
        .players
        .resolve(Some("kitchen"), None)
        .play_queue()
        .lock()
        .set_files(vec![file]);

    let addr = harness.serve().await;
    let url = format!("http://{addr}/stream?player=kitchen");
    let client = reqwest::Client::new();

    let mut first = client.get(&url).send().await.unwrap();
    assert_eq!(first.status(), reqwest::StatusCode::OK);
    let mut received = 0;
    while received < 4000 {
        received += first.chunk().await.unwrap().expect("ended early").len();
    }

    let second = client.get(&url).send().await.unwrap();
    assert_eq!(second.status(), reqwest::StatusCode::OK);

    // The first stream was idling on a stopped queue; it must now end.
    drain(first, Duration::from_secs(5)).await;
    drop(second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_file_streams_do_not_terminate_each_other() {
    let harness = TestHarness::new();
    let content = test_bytes(50_000);
    harness.add_file(1, "mp3", &content);

    let addr = harness.serve().await;
    let url = format!("http://{addr}/stream?id=1&player=phone");
    let client = reqwest::Client::new();

    let first = client.get(&url).send().await.unwrap();
    let second = client.get(&url).send().await.unwrap();
    assert_eq!(first.status(), reqwest::StatusCode::OK);
    assert_eq!(second.status(), reqwest::StatusCode::OK);

    assert_eq!(drain(first, Duration::from_secs(5)).await, content.len());
    assert_eq!(drain(second, Duration::from_secs(5)).await, content.len());
}

/// Harness with playlist 9 holding files 1 (3000 bytes) and 2 (2000 bytes).
fn podcast_harness() -> (TestHarness, Vec<u8>) {
    let mut config = Config::default();
    config.streaming.chunk_size = 1024;
    config.streaming.idle_filler_delay_ms = 200;
    let harness = TestHarness::with_config(config);
    let first = test_bytes(3000);
    let second = test_bytes(2000);
    harness.add_file(1, "mp3", &first);
    harness.add_file(2, "mp3", &second);
    harness.library.insert_playlist(
        PlaylistId::from(9),
        vec![MediaFileId::from(1), MediaFileId::from(2)],
    );
    (harness, [first, second].concat())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn podcast_streams_for_one_player_coexist() {
    let (harness, content) = podcast_harness();
    let addr = harness.serve().await;
    let url = format!("http://{addr}/stream?playlist=9&player=car");
    let client = reqwest::Client::new();

    let first = client.get(&url).send().await.unwrap();
    let second = client.get(&url).send().await.unwrap();
    assert_eq!(first.status(), reqwest::StatusCode::OK);
    assert_eq!(second.status(), reqwest::StatusCode::OK);
    assert!(first.headers().get("content-length").is_none());

    let (a, b) = tokio::join!(
        drain(first, Duration::from_secs(5)),
        drain(second, Duration::from_secs(5))
    );
    assert_eq!(a, content.len());
    assert_eq!(b, content.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn podcast_does_not_terminate_queue_stream() {
    let (harness, content) = podcast_harness();
    let queued = harness.add_file(3, "mp3", &test_bytes(500));
    harness
        .ctx
        .players
        .resolve(Some("car"), None)
        .play_queue()
        .lock()
        .set_files(vec![queued]);

    let addr = harness.serve().await;
    let client = reqwest::Client::new();

    let mut queue_stream = client
        .get(format!("http://{addr}/stream?player=car"))
        .send()
        .await
        .unwrap();
    assert_eq!(queue_stream.status(), reqwest::StatusCode::OK);

    let podcast = client
        .get(format!("http://{addr}/stream?playlist=9&player=car"))
        .send()
        .await
        .unwrap();
    assert_eq!(podcast.status(), reqwest::StatusCode::OK);
    let body = podcast.bytes().await.unwrap();
    assert_eq!(body.as_ref(), content.as_slice());

    // Still alive: past its 500 audio bytes it keeps sending idle filler.
    let mut received = 0;
    while received <= 500 {
        let chunk = tokio::time::timeout(Duration::from_secs(5), queue_stream.chunk())
            .await
            .expect("queue stream stalled")
            .unwrap()
            .expect("queue stream ended");
        received += chunk.len();
    }
    assert!(harness
        .ctx
        .registry
        .snapshot()
        .iter()
        .any(|t| t.kind == streamforged::streaming::StreamKind::Queue));
}
