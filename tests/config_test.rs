//! Integration tests for configuration loading and config-driven transcoding.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{body_bytes, header, test_bytes, TestHarness};
use streamforged::config::{self, TranscodingRule};
use streamforged::library::{InMemoryLibrary, MediaLibrary};
use streamforged_common::{MediaFileId, PlaylistId};

fn rule(name: &str, source: &str, step: &str) -> TranscodingRule {
    TranscodingRule {
        name: name.into(),
        source_formats: vec![source.into()],
        target_format: "mp3".into(),
        steps: vec![step.into()],
    }
}

#[test]
fn config_file_and_catalog_load_together() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = dir.path().join("library.json");
    std::fs::write(
        &catalog,
        r#"{
            "files": [
                {"id": 1, "path": "/music/a.mp3", "format": "mp3", "size": 4000, "duration_secs": 10},
                {"id": 2, "path": "/music/b.flac", "format": "flac", "size": 9000}
            ],
            "playlists": [{"id": 7, "files": [2, 1]}]
        }"#,
    )
    .unwrap();

    let config_path = dir.path().join("streamforged.toml");
    std::fs::write(
        &config_path,
        format!(
            "[server]\nport = 4545\n\n[library]\ncatalog = {:?}\n",
            catalog.display().to_string()
        ),
    )
    .unwrap();

    let config = config::load_config_or_default(Some(&config_path)).unwrap();
    assert_eq!(config.server.port, 4545);

    let library = InMemoryLibrary::load(config.library.catalog.as_deref().unwrap()).unwrap();
    assert_eq!(library.len(), 2);
    assert_eq!(
        library
            .media_file(MediaFileId::from(1))
            .unwrap()
            .duration_secs,
        Some(10)
    );
    let playlist: Vec<_> = library
        .playlist_files(PlaylistId::from(7))
        .unwrap()
        .into_iter()
        .map(|f| f.id)
        .collect();
    assert_eq!(playlist, vec![MediaFileId::from(2), MediaFileId::from(1)]);
}

#[test]
fn malformed_catalog_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = dir.path().join("library.json");
    std::fs::write(&catalog, "{ not json").unwrap();
    assert!(InMemoryLibrary::load(&catalog).is_err());
}

/// Harness with one wav rule; `/stream?id=1&maxBitRate=8` on a one second
/// file predicts 1 * 8 * 1000 / 8 = 1000 bytes.
fn wav_harness(step: &str, content: &[u8]) -> TestHarness {
    let mut config = config::Config::default();
    config.transcoding.rules = vec![rule("wav to mp3", "wav", step)];
    let harness = TestHarness::with_config(config);
    harness.add_timed_file(1, "wav", content, 1);
    harness
}

#[cfg(unix)]
#[tokio::test]
async fn configured_rule_pipes_through_transcoder() {
    let content = test_bytes(1000);
    let harness = wav_harness("cat %s", &content);

    let response = harness.get("/stream?id=1&maxBitRate=8").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("audio/mpeg"));
    assert_eq!(header(&response, "accept-ranges"), Some("none"));
    assert_eq!(header(&response, "content-length"), Some("1000"));
    assert_eq!(body_bytes(response).await, content);
}

#[cfg(unix)]
#[tokio::test]
async fn short_transcode_is_padded_to_expected_length() {
    let content = test_bytes(2000);
    let harness = wav_harness("head -c 600 %s", &content);

    let response = harness.get("/stream?id=1&maxBitRate=8").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-length"), Some("1000"));
    let body = body_bytes(response).await;
    assert_eq!(body.len(), 1000);
    assert_eq!(&body[..600], &content[..600]);
    assert!(body[600..].iter().all(|b| *b == 0xFF));
}

#[cfg(unix)]
#[tokio::test]
async fn long_transcode_is_clipped_to_expected_length() {
    let content = test_bytes(3000);
    let harness = wav_harness("cat %s", &content);

    let response = harness.get("/stream?id=1&maxBitRate=8").await;

    assert_eq!(header(&response, "content-length"), Some("1000"));
    assert_eq!(body_bytes(response).await, &content[..1000]);
}

#[cfg(unix)]
#[tokio::test]
async fn padding_counts_towards_user_totals() {
    let harness = wav_harness("head -c 600 %s", &test_bytes(2000));

    let response = harness.get("/stream?id=1&maxBitRate=8").await;
    assert_eq!(body_bytes(response).await.len(), 1000);

    for _ in 0..50 {
        if harness.ctx.stats.bytes_streamed("guest") == 1000 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(harness.ctx.stats.bytes_streamed("guest"), 1000);
}

#[cfg(unix)]
#[tokio::test]
async fn range_on_transcoded_output_discards_prefix() {
    // No newlines, so `head -n 8` passes the whole file through.
    let content: Vec<u8> = (0..1000).map(|i| b'a' + (i % 26) as u8).collect();
    let harness = wav_harness("head -n %b %s", &content);

    let response = harness
        .request(
            Request::get("/stream?id=1&maxBitRate=8")
                .header(axum::http::header::RANGE, "bytes=100-199")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header(&response, "accept-ranges"), Some("bytes"));
    assert_eq!(header(&response, "content-length"), Some("100"));
    assert_eq!(header(&response, "content-range"), Some("bytes 100-199/1000"));
    assert_eq!(body_bytes(response).await, &content[100..200]);
}

#[tokio::test]
async fn missing_transcoder_is_bad_gateway() {
    let mut config = config::Config::default();
    config.transcoding.rules = vec![rule(
        "broken",
        "wav",
        "nonexistent_transcoder_12345 -i %s -",
    )];
    let harness = TestHarness::with_config(config);
    harness.add_file(1, "wav", &test_bytes(100));

    let response = harness.get("/stream?id=1").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["code"], "tool_error");
}

#[tokio::test]
async fn raw_format_skips_configured_rule() {
    let mut config = config::Config::default();
    config.transcoding.rules = vec![rule(
        "broken",
        "wav",
        "nonexistent_transcoder_12345 -i %s -",
    )];
    let harness = TestHarness::with_config(config);
    let content = test_bytes(300);
    harness.add_file(1, "wav", &content);

    let response = harness.get("/stream?id=1&format=raw").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("audio/x-wav"));
    assert_eq!(body_bytes(response).await, content);
}
