//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which writes media files into a temp dir,
//! registers them with an [`InMemoryLibrary`] and builds a full
//! [`AppContext`]. [`TestHarness::serve`] starts Axum on a random port for
//! tests that need a real connection.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use tower::ServiceExt;

use streamforged::config::Config;
use streamforged::library::InMemoryLibrary;
use streamforged::server::{create_router, AppContext};
use streamforged_common::{MediaFile, MediaFileId};

pub const TEST_SECRET: &str = "integration-test-secret";

/// Deterministic, non-repeating-looking file content.
pub fn test_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

pub struct TestHarness {
    pub ctx: AppContext,
    pub library: Arc<InMemoryLibrary>,
    pub dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(mut config: Config) -> Self {
        config.signing.secret = Some(TEST_SECRET.to_string());
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let library = Arc::new(InMemoryLibrary::new());
        let ctx = AppContext::new(config, library.clone());
        Self { ctx, library, dir }
    }

    /// Write `content` to disk and register it as media file `id`.
    pub fn add_file(&self, id: i64, format: &str, content: &[u8]) -> MediaFile {
        let path = self.dir.path().join(format!("{id}.{format}"));
        std::fs::write(&path, content).expect("failed to write media file");
        let file = media_file(id, path, format, content.len() as u64);
        self.library.insert_file(file.clone());
        file
    }

    /// Like [`add_file`](Self::add_file) with an explicit duration.
    pub fn add_timed_file(
        &self,
        id: i64,
        format: &str,
        content: &[u8],
        duration_secs: u32,
    ) -> MediaFile {
        let mut file = self.add_file(id, format, content);
        file.duration_secs = Some(duration_secs);
        self.library.insert_file(file.clone());
        file
    }

    /// Register a file that only exists in the library.
    pub fn add_entry(&self, file: MediaFile) {
        self.library.insert_file(file);
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.request(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        create_router(self.ctx.clone())
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// Start the router on a random port.
    pub async fn serve(&self) -> SocketAddr {
        let app = create_router(self.ctx.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .ok();
        });

        addr
    }
}

pub fn media_file(id: i64, path: PathBuf, format: &str, size: u64) -> MediaFile {
    MediaFile {
        id: MediaFileId::from(id),
        path,
        duration_secs: Some(100),
        bit_rate: Some(128),
        width: None,
        height: None,
        format: format.to_string(),
        size,
        is_directory: false,
        title: Some(format!("Track {id}")),
        artist: Some("Tester".to_string()),
        album: None,
        genre: None,
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("failed to read body")
        .to_bytes()
        .to_vec()
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}
