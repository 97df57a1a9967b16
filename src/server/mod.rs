use crate::access::{AccessPolicy, RoleAccessPolicy, UserDirectory};
use crate::config::Config;
use crate::library::MediaLibrary;
use crate::players::{InMemoryPlayers, PlayerRegistry};
use crate::stats::UserStats;
use crate::streaming::{SessionSettings, StatusRegistry};
use crate::transcoding::{program_overrides, RuleTranscodingResolver, TranscodingResolver};
use anyhow::{Context, Result};
use axum::{
    http::{header, Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use streamforged_media::HlsPlaylistGenerator;
use tokio::signal;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod auth;
mod error;
pub mod routes_hls;
pub mod routes_status;
pub mod routes_stream;

pub use auth::{HmacUrlSigner, UrlSigner};
pub use error::AppError;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub library: Arc<dyn MediaLibrary>,
    pub players: Arc<dyn PlayerRegistry>,
    pub users: Arc<UserDirectory>,
    pub access: Arc<dyn AccessPolicy>,
    pub resolver: Arc<dyn TranscodingResolver>,
    /// Every running stream, per player.
    pub registry: Arc<StatusRegistry>,
    pub stats: Arc<UserStats>,
    pub signer: Arc<dyn UrlSigner>,
    /// Admission for copy loops, sized `max_concurrent_streams`.
    pub streams: Arc<Semaphore>,
    /// Cancelled on shutdown; every session holds a child token.
    pub shutdown: CancellationToken,
    pub program_overrides: Arc<Vec<(String, PathBuf)>>,
}

impl AppContext {
    /// Context with the default collaborators built from `config`.
    ///
    /// Without `[signing] secret` a random one is generated, so signed URLs
    /// do not survive a restart.
    pub fn new(config: Config, library: Arc<dyn MediaLibrary>) -> Self {
        let secret = match &config.signing.secret {
            Some(secret) => secret.clone(),
            None => {
                tracing::warn!("No signing secret configured, generated an ephemeral one");
                auth::generate_secret()
            }
        };

        let streaming = &config.streaming;
        Self {
            library,
            players: Arc::new(InMemoryPlayers::from_config(
                streaming.default_user.as_str(),
                &config.players,
            )),
            users: Arc::new(UserDirectory::new(
                &config.users,
                streaming.default_user.as_str(),
            )),
            access: Arc::new(RoleAccessPolicy),
            resolver: Arc::new(RuleTranscodingResolver::new(&config.transcoding)),
            registry: Arc::new(StatusRegistry::new(
                streaming.status_history_length,
                Duration::from_millis(streaming.status_sample_interval_ms),
            )),
            stats: Arc::new(UserStats::new()),
            signer: Arc::new(HmacUrlSigner::new(secret)),
            streams: Arc::new(Semaphore::new(streaming.max_concurrent_streams)),
            shutdown: CancellationToken::new(),
            program_overrides: Arc::new(program_overrides(&config.tools)),
            config: Arc::new(config),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings::from(&self.config.streaming)
    }

    pub fn playlist_generator(&self) -> HlsPlaylistGenerator {
        HlsPlaylistGenerator::new(self.config.hls.segment_duration_secs)
    }

    pub fn stall_timeout(&self) -> Option<Duration> {
        match self.config.transcoding.stall_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Prefix for URLs embedded in playlists.
    pub fn public_url(&self) -> &str {
        self.config
            .server
            .public_url
            .as_deref()
            .unwrap_or("")
            .trim_end_matches('/')
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([header::RANGE, header::CONTENT_TYPE])
        .expose_headers([
            header::CONTENT_RANGE,
            header::CONTENT_LENGTH,
            header::ACCEPT_RANGES,
        ]);

    let ext_routes = Router::new()
        .route("/ext/stream", get(routes_stream::stream))
        .route("/ext/hls", get(routes_hls::hls_playlist))
        .route_layer(middleware::from_fn_with_state(
            ctx.clone(),
            auth::verify_signed_request,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/stream", get(routes_stream::stream))
        .route("/hls", get(routes_hls::hls_playlist))
        .route("/api/status", get(routes_status::status))
        .merge(ext_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Start the HTTP server
pub async fn start_server(config: Config, library: Arc<dyn MediaLibrary>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let ctx = AppContext::new(config, library);
    let shutdown = ctx.shutdown.clone();
    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then cancel `token` so running streams end.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    token.cancel();
}
