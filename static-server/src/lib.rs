//! Static file server for the streaming output directory.
//!
//! Serves the manifest and segment files the muxer maintains, verbatim,
//! under the `/camera` route. Browsers loading the player from another
//! origin need permissive CORS, and playlists/manifests compress well, so
//! both layers are always on. Range requests and content types are handled
//! by `ServeDir`.

use axum::Router;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::CompressionLevel;

/// Route the streaming files are available on.
pub const STREAM_ROUTE: &str = "/camera";

/// Configuration for the file server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on; 0 picks the next available port
    pub port: u16,
    /// Directory the files are served from
    pub directory: PathBuf,
    /// Response compression level, 0 (fastest) to 9 (best)
    pub compression_level: u32,
}

/// Build the router serving `directory` under [`STREAM_ROUTE`].
pub fn router(directory: &Path, compression_level: u32) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new().quality(quality(compression_level));

    Router::new()
        .nest_service(STREAM_ROUTE, ServeDir::new(directory))
        .layer(cors)
        .layer(compression)
}

fn quality(level: u32) -> CompressionLevel {
    CompressionLevel::Precise(level.min(9) as i32)
}

/// Bind the configured port and serve until `shutdown` is cancelled.
///
/// The bound address is logged once the listener is up, which is how an
/// ephemeral port (port 0) gets reported.
pub async fn serve(config: ServerConfig, shutdown: CancellationToken) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], config.port)))
        .await
        .map_err(ServerError::Bind)?;
    let addr = listener.local_addr().map_err(ServerError::Bind)?;

    tracing::info!(
        directory = %config.directory.display(),
        "serving streaming files at http://{addr}{STREAM_ROUTE}"
    );

    let app = router(&config.directory, config.compression_level);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(ServerError::Serve)
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind server port: {0}")]
    Bind(std::io::Error),
    #[error("server error: {0}")]
    Serve(std::io::Error),
}
