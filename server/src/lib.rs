//! # Server
//!
//! HTTP API over a VDB [`Engine`](vdb_retrieval::Engine).

pub mod error;
pub mod routes;

use std::sync::Arc;

use tracing::info;
use vdb_retrieval::Engine;

pub use error::ApiError;
pub use routes::{AppState, router};

/// Serve the API on `bind` until ctrl-c.
pub async fn serve(engine: Arc<Engine>, bind: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
