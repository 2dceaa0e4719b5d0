//! # weathervane-server - HTTP prediction service
//!
//! An axum server that loads trained checkpoints and classifies
//! base64-encoded weather images. The newest checkpoint is loaded on
//! startup; clients can switch models at runtime.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::router;
pub use state::{shared, ServerState, SharedState};

/// Bind and serve until cancelled.
pub async fn run(state: SharedState) -> Result<(), std::io::Error> {
    let (host, port) = {
        let state = state.lock().await;
        (state.config().host.clone(), state.config().port)
    };
    let app = router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr, "prediction server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
