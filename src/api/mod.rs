//! HTTP API for SQL Answer.
//!
//! ## Endpoints
//!
//! - `POST /api/sqlanswer` - Answer a question against the supplied database
//! - `POST /api/testsqlconnection` - Check that the supplied database is reachable
//! - `GET /api/health` - Health check

mod routes;
pub mod types;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::answer::AnswerService;

pub use routes::AppState;

/// Build the router around an existing service.
pub fn router(service: Arc<AnswerService>) -> Router {
    let state = Arc::new(AppState { service });
    Router::new()
        .route("/api/sqlanswer", post(routes::sql_answer))
        .route("/api/testsqlconnection", post(routes::test_sql_connection))
        .route("/api/health", get(routes::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until the process exits.
pub async fn serve(addr: &str, service: Arc<AnswerService>) -> anyhow::Result<()> {
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
