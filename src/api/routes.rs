//! HTTP handlers.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::FutureExt;

use crate::answer::{AnswerError, AnswerService, ValidationError};

use super::types::{
    ConnectionFields, ErrorResponse, HealthResponse, MessageResponse, SqlAnswerRequest,
    StatusResponse,
};

/// Shared application state.
pub struct AppState {
    pub service: Arc<AnswerService>,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

impl IntoResponse for AnswerError {
    fn into_response(self) -> Response {
        let status = match &self {
            AnswerError::Validation(_) | AnswerError::Config(_) => StatusCode::BAD_REQUEST,
            AnswerError::Connection(_) => StatusCode::BAD_GATEWAY,
            AnswerError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error_response(status, self.to_string())
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, AnswerError> {
    serde_json::from_slice(body).map_err(|e| ValidationError::Body(e.to_string()).into())
}

/// `POST /api/sqlanswer`
pub async fn sql_answer(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request = match parse_body::<SqlAnswerRequest>(&body)
        .and_then(|raw| raw.into_request().map_err(AnswerError::from))
    {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };

    // Not spawned: dropping this future must drop the connection.
    let outcome = AssertUnwindSafe(state.service.answer(request))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| {
            tracing::error!("Answer pipeline panicked");
            Err(AnswerError::Internal)
        });

    match outcome {
        Ok(message) => Json(MessageResponse { message }).into_response(),
        Err(e) => {
            tracing::warn!("Request failed: {}", e);
            e.into_response()
        }
    }
}

/// `POST /api/testsqlconnection`. Always 200; failures are reported in the status line.
pub async fn test_sql_connection(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Json<StatusResponse> {
    let status = match parse_body::<ConnectionFields>(&body)
        .and_then(|fields| fields.into_params().map_err(AnswerError::from))
    {
        Ok(params) => state.service.test_connection(&params).await,
        Err(e) => {
            tracing::warn!("Connection test rejected: {}", e);
            format!("Connection Error: {}", e)
        }
    };
    Json(StatusResponse { status })
}

/// `GET /api/health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
