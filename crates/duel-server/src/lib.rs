//! Duel Server - HTTP surface for the card mirror.
//!
//! Exposes the health probe and the client sync endpoint over any
//! [`CardStore`], and the CLI configuration for the `duel` binary.

pub mod config;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use duel_core::{CardStore, HealthStatus, SyncRequest, SyncResponse, SyncService};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

pub use config::Config;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState<S> {
    pub sync: SyncService<S>,
}

impl<S: CardStore> AppState<S> {
    pub fn new(store: S) -> Self {
        Self {
            sync: SyncService::new(store),
        }
    }
}

/// Error returned by handlers, rendered as a plain-text body.
#[derive(Debug)]
pub struct ApiError(pub StatusCode, pub String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

/// Builds the application router with permissive CORS and request tracing.
pub fn build_router<S: CardStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health::<S>))
        .route("/api/v1/cards/sync", post(sync_cards::<S>))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health<S: CardStore>(
    State(state): State<AppState<S>>,
) -> Result<Json<HealthStatus>, ApiError> {
    match state.sync.card_count().await {
        Ok(count) => Ok(Json(HealthStatus::healthy(count))),
        Err(e) => {
            error!("Health check failed: {}", e);
            Err(ApiError(
                StatusCode::SERVICE_UNAVAILABLE,
                "Database connection failed".to_string(),
            ))
        }
    }
}

async fn sync_cards<S: CardStore>(
    State(state): State<AppState<S>>,
    payload: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<Json<SyncResponse>, ApiError> {
    let Json(request) = payload?;

    match state.sync.sync_cards(&request.last_update).await {
        Ok(response) => Ok(Json(response)),
        Err(e) if e.is_client_input() => Err(ApiError(StatusCode::BAD_REQUEST, e.to_string())),
        Err(e) => {
            error!("Error syncing cards: {}", e);
            Err(ApiError(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to sync cards: {}", e),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_status() {
        let response = ApiError(StatusCode::SERVICE_UNAVAILABLE, "down".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
