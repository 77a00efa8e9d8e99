use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::JwtVerifier;
use crate::ingest::Ingestion;

#[derive(Clone)]
pub struct AppState {
    pub ingestion: Arc<Ingestion>,
    pub verifier: Arc<JwtVerifier>,
}

/// Build the HTTP application router.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/topics", get(list_topics))
        .route("/message-to-kafka", post(publish_message))
        .layer(middleware::from_fn_with_state(state.clone(), require_role));

    Router::new()
        .nest("/api/v1", api)
        .fallback(not_found)
        .with_state(state)
}

pub async fn start_http_server(addr: String, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP server listening on http://{addr}");
    axum::serve(listener, build_router(state)).await
}

#[derive(Debug)]
pub enum ApiError {
    Validation(Vec<String>),
    Anonymous,
    InvalidToken,
    Forbidden,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(details) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Validation failed", "details": details }),
            ),
            ApiError::Anonymous => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Action is not allowed for anonymous" }),
            ),
            ApiError::InvalidToken => (StatusCode::FORBIDDEN, json!({ "error": "Invalid token" })),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                json!({ "error": "You are not allowed to perform this action!" }),
            ),
            ApiError::Internal(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": message }))
            }
        };
        (status, Json(body)).into_response()
    }
}

async fn require_role(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Anonymous)?;

    let claims = state.verifier.claims(token).map_err(|e| {
        warn!("rejected bearer token: {e}");
        ApiError::InvalidToken
    })?;
    if !state.verifier.is_authorized(&claims) {
        warn!(subject = %claims.sub, "subject lacks a permitted role");
        return Err(ApiError::Forbidden);
    }

    Ok(next.run(req).await)
}

async fn list_topics(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    state.ingestion.list_topics().await.map(Json).map_err(|e| {
        error!("failed to list topics: {e}");
        ApiError::Internal(e.to_string())
    })
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub topic: String,
    pub message: String,
}

impl PublishRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut details = Vec::new();
        if self.topic.is_empty() {
            details.push("\"topic\" is not allowed to be empty".to_string());
        }
        if self.message.is_empty() {
            details.push("\"message\" is not allowed to be empty".to_string());
        }
        if details.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(details))
        }
    }
}

async fn publish_message(
    State(state): State<AppState>,
    body: Result<Json<PublishRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::Validation(vec![e.body_text()]))?;
    request.validate()?;

    state
        .ingestion
        .publish(&request.topic, &request.message)
        .await
        .map_err(|e| {
            error!(topic = %request.topic, "failed to publish message: {e}");
            ApiError::Internal(e.to_string())
        })?;
    Ok(StatusCode::OK)
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "route not found" })),
    )
}
