use crate::config::ProxyConfig;
use crate::logging::SharedLogger;
use crate::models::DEFAULT_MODEL;
use crate::proxy;
use crate::token::TokenProvider;
use crate::translate::openai_types::{ChatCompletionRequest, ErrorResponse};

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::stream::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub config: ProxyConfig,
    pub client: reqwest::Client,
    pub tokens: Arc<dyn TokenProvider>,
    pub logger: SharedLogger,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/v1/models", get(handle_models))
        .route("/v1/chat/completions", post(handle_chat_completions))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Bearer auth is optional: enforced only when the token env var is set.
    if let Some(expected) = state.config.resolve_auth_token() {
        if !bearer_matches(&headers, &expected) {
            let err = ErrorResponse::authentication("Invalid or missing bearer token");
            return (StatusCode::UNAUTHORIZED, Json(err)).into_response();
        }
    }

    let req: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            state
                .logger
                .error("server", format!("Failed to parse request: {e}"));
            let err = ErrorResponse::invalid_request(format!("Invalid request body: {e}"));
            return (StatusCode::BAD_REQUEST, Json(err)).into_response();
        }
    };

    if req.messages.is_empty() {
        let err = ErrorResponse::invalid_request("messages must be a non-empty array");
        return (StatusCode::BAD_REQUEST, Json(err)).into_response();
    }

    let model = req
        .model
        .clone()
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    if !state.config.is_model_allowed(&model) {
        let err = ErrorResponse::invalid_request(format!(
            "Model '{}' is not supported. Allowed models: {}",
            model,
            state.config.models.join(", ")
        ));
        return (StatusCode::BAD_REQUEST, Json(err)).into_response();
    }

    let is_streaming = req.stream.unwrap_or(false);

    state.logger.info(
        "server",
        format!(
            "Request: model={} streaming={} messages={}",
            model,
            is_streaming,
            req.messages.len()
        ),
    );

    if is_streaming {
        handle_streaming(state, &req, &model).await
    } else {
        handle_non_streaming(state, &req, &model).await
    }
}

async fn handle_non_streaming(
    state: Arc<AppState>,
    req: &ChatCompletionRequest,
    model: &str,
) -> Response {
    match proxy::proxy_non_streaming(
        req,
        model,
        &state.config,
        &state.client,
        state.tokens.as_ref(),
        &state.logger,
    )
    .await
    {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => {
            state.logger.error("server", format!("Proxy error: {e}"));
            let err = ErrorResponse::api_error(format!("Proxy error: {e}"));
            (StatusCode::BAD_GATEWAY, Json(err)).into_response()
        }
    }
}

async fn handle_streaming(
    state: Arc<AppState>,
    req: &ChatCompletionRequest,
    model: &str,
) -> Response {
    let relay = match proxy::proxy_streaming(
        req,
        model,
        &state.config,
        &state.client,
        state.tokens.as_ref(),
        &state.logger,
    )
    .await
    {
        Ok(s) => s,
        Err(e) => {
            state
                .logger
                .error("server", format!("Streaming setup error: {e}"));
            let err = ErrorResponse::api_error(format!("Streaming error: {e}"));
            return (StatusCode::BAD_GATEWAY, Json(err)).into_response();
        }
    };

    let event_stream =
        relay.map(|data| -> std::result::Result<Event, Infallible> { Ok(Event::default().data(data)) });

    Sse::new(event_stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "merlin-proxy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_models(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let models: Vec<serde_json::Value> = state
        .config
        .models
        .iter()
        .map(|name| {
            serde_json::json!({
                "id": name,
                "object": "model",
                "owned_by": "merlin",
            })
        })
        .collect();

    Json(serde_json::json!({ "data": models, "object": "list" }))
}

fn bearer_matches(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t == expected)
        .unwrap_or(false)
}
