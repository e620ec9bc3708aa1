//! HTTP routes: streaming chat, document retrieval, status.

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::exchange::{self, AppState, ChatRequest};

/// Create the router with all endpoints
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/status", get(status))
        .route("/api/chat/stream", post(chat_stream))
        .route("/api/documents/{id}", get(get_document))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "model": state.config.model.id,
    }))
}

/// Streaming chat endpoint. Failures before the stream starts surface as
/// HTTP errors (400 malformed, 500 upstream); once headers are committed,
/// every failure is an in-band `error` frame.
async fn chat_stream(State(state): State<AppState>, body: String) -> Response {
    let request: ChatRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("malformed request: {}", e)})),
            )
                .into_response();
        }
    };

    let selection = match exchange::validate(&request) {
        Ok(selection) => selection,
        Err(message) => {
            return (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response();
        }
    };

    // Pre-flight tool discovery; the catalog is also what the model sees
    let catalog = match state.tools.discover().await {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::error!(error = %e, "tool provider unavailable");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("tool provider unavailable: {}", e)})),
            )
                .into_response();
        }
    };

    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(exchange::run_exchange(state, request, selection, catalog, tx));

    let body = Body::from_stream(ReceiverStream::new(rx).map(|frame| {
        Ok::<_, std::convert::Infallible>(match serde_json::to_string(&frame) {
            Ok(json) => format!("{}\n", json),
            Err(_) => String::new(),
        })
    }));

    match Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(body)
    {
        Ok(response) => response,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn get_document(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.get(&id).await {
        Some(content) => (
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            content,
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "document not found or expired"})),
        )
            .into_response(),
    }
}
