//! JSON-over-HTTP transport for the media server facade

pub mod handler;
pub mod wire;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use mediagraph_object_core::VERSION;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use handler::{RpcFailure, RpcHandler, BAD_REQUEST_CODE};
pub use wire::{RpcErrorBody, RpcRequest, RpcResponse};

/// Build the transport router: `POST /rpc` and `GET /health`
pub fn create_router(handler: Arc<RpcHandler>) -> Router {
    Router::new()
        .route("/rpc", post(rpc))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(handler)
}

async fn rpc(
    State(handler): State<Arc<RpcHandler>>,
    request: Result<Json<RpcRequest>, JsonRejection>,
) -> impl IntoResponse {
    let outcome = match request {
        Ok(Json(request)) => handler.handle(request).await,
        Err(rejection) => Err(RpcFailure::bad_request(rejection.body_text())),
    };

    match outcome {
        Ok(result) => (StatusCode::OK, Json(RpcResponse::Result(result))),
        Err(failure) => {
            let status = match failure {
                RpcFailure::BadRequest(_) => StatusCode::BAD_REQUEST,
                RpcFailure::Service(_) => StatusCode::OK,
            };
            (status, Json(RpcResponse::Error(failure.to_body())))
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": VERSION }))
}
