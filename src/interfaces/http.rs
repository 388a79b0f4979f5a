use std::future::Future;

use axum::{
    Json, Router,
    extract::{Request, State},
    http::{HeaderValue, Method, StatusCode, header::HeaderMap},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::info;

use crate::{
    application::state::SharedState,
    domain::{error::DomainError, models::RuntimeErrorBody},
    interfaces::{invoke, runtime_api},
};

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(health_handler))
        .route("/v1/functions/{name}/invoke", post(invoke::invoke_handler))
        .route(
            "/2018-06-01/runtime/invocation/next",
            get(runtime_api::next_handler),
        )
        .route(
            "/2018-06-01/runtime/invocation/{request_id}/response",
            post(runtime_api::response_handler),
        )
        .route(
            "/2018-06-01/runtime/invocation/{request_id}/error",
            post(runtime_api::error_handler),
        )
        .fallback(not_found_handler)
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

pub async fn serve(
    listener: TcpListener,
    state: SharedState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DomainError> {
    let local_addr = listener.local_addr().map_err(|error| {
        DomainError::Unavailable(format!("failed to read listener address: {error}"))
    })?;

    info!(
        "funcbridge listening on http://{}:{}, manifests_dir={}",
        local_addr.ip(),
        local_addr.port(),
        state.config().manifests_dir.display(),
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|error| DomainError::Unavailable(format!("server runtime error: {error}")))
}

/// Preflight anywhere gets a bare 200; every response carries the permissive
/// local-dev CORS headers.
async fn cors(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::OK.into_response();
        apply_cors_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut());
    response
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        "access-control-allow-origin",
        HeaderValue::from_static("*"),
    );
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("Content-Type"),
    );
}

async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.health_payload().await))
}

async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({"error": "Not found"})))
}

/// Client-error body shape shared by every endpoint.
pub(crate) fn client_error(status: StatusCode, error: &str, message: &str) -> Response {
    (
        status,
        Json(json!({
            "error": error,
            "message": message,
        })),
    )
        .into_response()
}

/// The 500 the external caller receives when the handler failed.
pub(crate) fn handler_failure_response(error: &RuntimeErrorBody) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": {
                "message": error.error_message,
                "type": error.error_type,
                "stackTrace": error.stack_trace,
            }
        })),
    )
        .into_response()
}
