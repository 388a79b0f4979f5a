use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use crate::{
    application::state::SharedState,
    bridge::NextReply,
    domain::models::RuntimeErrorBody,
    interfaces::http::client_error,
};

pub const HEADER_REQUEST_ID: &str = "lambda-runtime-aws-request-id";
pub const HEADER_DEADLINE_MS: &str = "lambda-runtime-deadline-ms";
pub const HEADER_FUNCTION_ARN: &str = "lambda-runtime-invoked-function-arn";

/// Long-poll endpoint the handler process parks on. Completed by the bridge
/// with the next invocation, or with a 503 when a newer runtime connection
/// takes the slot.
pub async fn next_handler(State(state): State<SharedState>) -> Response {
    let (receiver, first_connect) = state.bridge().hold_next();
    if first_connect {
        state.reload_manifests().await;
    }

    match receiver.await {
        Ok(NextReply::Invocation {
            request_id,
            deadline_ms,
            function_arn,
            payload,
        }) => {
            let mut response = (StatusCode::OK, Json(payload)).into_response();
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&request_id) {
                headers.insert(HEADER_REQUEST_ID, value);
            }
            if let Ok(value) = HeaderValue::from_str(&deadline_ms.to_string()) {
                headers.insert(HEADER_DEADLINE_MS, value);
            }
            if let Ok(value) = HeaderValue::from_str(&function_arn) {
                headers.insert(HEADER_FUNCTION_ARN, value);
            }
            response
        }
        Ok(NextReply::Preempted) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "Another runtime connected"})),
        )
            .into_response(),
        Err(_) => client_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Service Unavailable",
            "bridge is shutting down",
        ),
    }
}

/// Runtime reports a successful handler result.
pub async fn response_handler(
    State(state): State<SharedState>,
    Path(request_id): Path<String>,
    body: Bytes,
) -> Response {
    let result = if body.is_empty() {
        json!({})
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => value,
            Err(error) => {
                return client_error(
                    StatusCode::BAD_REQUEST,
                    "Bad Request",
                    &format!("invalid JSON body: {error}"),
                );
            }
        }
    };

    if state.bridge().complete_with_success(&request_id, result) {
        accepted()
    } else {
        mismatch()
    }
}

/// Runtime reports a failed handler. The body must carry the full error
/// shape before it is forwarded.
pub async fn error_handler(
    State(state): State<SharedState>,
    Path(request_id): Path<String>,
    body: Bytes,
) -> Response {
    let error: RuntimeErrorBody = match serde_json::from_slice(&body) {
        Ok(error) => error,
        Err(error) => {
            return client_error(
                StatusCode::BAD_REQUEST,
                "Bad Request",
                &format!("invalid runtime error body: {error}"),
            );
        }
    };
    if error.error_message.is_empty() || error.error_type.is_empty() {
        return client_error(
            StatusCode::BAD_REQUEST,
            "Bad Request",
            "errorMessage and errorType must be non-empty",
        );
    }

    if state.bridge().complete_with_error(&request_id, error) {
        accepted()
    } else {
        mismatch()
    }
}

fn accepted() -> Response {
    (StatusCode::ACCEPTED, Json(json!({"status": "accepted"}))).into_response()
}

fn mismatch() -> Response {
    client_error(
        StatusCode::BAD_REQUEST,
        "Bad Request",
        "requestId does not match the active invocation",
    )
}
