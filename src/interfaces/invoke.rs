use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value};

use crate::{
    application::state::SharedState,
    bridge::{InvokeReply, TriggerOutcome},
    domain::models::InvocationContext,
    interfaces::http::{client_error, handler_failure_response},
    session::SessionGuard,
};

const PASSTHROUGH_AUTH_HEADER: &str = "x-bb-api-key";

pub async fn invoke_handler(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body_map = match parse_body(&body) {
        Ok(map) => map,
        Err(message) => return client_error(StatusCode::BAD_REQUEST, "Bad Request", &message),
    };

    let params = body_map
        .get("params")
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));
    if !params.is_object() {
        return client_error(
            StatusCode::BAD_REQUEST,
            "Bad Request",
            "params must be a JSON object",
        );
    }

    let caller_context = match body_map.get("context") {
        None | Some(Value::Null) => None,
        Some(Value::Object(fields)) => Some(fields.clone()),
        Some(_) => {
            return client_error(
                StatusCode::BAD_REQUEST,
                "Bad Request",
                "context must be a JSON object",
            );
        }
    };

    let Some(manifest) = state.manifest(&name).await else {
        return client_error(
            StatusCode::NOT_FOUND,
            "Not Found",
            "Function not found in registry",
        );
    };

    let api_key = headers
        .get(PASSTHROUGH_AUTH_HEADER)
        .and_then(|value| value.to_str().ok());
    let session_config = manifest
        .config
        .session_config
        .clone()
        .unwrap_or_else(|| Value::Object(Map::new()));
    let session = match state.provider().create(&session_config, api_key).await {
        Ok(session) => session,
        Err(error) => {
            return client_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create browser session",
                &error.to_string(),
            );
        }
    };

    // From here on the guard owns the release, whatever path we exit by.
    let _session_guard = SessionGuard::new(state.provider(), session.id.clone());

    let context = match caller_context {
        Some(fields) => InvocationContext::from_caller(fields, session),
        None => InvocationContext::synthesized(session),
    };

    let (request_id, completion) = match state.bridge().trigger(&name, params, context) {
        TriggerOutcome::Triggered {
            request_id,
            completion,
        } => (request_id, completion),
        TriggerOutcome::Busy => {
            return client_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "Service Unavailable",
                "Another invocation is in progress",
            );
        }
        TriggerOutcome::NoRuntime => {
            return client_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "Service Unavailable",
                "No runtime connected",
            );
        }
    };

    // If this handler is dropped before the runtime reports back (client
    // abort) or the deadline expires, the invocation must not stay active.
    let abort_guard = AbortGuard::new(state.clone(), request_id);

    match tokio::time::timeout(state.bridge().invoke_timeout(), completion).await {
        Ok(Ok(InvokeReply::Success(result))) => {
            abort_guard.disarm();
            (StatusCode::OK, Json(result)).into_response()
        }
        Ok(Ok(InvokeReply::Failure(error))) => {
            abort_guard.disarm();
            handler_failure_response(&error)
        }
        Ok(Err(_)) => client_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error",
            "invocation terminated without a response",
        ),
        Err(_) => client_error(
            StatusCode::GATEWAY_TIMEOUT,
            "Gateway Timeout",
            "invocation did not complete within the deadline",
        ),
    }
}

fn parse_body(body: &Bytes) -> Result<Map<String, Value>, String> {
    if body.is_empty() {
        return Ok(Map::new());
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|error| format!("invalid JSON body: {error}"))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err("request body must be a JSON object".to_owned()),
    }
}

struct AbortGuard {
    state: SharedState,
    request_id: String,
    armed: bool,
}

impl AbortGuard {
    fn new(state: SharedState, request_id: String) -> Self {
        Self {
            state,
            request_id,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if self.armed {
            self.state.bridge().abort_invocation(&self.request_id);
        }
    }
}
