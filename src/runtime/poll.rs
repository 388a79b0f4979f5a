use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info};

use crate::{
    application::config::{Environment, PhaseSelector},
    domain::{error::DomainError, models::{RuntimeErrorBody, RuntimeEventPayload}},
    interfaces::runtime_api::HEADER_REQUEST_ID,
    registry::{ExecuteError, FunctionRegistry},
};

const SYSTEM_ERROR_BACKOFF: Duration = Duration::from_millis(250);

/// Single-task poll/execute/report loop. User errors are reported to the
/// bridge and the loop continues; system errors are fatal in production and
/// logged-and-retried locally.
pub(crate) async fn poll_loop(
    selector: &PhaseSelector,
    registry: &FunctionRegistry,
) -> Result<(), DomainError> {
    // The next endpoint holds until work arrives, so this client must not
    // carry a request timeout.
    let client = reqwest::Client::builder().build().map_err(|error| {
        DomainError::Unavailable(format!("failed to construct http client: {error}"))
    })?;
    let base_url = selector.runtime_base_url();
    info!(
        "runtime loop polling {base_url} ({} function(s), {} environment)",
        registry.len(),
        selector.environment.label()
    );

    loop {
        if let Err(failure) = poll_once(&client, &base_url, registry).await {
            error!("runtime loop system error: {failure}");
            if selector.environment == Environment::Production {
                std::process::exit(1);
            }
            tokio::time::sleep(SYSTEM_ERROR_BACKOFF).await;
        }
    }
}

/// One iteration: long-poll next, execute, post the outcome. Every returned
/// error is a system error; handler failures are reported inline and produce
/// `Ok(())`.
pub async fn poll_once(
    client: &reqwest::Client,
    base_url: &str,
    registry: &FunctionRegistry,
) -> Result<(), DomainError> {
    let response = client
        .get(format!("{base_url}/2018-06-01/runtime/invocation/next"))
        .send()
        .await
        .map_err(|error| DomainError::Unavailable(format!("next poll failed: {error}")))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(DomainError::Unavailable(format!(
            "next poll returned {status}: {body}"
        )));
    }

    let request_id = response
        .headers()
        .get(HEADER_REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .ok_or_else(|| {
            DomainError::ProtocolMismatch("next response is missing the request id header".to_owned())
        })?;

    let payload: RuntimeEventPayload = response.json().await.map_err(|error| {
        DomainError::ProtocolMismatch(format!("invocation payload decode failed: {error}"))
    })?;
    debug!(
        "executing {} for request {request_id}",
        payload.function_name
    );

    match registry
        .execute(&payload.function_name, payload.params, payload.context)
        .await
    {
        Ok(result) => post_response(client, base_url, &request_id, &result).await,
        Err(ExecuteError::NotFound(name)) => Err(DomainError::FunctionNotFound(format!(
            "{name} is not registered in this process"
        ))),
        Err(ExecuteError::InvalidParameters(message)) => {
            let body = RuntimeErrorBody::new(message, "InvalidParametersError");
            post_error(client, base_url, &request_id, &body).await
        }
        Err(ExecuteError::Handler(failure)) => {
            let body = RuntimeErrorBody::from_failure(failure);
            post_error(client, base_url, &request_id, &body).await
        }
    }
}

async fn post_response(
    client: &reqwest::Client,
    base_url: &str,
    request_id: &str,
    result: &Value,
) -> Result<(), DomainError> {
    post_outcome(client, base_url, request_id, "response", result).await
}

async fn post_error(
    client: &reqwest::Client,
    base_url: &str,
    request_id: &str,
    error: &RuntimeErrorBody,
) -> Result<(), DomainError> {
    let body = serde_json::to_value(error)?;
    post_outcome(client, base_url, request_id, "error", &body).await
}

async fn post_outcome(
    client: &reqwest::Client,
    base_url: &str,
    request_id: &str,
    kind: &str,
    body: &Value,
) -> Result<(), DomainError> {
    let url = format!("{base_url}/2018-06-01/runtime/invocation/{request_id}/{kind}");
    let response = client
        .post(&url)
        .json(body)
        .send()
        .await
        .map_err(|error| DomainError::Unavailable(format!("{kind} post failed: {error}")))?;

    if !response.status().is_success() {
        let status = response.status();
        let detail = response.text().await.unwrap_or_default();
        return Err(DomainError::ProtocolMismatch(format!(
            "{kind} post for {request_id} returned {status}: {detail}"
        )));
    }
    Ok(())
}
