use std::time::Duration;

use funcbridge::{
    domain::models::{FunctionConfig, PersistedManifest},
    registry::{FunctionRegistry, HandlerFailure, handler},
    runtime::poll_once,
};
use serde_json::{Value, json};

use super::support::{park_runtime, spawn_server, spawn_server_with};

fn echo_manifest() -> PersistedManifest {
    PersistedManifest {
        name: "echo".to_owned(),
        config: FunctionConfig::new(),
    }
}

#[tokio::test]
async fn mismatched_request_id_leaves_the_caller_waiting() {
    let server = spawn_server(&[echo_manifest()]).await;
    let next = park_runtime(&server).await;

    let invoke_url = server.invoke_url("echo");
    let invoke = tokio::spawn(async move {
        reqwest::Client::new()
            .post(invoke_url)
            .json(&json!({"params": {}}))
            .send()
            .await
            .expect("invoke should complete")
    });
    let next_response = next.await.expect("next task should join");
    let request_id = next_response
        .headers()
        .get("lambda-runtime-aws-request-id")
        .expect("request id header expected")
        .to_str()
        .expect("ascii")
        .to_owned();

    let mismatched = reqwest::Client::new()
        .post(server.outcome_url("not-the-active-id", "response"))
        .json(&json!({"y": 2}))
        .send()
        .await
        .expect("mismatched post should complete");
    assert_eq!(mismatched.status(), 400);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!invoke.is_finished(), "caller must still be held");

    let accepted = reqwest::Client::new()
        .post(server.outcome_url(&request_id, "response"))
        .json(&json!({"y": 2}))
        .send()
        .await
        .expect("matching post should complete");
    assert_eq!(accepted.status(), 202);

    let invoke_response = invoke.await.expect("invoke task should join");
    assert_eq!(invoke_response.status(), 200);
    let body: Value = invoke_response.json().await.expect("body should be json");
    assert_eq!(body, json!({"y": 2}));

    server.stop().await;
}

#[tokio::test]
async fn newer_runtime_connection_preempts_the_older() {
    let server = spawn_server(&[echo_manifest()]).await;

    let first = park_runtime(&server).await;
    let second_url = server.next_url();
    let second = tokio::spawn(async move {
        reqwest::get(second_url)
            .await
            .expect("second poll should complete")
    });

    let first_response = first.await.expect("first poll should join");
    assert_eq!(first_response.status(), 503);
    let body: Value = first_response.json().await.expect("body should be json");
    assert_eq!(body["error"], "Another runtime connected");

    let invoke_url = server.invoke_url("echo");
    let invoke = tokio::spawn(async move {
        reqwest::Client::new()
            .post(invoke_url)
            .json(&json!({"params": {}}))
            .send()
            .await
            .expect("invoke should complete")
    });

    let second_response = second.await.expect("second poll should join");
    assert_eq!(second_response.status(), 200);
    let request_id = second_response
        .headers()
        .get("lambda-runtime-aws-request-id")
        .expect("request id header expected")
        .to_str()
        .expect("ascii")
        .to_owned();
    let payload: Value = second_response.json().await.expect("payload should be json");
    assert_eq!(payload["functionName"], "echo");

    reqwest::Client::new()
        .post(server.outcome_url(&request_id, "response"))
        .json(&json!({}))
        .send()
        .await
        .expect("response post should complete");
    invoke.await.expect("invoke task should join");

    server.stop().await;
}

#[tokio::test]
async fn next_response_carries_the_lambda_runtime_headers() {
    let server = spawn_server(&[echo_manifest()]).await;
    let next = park_runtime(&server).await;

    let invoke_url = server.invoke_url("echo");
    let invoke = tokio::spawn(async move {
        reqwest::Client::new()
            .post(invoke_url)
            .json(&json!({"params": {}}))
            .send()
            .await
            .expect("invoke should complete")
    });

    let next_response = next.await.expect("next task should join");
    let headers = next_response.headers();
    let request_id = headers
        .get("lambda-runtime-aws-request-id")
        .expect("request id header expected")
        .to_str()
        .expect("ascii")
        .to_owned();
    let deadline: u64 = headers
        .get("lambda-runtime-deadline-ms")
        .expect("deadline header expected")
        .to_str()
        .expect("ascii")
        .parse()
        .expect("deadline should be numeric");
    assert!(deadline > 0);
    let arn = headers
        .get("lambda-runtime-invoked-function-arn")
        .expect("arn header expected")
        .to_str()
        .expect("ascii");
    assert!(arn.ends_with(":function:echo"));

    reqwest::Client::new()
        .post(server.outcome_url(&request_id, "response"))
        .json(&json!({}))
        .send()
        .await
        .expect("response post should complete");
    invoke.await.expect("invoke task should join");

    server.stop().await;
}

#[tokio::test]
async fn outcome_posts_without_an_active_invocation_are_rejected() {
    let server = spawn_server(&[echo_manifest()]).await;

    let response = reqwest::Client::new()
        .post(server.outcome_url("ghost-id", "response"))
        .json(&json!({}))
        .send()
        .await
        .expect("post should complete");
    assert_eq!(response.status(), 400);

    let incomplete_error = reqwest::Client::new()
        .post(server.outcome_url("ghost-id", "error"))
        .json(&json!({"errorMessage": "boom"}))
        .send()
        .await
        .expect("post should complete");
    assert_eq!(incomplete_error.status(), 400);

    server.stop().await;
}

#[tokio::test]
async fn poll_once_executes_a_registered_handler_end_to_end() {
    let server = spawn_server(&[PersistedManifest {
        name: "double".to_owned(),
        config: FunctionConfig::new(),
    }])
    .await;

    let registry = FunctionRegistry::new();
    registry.register(
        "double",
        handler(|_context, params| async move {
            let data = params["data"]
                .as_f64()
                .ok_or_else(|| HandlerFailure::typed("data must be a number", "TypeError"))?;
            Ok(json!({"doubled": data * 2.0}))
        }),
        FunctionConfig::new(),
    );

    let base_url = server.base_url();
    let poll = tokio::spawn(async move {
        let client = reqwest::Client::new();
        poll_once(&client, &base_url, &registry)
            .await
            .expect("iteration should succeed");
    });

    // Give the poll task time to park before invoking.
    let base_url = server.base_url();
    super::support::wait_until(move || {
        let health_url = format!("{base_url}/");
        async move {
            let health: Value = reqwest::get(health_url)
                .await
                .expect("health should respond")
                .json()
                .await
                .expect("health should be json");
            health["runtimeConnected"] == true
        }
    })
    .await;

    let response = reqwest::Client::new()
        .post(server.invoke_url("double"))
        .json(&json!({"params": {"data": 21}}))
        .send()
        .await
        .expect("invoke should complete");
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("body should be json");
    assert_eq!(body, json!({"doubled": 42.0}));

    poll.await.expect("poll task should join");
    server.stop().await;
}

#[tokio::test]
async fn handler_failure_flows_through_poll_once_as_a_runtime_error() {
    let server = spawn_server(&[PersistedManifest {
        name: "crash".to_owned(),
        config: FunctionConfig::new(),
    }])
    .await;

    let registry = FunctionRegistry::new();
    registry.register(
        "crash",
        handler(|_context, _params| async move {
            Err::<Value, _>(HandlerFailure::typed("kaboom", "CrashError"))
        }),
        FunctionConfig::new(),
    );

    let base_url = server.base_url();
    let poll = tokio::spawn(async move {
        let client = reqwest::Client::new();
        poll_once(&client, &base_url, &registry)
            .await
            .expect("user errors are not system errors");
    });

    let base_url = server.base_url();
    super::support::wait_until(move || {
        let health_url = format!("{base_url}/");
        async move {
            let health: Value = reqwest::get(health_url)
                .await
                .expect("health should respond")
                .json()
                .await
                .expect("health should be json");
            health["runtimeConnected"] == true
        }
    })
    .await;

    let response = reqwest::Client::new()
        .post(server.invoke_url("crash"))
        .json(&json!({"params": {}}))
        .send()
        .await
        .expect("invoke should complete");
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.expect("body should be json");
    assert_eq!(body["error"]["message"], "kaboom");
    assert_eq!(body["error"]["type"], "CrashError");

    poll.await.expect("poll task should join");
    server.stop().await;
}

#[tokio::test]
async fn expired_deadline_times_the_caller_out_and_releases_the_session() {
    let server = spawn_server_with(&[echo_manifest()], |config| {
        config.invoke_timeout = Duration::from_millis(200);
    })
    .await;
    let next = park_runtime(&server).await;

    let response = reqwest::Client::new()
        .post(server.invoke_url("echo"))
        .json(&json!({"params": {}}))
        .send()
        .await
        .expect("invoke should complete");
    assert_eq!(response.status(), 504);

    let next_response = next.await.expect("next task should join");
    let request_id = next_response
        .headers()
        .get("lambda-runtime-aws-request-id")
        .expect("request id header expected")
        .to_str()
        .expect("ascii")
        .to_owned();

    // The invocation was aborted; a late post is a mismatch.
    let late = reqwest::Client::new()
        .post(server.outcome_url(&request_id, "response"))
        .json(&json!({}))
        .send()
        .await
        .expect("late post should complete");
    assert_eq!(late.status(), 400);

    let provider = server.provider.clone();
    super::support::wait_until(move || {
        let provider = provider.clone();
        async move { provider.released() == 1 }
    })
    .await;

    server.stop().await;
}
