use funcbridge::{
    application::config::{Environment, Phase, PhaseSelector},
    domain::models::{FunctionConfig, PersistedManifest},
    manifest::ManifestEmitter,
    registry::handler,
    runtime::Runtime,
};
use serde_json::{Value, json};

use super::support::{park_runtime, spawn_server};

#[tokio::test]
async fn introspect_persists_the_parameters_schema() {
    let dir = tempfile::tempdir().expect("temp dir");
    let runtime = Runtime::new(
        PhaseSelector::new(Environment::Local, Phase::Introspect, "127.0.0.1:14113"),
        dir.path(),
    );

    runtime
        .register(
            "double",
            handler(|_context, params| async move { Ok(params) }),
            FunctionConfig::new().with_parameters_schema(json!({
                "type": "object",
                "properties": {"data": {"type": "number"}},
                "required": ["data"],
            })),
        )
        .expect("register should emit");
    runtime.run().await.expect("introspect run should return");

    let body = std::fs::read_to_string(dir.path().join("double.json"))
        .expect("manifest file should exist");
    let manifest: Value = serde_json::from_str(&body).expect("manifest should parse");
    assert_eq!(
        manifest["config"]["parametersSchema"],
        json!({
            "type": "object",
            "properties": {"data": {"type": "number"}},
            "required": ["data"],
        })
    );
}

#[tokio::test]
async fn first_runtime_connection_reloads_the_store() {
    let server = spawn_server(&[]).await;

    // Nothing is registered yet, so the function cannot be invoked.
    let response = reqwest::Client::new()
        .post(server.invoke_url("late"))
        .json(&json!({}))
        .send()
        .await
        .expect("invoke should complete");
    assert_eq!(response.status(), 404);

    // The handler process emits its manifest and then connects.
    ManifestEmitter::new(&server.manifests_dir)
        .emit(
            &PersistedManifest {
                name: "late".to_owned(),
                config: FunctionConfig::new(),
            },
            1,
        )
        .expect("emit should succeed");
    let _next = park_runtime(&server).await;

    let health: Value = reqwest::get(format!("{}/", server.base_url()))
        .await
        .expect("health should respond")
        .json()
        .await
        .expect("health should be json");
    assert_eq!(health["functions"], 1);

    server.stop().await;
}
