use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::{
    application::config::RuntimeConfig,
    domain::{error::DomainError, models::Session},
};

/// Thin seam over the external browser-session API. `create` receives the
/// function's session config verbatim; `release` never fails upward.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn create(&self, config: &Value, api_key: Option<&str>) -> Result<Session, DomainError>;
    async fn release(&self, id: &str);
}

/// HTTP-backed provider. The configured project id is injected into every
/// create call; everything else passes through.
pub struct HttpSessionProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    project_id: Option<String>,
}

impl HttpSessionProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        project_id: Option<String>,
    ) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|error| {
                DomainError::SessionProvision(format!("failed to construct http client: {error}"))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key,
            project_id,
        })
    }

    pub fn from_config(config: &RuntimeConfig) -> Result<Self, DomainError> {
        Self::new(
            config.session_api_url.clone(),
            config.session_api_key.clone(),
            config.session_project_id.clone(),
        )
    }

    fn create_body(&self, config: &Value) -> Value {
        let mut body = match config {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        if let Some(project_id) = &self.project_id {
            body.entry("projectId".to_owned())
                .or_insert_with(|| json!(project_id));
        }
        Value::Object(body)
    }
}

#[async_trait]
impl SessionProvider for HttpSessionProvider {
    async fn create(&self, config: &Value, api_key: Option<&str>) -> Result<Session, DomainError> {
        let url = format!("{}/v1/sessions", self.base_url);
        let mut request = self.client.post(&url).json(&self.create_body(config));

        let key = api_key.map(str::to_owned).or_else(|| self.api_key.clone());
        if let Some(key) = key {
            request = request.header("x-bb-api-key", key);
        }

        let response = request.send().await.map_err(|error| {
            DomainError::SessionProvision(format!("session create request failed: {error}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::SessionProvision(format!(
                "session create failed with {status}: {body}"
            )));
        }

        let session = response.json::<Session>().await.map_err(|error| {
            DomainError::SessionProvision(format!("session response decode failed: {error}"))
        })?;
        info!("created browser session {}", session.id);
        Ok(session)
    }

    async fn release(&self, id: &str) {
        let url = format!("{}/v1/sessions/{id}", self.base_url);
        let mut request = self.client.delete(&url);
        if let Some(key) = &self.api_key {
            request = request.header("x-bb-api-key", key);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                info!("released browser session {id}");
            }
            Ok(response) => {
                warn!("session release for {id} returned {}", response.status());
            }
            Err(error) => {
                warn!("session release for {id} failed: {error}");
            }
        }
    }
}

/// Scoped session acquisition. Dropping the guard issues the release exactly
/// once, so every terminal path of the invoke handler (success, handler
/// error, trigger refusal, timeout, client abort) frees the session.
pub struct SessionGuard {
    provider: Arc<dyn SessionProvider>,
    session_id: Option<String>,
}

impl SessionGuard {
    #[must_use]
    pub fn new(provider: Arc<dyn SessionProvider>, session_id: impl Into<String>) -> Self {
        Self {
            provider,
            session_id: Some(session_id.into()),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(id) = self.session_id.take() {
            let provider = Arc::clone(&self.provider);
            tokio::spawn(async move {
                provider.release(&id).await;
            });
        }
    }
}
