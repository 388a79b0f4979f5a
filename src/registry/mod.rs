use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
};

use serde_json::Value;

use crate::domain::models::{FunctionConfig, InvocationContext};

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, HandlerFailure>> + Send>>;
pub type HandlerFn = Arc<dyn Fn(InvocationContext, Value) -> HandlerFuture + Send + Sync>;

/// Wrap a plain async closure into the registry's handler type.
pub fn handler<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(InvocationContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerFailure>> + Send + 'static,
{
    Arc::new(move |context, params| Box::pin(f(context, params)))
}

/// A failed handler. `Known` carries the fields the author set; `Unknown`
/// carries whatever value was surfaced without structure. Normalization into
/// the wire shape happens on the runtime side.
#[derive(Debug, Clone)]
pub enum HandlerFailure {
    Known {
        message: String,
        error_type: String,
        stack: Vec<String>,
    },
    Unknown {
        raw: Value,
    },
}

impl HandlerFailure {
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Known {
            message: message.into(),
            error_type: String::new(),
            stack: Vec::new(),
        }
    }

    #[must_use]
    pub fn typed(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self::Known {
            message: message.into(),
            error_type: error_type.into(),
            stack: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_stack(self, stack: Vec<String>) -> Self {
        match self {
            Self::Known {
                message,
                error_type,
                ..
            } => Self::Known {
                message,
                error_type,
                stack,
            },
            unknown @ Self::Unknown { .. } => unknown,
        }
    }
}

impl From<String> for HandlerFailure {
    fn from(message: String) -> Self {
        Self::msg(message)
    }
}

impl From<&str> for HandlerFailure {
    fn from(message: &str) -> Self {
        Self::msg(message)
    }
}

impl From<serde_json::Error> for HandlerFailure {
    fn from(error: serde_json::Error) -> Self {
        Self::typed(error.to_string(), "SerializationError")
    }
}

/// A registered function: handler plus config, keyed by name.
#[derive(Clone)]
pub struct FunctionManifest {
    pub name: String,
    pub handler: HandlerFn,
    pub config: FunctionConfig,
}

/// Why `execute` failed. The runtime loop treats `NotFound` as a system
/// error (control-plane mismatch) and the other two as user errors.
#[derive(Debug)]
pub enum ExecuteError {
    NotFound(String),
    InvalidParameters(String),
    Handler(HandlerFailure),
}

/// Process-wide name → function mapping. Written once per name at startup,
/// read for every invocation.
#[derive(Default)]
pub struct FunctionRegistry {
    inner: Mutex<HashMap<String, FunctionManifest>>,
}

impl FunctionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by name. Returns the registry size after the write
    /// so callers can detect the first registration of a run.
    pub fn register(&self, name: impl Into<String>, handler: HandlerFn, config: FunctionConfig) -> usize {
        let name = name.into();
        let mut map = self.inner.lock().expect("registry lock poisoned");
        map.insert(
            name.clone(),
            FunctionManifest {
                name,
                handler,
                config,
            },
        );
        map.len()
    }

    /// Exact, case-sensitive lookup.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<FunctionManifest> {
        self.inner
            .lock()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("registry lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .lock()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Look up, validate params against the manifest's schema when present,
    /// and run the handler.
    pub async fn execute(
        &self,
        name: &str,
        params: Value,
        context: InvocationContext,
    ) -> Result<Value, ExecuteError> {
        let manifest = self
            .get(name)
            .ok_or_else(|| ExecuteError::NotFound(name.to_owned()))?;

        if let Some(schema) = &manifest.config.parameters_schema {
            validate_params(schema, &params).map_err(ExecuteError::InvalidParameters)?;
        }

        (manifest.handler)(context, params)
            .await
            .map_err(ExecuteError::Handler)
    }
}

fn validate_params(schema: &Value, params: &Value) -> Result<(), String> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|error| format!("parameters schema does not compile: {error}"))?;
    validator
        .validate(params)
        .map_err(|error| format!("parameters failed schema validation: {error}"))
}
