use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

/// A remote browser session handed to the handler through the invocation
/// context. Provider-specific fields beyond `id` and `connectUrl` ride in
/// `extra` and survive round-trips.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub connect_url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Session {
    #[must_use]
    pub fn new(id: impl Into<String>, connect_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            connect_url: connect_url.into(),
            extra: Map::new(),
        }
    }
}

/// Invocation context delivered to the handler. `session` is always set by
/// the server; everything a caller supplied alongside it passes through
/// untouched in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationContext {
    pub session: Session,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InvocationContext {
    /// Context for a caller that supplied none: a fresh invocation id with
    /// the local region tag, plus the session.
    #[must_use]
    pub fn synthesized(session: Session) -> Self {
        let mut extra = Map::new();
        extra.insert(
            "invocation".to_owned(),
            json!({
                "id": Uuid::new_v4().to_string(),
                "region": "local",
            }),
        );
        Self { session, extra }
    }

    /// Context built from a caller-supplied object. The caller's fields pass
    /// through verbatim; any `session` the caller sent is overwritten.
    #[must_use]
    pub fn from_caller(mut fields: Map<String, Value>, session: Session) -> Self {
        fields.remove("session");
        Self {
            session,
            extra: fields,
        }
    }
}

/// Body of the completed runtime-next response: one invocation of one named
/// function.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeEventPayload {
    pub function_name: String,
    pub params: Value,
    pub context: InvocationContext,
}

/// Error shape the runtime posts back on handler failure, and the shape the
/// external caller receives nested under `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeErrorBody {
    pub error_message: String,
    pub error_type: String,
    pub stack_trace: Vec<String>,
}

impl RuntimeErrorBody {
    #[must_use]
    pub fn new(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            error_type: error_type.into(),
            stack_trace: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_stack(mut self, stack: Vec<String>) -> Self {
        self.stack_trace = stack;
        self
    }
}

/// Per-function configuration carried by registrations and persisted into
/// manifests. `parameters_schema` is a JSON Schema document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_config: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters_schema: Option<Value>,
}

impl FunctionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_session_config(mut self, session_config: Value) -> Self {
        self.session_config = Some(session_config);
        self
    }

    #[must_use]
    pub fn with_parameters_schema(mut self, schema: Value) -> Self {
        self.parameters_schema = Some(schema);
        self
    }

    /// Derive the parameters schema from a Rust type via schemars.
    #[must_use]
    pub fn with_parameters_schema_of<T: schemars::JsonSchema>(self) -> Self {
        let schema = schemars::schema_for!(T);
        let value = serde_json::to_value(schema).unwrap_or(Value::Null);
        self.with_parameters_schema(value)
    }
}

/// The on-disk form of a registered function: name and config, no handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedManifest {
    pub name: String,
    pub config: FunctionConfig,
}
