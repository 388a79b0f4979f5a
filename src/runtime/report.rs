use serde_json::Value;

use crate::{domain::models::RuntimeErrorBody, registry::HandlerFailure};

const FALLBACK_MESSAGE: &str = "An unknown error occurred";
const FALLBACK_TYPE: &str = "UnknownError";

impl RuntimeErrorBody {
    /// Normalize a handler failure into the wire shape. All three fields are
    /// always present; unknown shapes fall back to the documented defaults.
    /// A stack delivered as one string is split on `'\n'`, which is lossy
    /// when the original stack had no newlines; the array form is the
    /// contract. When no stack was provided but the message spans several
    /// lines, the message lines double as the stack.
    #[must_use]
    pub fn from_failure(failure: HandlerFailure) -> Self {
        match failure {
            HandlerFailure::Known {
                message,
                error_type,
                stack,
            } => {
                let message = non_empty(message, FALLBACK_MESSAGE);
                let stack = if stack.is_empty() {
                    stack_from_message(&message)
                } else {
                    stack
                };
                Self {
                    error_message: message,
                    error_type: non_empty(error_type, FALLBACK_TYPE),
                    stack_trace: stack,
                }
            }
            HandlerFailure::Unknown { raw } => {
                let message = unknown_message(&raw);
                let stack = unknown_stack(&raw);
                let stack = if stack.is_empty() {
                    stack_from_message(&message)
                } else {
                    stack
                };
                Self {
                    error_message: message,
                    error_type: unknown_type(&raw),
                    stack_trace: stack,
                }
            }
        }
    }
}

fn stack_from_message(message: &str) -> Vec<String> {
    if message.contains('\n') {
        message.split('\n').map(str::to_owned).collect()
    } else {
        Vec::new()
    }
}

fn non_empty(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_owned()
    } else {
        value
    }
}

fn unknown_message(raw: &Value) -> String {
    if let Some(message) = raw.get("message").and_then(Value::as_str) {
        if !message.is_empty() {
            return message.to_owned();
        }
    }
    match raw {
        Value::String(text) if !text.is_empty() => text.clone(),
        Value::Null => FALLBACK_MESSAGE.to_owned(),
        other => {
            let rendered = other.to_string();
            if rendered.is_empty() || rendered == "{}" {
                FALLBACK_MESSAGE.to_owned()
            } else {
                rendered
            }
        }
    }
}

fn unknown_type(raw: &Value) -> String {
    raw.get("name")
        .or_else(|| raw.get("type"))
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| FALLBACK_TYPE.to_owned())
}

fn unknown_stack(raw: &Value) -> Vec<String> {
    match raw.get("stack") {
        Some(Value::Array(lines)) => lines
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect(),
        Some(Value::String(stack)) => stack.split('\n').map(str::to_owned).collect(),
        _ => Vec::new(),
    }
}
