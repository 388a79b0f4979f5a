use std::{
    sync::Mutex,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::domain::models::{InvocationContext, RuntimeErrorBody, RuntimeEventPayload};

/// What the parked runtime-next request is completed with.
#[derive(Debug)]
pub enum NextReply {
    Invocation {
        request_id: String,
        deadline_ms: u64,
        function_arn: String,
        payload: RuntimeEventPayload,
    },
    /// A newer runtime connection took the slot.
    Preempted,
}

/// What the held external caller is completed with.
#[derive(Debug)]
pub enum InvokeReply {
    Success(Value),
    Failure(RuntimeErrorBody),
}

#[derive(Debug)]
pub enum TriggerOutcome {
    Triggered {
        request_id: String,
        completion: oneshot::Receiver<InvokeReply>,
    },
    /// An invocation is already in flight.
    Busy,
    /// No runtime-next connection is held.
    NoRuntime,
}

#[derive(Debug, Clone, Copy)]
pub struct RuntimeStatus {
    pub ever_connected: bool,
    pub next_held: bool,
    pub in_flight: bool,
}

#[derive(Default)]
struct BridgeState {
    next_conn: Option<oneshot::Sender<NextReply>>,
    invoke_conn: Option<oneshot::Sender<InvokeReply>>,
    current_request_id: Option<String>,
    current_function_name: Option<String>,
    runtime_ever_connected: bool,
}

impl BridgeState {
    fn clear_invocation(&mut self) -> Option<oneshot::Sender<InvokeReply>> {
        self.current_request_id = None;
        self.current_function_name = None;
        self.invoke_conn.take()
    }
}

/// Rendezvous between external invoke callers and the handler process. Holds
/// at most one runtime-next connection and at most one in-flight caller;
/// every transition is serialized under one lock, and a held connection is
/// written at most once before it is cleared.
pub struct InvocationBridge {
    state: Mutex<BridgeState>,
    invoke_timeout: Duration,
}

impl InvocationBridge {
    #[must_use]
    pub fn new(invoke_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(BridgeState::default()),
            invoke_timeout,
        }
    }

    /// Park a runtime-next request. A connection already holding the slot is
    /// completed with the preemption reply and displaced. Returns the
    /// receiver the HTTP handler awaits, and whether this was the first
    /// runtime connection of the process (manifest reload trigger).
    pub fn hold_next(&self) -> (oneshot::Receiver<NextReply>, bool) {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock().expect("bridge lock poisoned");
        let first_connect = !state.runtime_ever_connected;
        state.runtime_ever_connected = true;
        if let Some(previous) = state.next_conn.replace(tx) {
            let _ = previous.send(NextReply::Preempted);
        }
        (rx, first_connect)
    }

    /// Match an external caller to the held runtime-next connection. On
    /// success the next connection is consumed into the invocation payload
    /// and the caller's completion receiver is returned. Fails without
    /// mutating invocation state when busy or when no runtime is parked; a
    /// parked connection whose client already went away is discarded
    /// silently and reported as no runtime.
    pub fn trigger(
        &self,
        function_name: &str,
        params: Value,
        context: InvocationContext,
    ) -> TriggerOutcome {
        let mut state = self.state.lock().expect("bridge lock poisoned");
        if state.invoke_conn.is_some() {
            return TriggerOutcome::Busy;
        }
        let Some(next_conn) = state.next_conn.take() else {
            return TriggerOutcome::NoRuntime;
        };

        let request_id = Uuid::new_v4().to_string();
        let reply = NextReply::Invocation {
            request_id: request_id.clone(),
            deadline_ms: now_unix_ms() + self.invoke_timeout.as_millis() as u64,
            function_arn: format!("arn:aws:lambda:local:000000000000:function:{function_name}"),
            payload: RuntimeEventPayload {
                function_name: function_name.to_owned(),
                params,
                context,
            },
        };
        if next_conn.send(reply).is_err() {
            return TriggerOutcome::NoRuntime;
        }

        let (tx, rx) = oneshot::channel();
        state.invoke_conn = Some(tx);
        state.current_request_id = Some(request_id.clone());
        state.current_function_name = Some(function_name.to_owned());
        TriggerOutcome::Triggered {
            request_id,
            completion: rx,
        }
    }

    /// Complete the active invocation with the handler's result. Rejects on
    /// id mismatch or when nothing is in flight; the held caller is
    /// untouched in that case.
    pub fn complete_with_success(&self, request_id: &str, result: Value) -> bool {
        self.complete(request_id, InvokeReply::Success(result))
    }

    /// Complete the active invocation with a runtime error.
    pub fn complete_with_error(&self, request_id: &str, error: RuntimeErrorBody) -> bool {
        self.complete(request_id, InvokeReply::Failure(error))
    }

    fn complete(&self, request_id: &str, reply: InvokeReply) -> bool {
        let mut state = self.state.lock().expect("bridge lock poisoned");
        if state.current_request_id.as_deref() != Some(request_id) {
            return false;
        }
        let Some(invoke_conn) = state.clear_invocation() else {
            return false;
        };
        // A caller that disconnected mid-wait still counts as completed; the
        // send failure is the disconnect signal.
        let _ = invoke_conn.send(reply);
        true
    }

    /// Drop the active invocation without writing to the held caller. Used
    /// when the caller is already gone (client abort, deadline expiry) so
    /// the bridge does not strand state.
    pub fn abort_invocation(&self, request_id: &str) -> bool {
        let mut state = self.state.lock().expect("bridge lock poisoned");
        if state.current_request_id.as_deref() != Some(request_id) {
            return false;
        }
        state.clear_invocation();
        true
    }

    #[must_use]
    pub fn runtime_status(&self) -> RuntimeStatus {
        let state = self.state.lock().expect("bridge lock poisoned");
        RuntimeStatus {
            ever_connected: state.runtime_ever_connected,
            next_held: state.next_conn.is_some(),
            in_flight: state.invoke_conn.is_some(),
        }
    }

    #[must_use]
    pub fn invoke_timeout(&self) -> Duration {
        self.invoke_timeout
    }
}

pub(crate) fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
