//! Typed events and dispatch diagnostics.
//!
//! String event names work everywhere, but most payloads have a natural
//! Rust type. A [`BusEvent`] pins a type to an explicit, stable event name so
//! two modules can never collide by accident through derived type names.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::CodecError;
use crate::types::{event_args_from, EventArgs};

/// A payload type with a fixed event name
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// struct JobFinished { id: String, exit_code: i32 }
///
/// impl BusEvent for JobFinished {
///     const NAME: &'static str = "jobs.finished";
/// }
/// ```
pub trait BusEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Event name used on the bus and on the wire.
    const NAME: &'static str;

    /// Encode this value as a single-argument vector
    fn to_args(&self) -> Result<EventArgs, CodecError> {
        Ok(event_args_from([serde_json::to_value(self)?]))
    }

    /// Decode a value from the first argument
    ///
    /// A missing argument decodes as JSON `null`, which lets unit-like
    /// payloads travel without arguments.
    fn from_args(args: &[Value]) -> Result<Self, CodecError> {
        let value = args.first().cloned().unwrap_or(Value::Null);
        Ok(serde_json::from_value(value)?)
    }
}

/// Report of a subscriber that panicked during delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerPanic {
    /// Scope the event was published in.
    pub scope: String,
    /// Event name being delivered.
    pub event: String,
    /// Panic payload rendered as text.
    pub message: String,
}

impl HandlerPanic {
    pub(crate) fn from_payload(
        scope: &str,
        event: &str,
        payload: &(dyn std::any::Any + Send),
    ) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };

        Self {
            scope: scope.to_string(),
            event: event.to_string(),
            message,
        }
    }
}

impl std::fmt::Display for HandlerPanic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "handler for '{}' in scope '{}' panicked: {}",
            self.event, self.scope, self.message
        )
    }
}
