//! Wire envelope
//!
//! An [`Envelope`] is the unit of cross-process communication: a scope name,
//! an event name and the argument vector, encoded as a single JSON object:
//!
//! ```text
//! {"scope":"default","messageName":"job.done","args":["job-42",3]}
//! ```
//!
//! Envelopes may carry an `origin` node id. Relaying hubs forward frames
//! verbatim, so a node uses the origin to recognise its own messages when
//! they come back around. Decoders that do not know the field ignore it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CodecError;
use crate::types::EventArgs;

/// A serialized event crossing a process boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Name of the scope the event is published in.
    pub scope: String,
    /// Name of the event.
    #[serde(rename = "messageName")]
    pub message_name: String,
    /// Ordered argument values.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Node id of the process that first sent this envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl Envelope {
    /// Create a new envelope
    pub fn new(scope: impl Into<String>, message_name: impl Into<String>, args: &[Value]) -> Self {
        Self {
            scope: scope.into(),
            message_name: message_name.into(),
            args: args.to_vec(),
            origin: None,
        }
    }

    /// Stamp the sending node id
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Check whether this envelope was sent by `node_id`
    pub fn is_from(&self, node_id: &str) -> bool {
        self.origin.as_deref() == Some(node_id)
    }

    /// Arguments as a shared vector for local dispatch
    pub fn event_args(&self) -> EventArgs {
        self.args.clone().into()
    }

    /// Consume the envelope, returning scope, event name and arguments
    pub fn into_parts(self) -> (String, String, EventArgs) {
        (self.scope, self.message_name, self.args.into())
    }

    /// Encode to a single line of JSON (no trailing newline)
    ///
    /// Compact JSON escapes control characters inside strings, so the
    /// output never contains a raw `\n`.
    pub fn encode(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode one line of JSON
    pub fn decode(line: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(line)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_field_names() {
        let envelope = Envelope::new("default", "job.done", &[json!("job-42"), json!(3)]);
        let line = envelope.encode().unwrap();
        assert_eq!(
            line,
            r#"{"scope":"default","messageName":"job.done","args":["job-42",3]}"#
        );
    }

    #[test]
    fn test_decode_and_compare() {
        let envelope = Envelope::new(
            "ui",
            "status",
            &[json!({ "text": "line one\nline two" }), json!(null), json!([1.5, -2])],
        )
        .with_origin("node-a");
        let line = envelope.encode().unwrap();
        assert!(!line.contains('\n'));

        let decoded = Envelope::decode(&line).unwrap();
        assert_eq!(decoded, envelope);
        assert!(decoded.is_from("node-a"));
        assert!(!decoded.is_from("node-b"));
    }

    #[test]
    fn test_decode_without_origin_or_args() {
        let decoded = Envelope::decode(r#"{"scope":"s","messageName":"m"}"#).unwrap();
        assert_eq!(decoded.origin, None);
        assert!(decoded.args.is_empty());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            Envelope::decode("not json"),
            Err(CodecError::Json(_))
        ));
        assert!(Envelope::decode(r#"{"scope":"s"}"#).is_err());
    }

    #[test]
    fn test_into_parts() {
        let envelope = Envelope::new("s", "m", &[json!(1)]);
        let (scope, name, args) = envelope.into_parts();
        assert_eq!(scope, "s");
        assert_eq!(name, "m");
        assert_eq!(&*args, &[json!(1)]);
    }
}
