//! Wire protocol types for the command bridge
//!
//! Transport model: one JSON document per TCP connection, request then
//! response, then the connection closes. No framing, no length prefix,
//! no protocol version field - compatibility is managed by field
//! presence/absence.
//!
//! The routing key is `type`; `action` is accepted as a legacy alias.
//! The command set is a closed enum decoded once at this boundary, so the
//! five-variant contract is checked by the compiler instead of by strings
//! scattered through handlers.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::CommandError;

/// A decoded request: optional auth token plus the command itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub token: Option<String>,
    pub command: Command,
}

/// The closed set of commands the bridge understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Read host version and active scene name.
    Status,
    /// Execute a code fragment inside the host's scripting namespace.
    Script { code: String },
    /// Execute a named in-host text block the same way as `Script`.
    Text { name: String },
    /// Snapshot an object's transform and visibility. `None` means the
    /// host's active selection.
    GetObject { name: Option<String> },
    /// Invoke a `namespace.id` operator from the host's registry.
    RunOperator {
        operator: String,
        kwargs: Map<String, Value>,
    },
}

/// Response payload written back to the client.
///
/// Serializes as `{"success": true, ...payload}` on success or
/// `{"success": false, "error": "..."}` on failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Response {
    /// Successful response with the given payload fields.
    pub fn ok(payload: Map<String, Value>) -> Self {
        Self {
            success: true,
            error: None,
            payload,
        }
    }

    /// Failed response carrying the error's display string.
    pub fn fail(error: &CommandError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            payload: Map::new(),
        }
    }

    /// Serialize to UTF-8 JSON bytes. Response fields are always
    /// JSON-serializable primitives, so this does not fail in practice.
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Parse one request from raw bytes.
///
/// Fails with [`CommandError::Malformed`] for anything that is not a JSON
/// object or is missing a required field, and with
/// [`CommandError::UnknownCommand`] for an unrecognized `type`.
pub fn decode(bytes: &[u8]) -> Result<Request, CommandError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| CommandError::Malformed(format!("invalid JSON: {}", e)))?;

    let obj = value
        .as_object()
        .ok_or_else(|| CommandError::Malformed("request must be a JSON object".to_string()))?;

    let kind = obj
        .get("type")
        .or_else(|| obj.get("action"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| CommandError::Malformed("missing 'type' field".to_string()))?;

    let token = obj.get("token").and_then(|v| v.as_str()).map(String::from);

    let command = match kind {
        "status" => Command::Status,
        "script" => Command::Script {
            code: required_str(obj, "code", kind)?,
        },
        "text" => Command::Text {
            name: required_str(obj, "name", kind)?,
        },
        "get_object" => Command::GetObject {
            name: obj.get("name").and_then(|v| v.as_str()).map(String::from),
        },
        "run_operator" => Command::RunOperator {
            operator: required_str(obj, "operator", kind)?,
            kwargs: obj
                .get("kwargs")
                .and_then(|v| v.as_object())
                .cloned()
                .unwrap_or_default(),
        },
        other => return Err(CommandError::UnknownCommand(other.to_string())),
    };

    Ok(Request { token, command })
}

/// Extract a required string field or fail with a malformed-command error.
fn required_str(
    obj: &Map<String, Value>,
    field: &str,
    kind: &str,
) -> Result<String, CommandError> {
    obj.get(field)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| {
            CommandError::Malformed(format!("'{}' command requires a '{}' string", kind, field))
        })
}

impl Request {
    /// Render back to the wire shape `decode` accepts. Used by the one-shot
    /// client and by round-trip tests.
    pub fn to_value(&self) -> Value {
        let mut obj = match &self.command {
            Command::Status => json!({"type": "status"}),
            Command::Script { code } => json!({"type": "script", "code": code}),
            Command::Text { name } => json!({"type": "text", "name": name}),
            Command::GetObject { name } => match name {
                Some(name) => json!({"type": "get_object", "name": name}),
                None => json!({"type": "get_object"}),
            },
            Command::RunOperator { operator, kwargs } => {
                json!({"type": "run_operator", "operator": operator, "kwargs": kwargs})
            }
        };
        if let Some(token) = &self.token {
            obj["token"] = Value::String(token.clone());
        }
        obj
    }
}
