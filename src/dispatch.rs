//! Command dispatcher
//!
//! Authentication is the first gate: a configured token that does not match
//! rejects the request before any handler runs, so no partial side effects
//! can occur. After the gate, an explicit match routes to one handler per
//! command kind. Handler faults never propagate - every error becomes a
//! `success:false` response here, and a single bad command cannot take the
//! accept loop down.

use serde_json::{json, Map, Value};

use crate::bridge::{BridgeError, HostBridge};
use crate::config::ServerConfig;
use crate::error::CommandError;
use crate::protocol::{Command, Request, Response};

/// Authenticate and route one decoded request.
pub fn dispatch(request: &Request, config: &ServerConfig, bridge: &dyn HostBridge) -> Response {
    if !config.token.is_empty() && request.token.as_deref() != Some(config.token.as_str()) {
        return Response::fail(&CommandError::Unauthorized);
    }

    let result = match &request.command {
        Command::Status => handle_status(bridge),
        Command::Script { code } => handle_script(bridge, code),
        Command::Text { name } => handle_text(bridge, name),
        Command::GetObject { name } => handle_get_object(bridge, name.as_deref()),
        Command::RunOperator { operator, kwargs } => {
            handle_run_operator(bridge, operator, kwargs)
        }
    };

    match result {
        Ok(payload) => Response::ok(payload),
        Err(e) => Response::fail(&e),
    }
}

fn handle_status(bridge: &dyn HostBridge) -> Result<Map<String, Value>, CommandError> {
    Ok(payload(json!({
        "status": "online",
        "blender_version": bridge.version(),
        "scene": bridge.active_scene_name(),
    })))
}

fn handle_script(bridge: &dyn HostBridge, code: &str) -> Result<Map<String, Value>, CommandError> {
    let result = bridge.exec_script(code).map_err(from_bridge)?;
    Ok(payload(json!({ "result": result })))
}

fn handle_text(bridge: &dyn HostBridge, name: &str) -> Result<Map<String, Value>, CommandError> {
    let code = bridge.named_script(name).ok_or_else(|| {
        CommandError::NotFound(format!("text block not found: '{}'", name))
    })?;
    handle_script(bridge, &code)
}

fn handle_get_object(
    bridge: &dyn HostBridge,
    name: Option<&str>,
) -> Result<Map<String, Value>, CommandError> {
    let snapshot = bridge
        .object_snapshot(name)
        .ok_or_else(|| CommandError::NotFound("object not found".to_string()))?;
    let object = serde_json::to_value(&snapshot)
        .map_err(|e| CommandError::Handler(e.to_string()))?;
    Ok(payload(json!({ "object": object })))
}

fn handle_run_operator(
    bridge: &dyn HostBridge,
    operator: &str,
    kwargs: &Map<String, Value>,
) -> Result<Map<String, Value>, CommandError> {
    // Operator ids are exactly `namespace.id` with both halves non-empty.
    let parts: Vec<&str> = operator.split('.').collect();
    let (namespace, id) = match parts.as_slice() {
        [ns, id] if !ns.is_empty() && !id.is_empty() => (*ns, *id),
        _ => {
            return Err(CommandError::InvalidOperator(
                "invalid operator id".to_string(),
            ))
        }
    };

    let result = bridge
        .invoke_operator(namespace, id, kwargs)
        .map_err(from_bridge)?;

    let rendered = match result {
        Value::String(s) => s,
        other => other.to_string(),
    };
    Ok(payload(json!({ "result": rendered })))
}

/// Classify a bridge failure into the response taxonomy.
fn from_bridge(e: BridgeError) -> CommandError {
    match e {
        BridgeError::UnknownOperator(_) => CommandError::InvalidOperator(e.to_string()),
        BridgeError::Unsupported(_) | BridgeError::Failed(_) => {
            CommandError::Handler(e.to_string())
        }
    }
}

fn payload(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::InMemoryHost;
    use parking_lot::Mutex;

    /// Bridge that supports scripting and records operator invocations,
    /// so tests can assert on side effects (or their absence).
    struct RecordingHost {
        invocations: Mutex<Vec<String>>,
    }

    impl RecordingHost {
        fn new() -> Self {
            Self {
                invocations: Mutex::new(Vec::new()),
            }
        }
    }

    impl HostBridge for RecordingHost {
        fn version(&self) -> String {
            "0.0.1".to_string()
        }

        fn active_scene_name(&self) -> Option<String> {
            None
        }

        fn exec_script(&self, code: &str) -> Result<Value, BridgeError> {
            Ok(json!({ "echo": code }))
        }

        fn named_script(&self, name: &str) -> Option<String> {
            (name == "setup").then(|| "__result__ = 1".to_string())
        }

        fn object_snapshot(&self, _name: Option<&str>) -> Option<crate::bridge::ObjectSnapshot> {
            None
        }

        fn invoke_operator(
            &self,
            namespace: &str,
            id: &str,
            _kwargs: &Map<String, Value>,
        ) -> Result<Value, BridgeError> {
            self.invocations.lock().push(format!("{}.{}", namespace, id));
            Ok(Value::String("{'FINISHED'}".to_string()))
        }
    }

    fn config_with_token(token: &str) -> ServerConfig {
        ServerConfig {
            token: token.to_string(),
            ..ServerConfig::default()
        }
    }

    fn request(command: Command, token: Option<&str>) -> Request {
        Request {
            token: token.map(String::from),
            command,
        }
    }

    fn run_op(operator: &str) -> Command {
        Command::RunOperator {
            operator: operator.to_string(),
            kwargs: Map::new(),
        }
    }

    #[test]
    fn test_auth_gate_blocks_side_effects() {
        let host = RecordingHost::new();
        let config = config_with_token("secret");

        for token in [None, Some("wrong"), Some("SECRET")] {
            let resp = dispatch(&request(run_op("mesh.subdivide"), token), &config, &host);
            assert!(!resp.success);
            assert_eq!(resp.error.as_deref(), Some("unauthorized"));
        }
        assert!(host.invocations.lock().is_empty());
    }

    #[test]
    fn test_matching_token_passes() {
        let host = RecordingHost::new();
        let config = config_with_token("secret");
        let resp = dispatch(
            &request(run_op("mesh.subdivide"), Some("secret")),
            &config,
            &host,
        );
        assert!(resp.success);
        assert_eq!(host.invocations.lock().as_slice(), ["mesh.subdivide"]);
    }

    #[test]
    fn test_empty_config_token_disables_auth() {
        let host = RecordingHost::new();
        let config = ServerConfig::default();
        // A supplied token is ignored when auth is disabled.
        let resp = dispatch(&request(Command::Status, Some("anything")), &config, &host);
        assert!(resp.success);
    }

    #[test]
    fn test_status_payload() {
        let host = InMemoryHost::demo();
        let resp = dispatch(
            &request(Command::Status, None),
            &ServerConfig::default(),
            &host,
        );
        assert!(resp.success);
        assert_eq!(resp.payload["status"], json!("online"));
        assert_eq!(resp.payload["blender_version"], json!("4.2.1"));
        assert_eq!(resp.payload["scene"], json!("Scene"));
    }

    #[test]
    fn test_status_scene_null_when_absent() {
        let host = RecordingHost::new();
        let resp = dispatch(
            &request(Command::Status, None),
            &ServerConfig::default(),
            &host,
        );
        assert_eq!(resp.payload["scene"], Value::Null);
    }

    #[test]
    fn test_get_object_by_name() {
        let host = InMemoryHost::demo();
        let resp = dispatch(
            &request(
                Command::GetObject {
                    name: Some("Camera".to_string()),
                },
                None,
            ),
            &ServerConfig::default(),
            &host,
        );
        assert!(resp.success);
        assert_eq!(resp.payload["object"]["name"], json!("Camera"));
        assert_eq!(resp.payload["object"]["type"], json!("CAMERA"));
    }

    #[test]
    fn test_get_object_defaults_to_active() {
        let host = InMemoryHost::demo();
        let resp = dispatch(
            &request(Command::GetObject { name: None }, None),
            &ServerConfig::default(),
            &host,
        );
        assert_eq!(resp.payload["object"]["name"], json!("Cube"));
    }

    #[test]
    fn test_get_object_missing() {
        let host = InMemoryHost::demo();
        let resp = dispatch(
            &request(
                Command::GetObject {
                    name: Some("DoesNotExist".to_string()),
                },
                None,
            ),
            &ServerConfig::default(),
            &host,
        );
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("object not found"));
    }

    #[test]
    fn test_run_operator_string_result() {
        let host = InMemoryHost::demo();
        let resp = dispatch(
            &request(run_op("object.select_all"), None),
            &ServerConfig::default(),
            &host,
        );
        assert!(resp.success);
        assert_eq!(resp.payload["result"], json!("{'FINISHED'}"));
    }

    #[test]
    fn test_run_operator_malformed_id() {
        let host = InMemoryHost::demo();
        for bad in ["badformat", ".leading", "trailing.", "a.b.c", "."] {
            let resp = dispatch(&request(run_op(bad), None), &ServerConfig::default(), &host);
            assert!(!resp.success, "accepted bad operator id {:?}", bad);
            assert_eq!(resp.error.as_deref(), Some("invalid operator id"));
        }
    }

    #[test]
    fn test_run_operator_unknown() {
        let host = InMemoryHost::demo();
        let resp = dispatch(
            &request(run_op("mesh.bogus_op"), None),
            &ServerConfig::default(),
            &host,
        );
        assert!(!resp.success);
        assert!(resp.error.as_deref().unwrap().contains("mesh.bogus_op"));
    }

    #[test]
    fn test_script_unsupported_host() {
        let host = InMemoryHost::demo();
        let resp = dispatch(
            &request(
                Command::Script {
                    code: "__result__ = 1".to_string(),
                },
                None,
            ),
            &ServerConfig::default(),
            &host,
        );
        assert!(!resp.success);
        assert!(resp.error.as_deref().unwrap().contains("not supported"));
    }

    #[test]
    fn test_script_result_payload() {
        let host = RecordingHost::new();
        let resp = dispatch(
            &request(
                Command::Script {
                    code: "__result__ = 1".to_string(),
                },
                None,
            ),
            &ServerConfig::default(),
            &host,
        );
        assert!(resp.success);
        assert_eq!(resp.payload["result"]["echo"], json!("__result__ = 1"));
    }

    #[test]
    fn test_text_runs_named_script() {
        let host = RecordingHost::new();
        let resp = dispatch(
            &request(
                Command::Text {
                    name: "setup".to_string(),
                },
                None,
            ),
            &ServerConfig::default(),
            &host,
        );
        assert!(resp.success);
        assert_eq!(resp.payload["result"]["echo"], json!("__result__ = 1"));
    }

    #[test]
    fn test_text_missing() {
        let host = RecordingHost::new();
        let resp = dispatch(
            &request(
                Command::Text {
                    name: "nope".to_string(),
                },
                None,
            ),
            &ServerConfig::default(),
            &host,
        );
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("text block not found: 'nope'"));
    }
}
