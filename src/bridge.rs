//! Host bridge - the seam between the server and the embedding application
//!
//! The codec, dispatcher, and acceptor are host-agnostic; this trait is the
//! only place host integration appears. An embedder implements [`HostBridge`]
//! over its own object model (scene graph, operator registry, scripting
//! namespace) and hands it to [`crate::server::create`].
//!
//! [`InMemoryHost`] is a self-contained implementation backed by plain maps.
//! The CLI serves it for protocol development, and tests use it as a stand-in
//! host with observable state.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Failures surfaced by a host while performing an effect.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The `namespace.id` pair names no registered operator.
    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    /// The host does not implement this capability (e.g. script execution
    /// compiled out).
    #[error("{0}")]
    Unsupported(String),

    /// The effect ran and failed.
    #[error("{0}")]
    Failed(String),
}

/// Transform-and-visibility snapshot of one host object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectSnapshot {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub location: [f64; 3],
    pub rotation: [f64; 3],
    pub scale: [f64; 3],
    pub visible: bool,
}

/// Operations the dispatcher needs from the embedding application.
///
/// Implementations must be callable from the server's worker thread. Note
/// that handlers run on that thread synchronously - a host whose API is
/// bound to its own main loop is responsible for marshalling inside these
/// methods if it needs to.
pub trait HostBridge: Send + Sync {
    /// Host version string, e.g. `"4.2.1"`.
    fn version(&self) -> String;

    /// Name of the active scene, if any.
    fn active_scene_name(&self) -> Option<String>;

    /// Execute a code fragment in the host's scripting namespace and return
    /// whatever it assigned to the conventional `__result__` binding (an
    /// empty object when unset).
    ///
    /// This runs arbitrary code with the full privileges of the host
    /// process. It is a deliberate capability of the bridge; hosts that
    /// cannot accept it return [`BridgeError::Unsupported`].
    fn exec_script(&self, code: &str) -> Result<Value, BridgeError>;

    /// Source of a named in-host text block, or `None` if unknown.
    fn named_script(&self, name: &str) -> Option<String>;

    /// Snapshot an object by name, or the active selection when `name` is
    /// `None`. Returns `None` if the object (or active selection) is absent.
    fn object_snapshot(&self, name: Option<&str>) -> Option<ObjectSnapshot>;

    /// Invoke a registered operator with keyword arguments.
    fn invoke_operator(
        &self,
        namespace: &str,
        id: &str,
        kwargs: &Map<String, Value>,
    ) -> Result<Value, BridgeError>;
}

type OperatorFn = Box<dyn Fn(&Map<String, Value>) -> Result<Value, BridgeError> + Send + Sync>;

/// Map-backed host for the CLI and for tests.
pub struct InMemoryHost {
    version: String,
    scene: Option<String>,
    objects: Mutex<HashMap<String, ObjectSnapshot>>,
    active_object: Mutex<Option<String>>,
    scripts: Mutex<HashMap<String, String>>,
    operators: Mutex<HashMap<String, OperatorFn>>,
}

impl InMemoryHost {
    pub fn new(version: &str, scene: Option<&str>) -> Self {
        Self {
            version: version.to_string(),
            scene: scene.map(String::from),
            objects: Mutex::new(HashMap::new()),
            active_object: Mutex::new(None),
            scripts: Mutex::new(HashMap::new()),
            operators: Mutex::new(HashMap::new()),
        }
    }

    /// A stocked scene for exercising the protocol end to end: a few
    /// objects, one text block, and two no-op operators.
    pub fn demo() -> Self {
        let host = Self::new("4.2.1", Some("Scene"));

        host.insert_object(ObjectSnapshot {
            name: "Cube".to_string(),
            kind: "MESH".to_string(),
            location: [0.0, 0.0, 0.0],
            rotation: [0.0, 0.0, 0.0],
            scale: [1.0, 1.0, 1.0],
            visible: true,
        });
        host.insert_object(ObjectSnapshot {
            name: "Camera".to_string(),
            kind: "CAMERA".to_string(),
            location: [7.36, -6.93, 4.96],
            rotation: [1.11, 0.0, 0.81],
            scale: [1.0, 1.0, 1.0],
            visible: true,
        });
        host.insert_object(ObjectSnapshot {
            name: "Light".to_string(),
            kind: "LIGHT".to_string(),
            location: [4.08, 1.01, 5.9],
            rotation: [0.65, 0.06, 1.87],
            scale: [1.0, 1.0, 1.0],
            visible: false,
        });
        host.set_active_object(Some("Cube"));

        host.insert_script("setup", "__result__ = {'ready': True}");

        host.register_operator("object.select_all", |_kwargs| {
            Ok(Value::String("{'FINISHED'}".to_string()))
        });
        host.register_operator("scene.frame_set", |kwargs| {
            let frame = kwargs
                .get("frame")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| BridgeError::Failed("frame_set requires 'frame'".to_string()))?;
            Ok(serde_json::json!({ "frame": frame }))
        });

        host
    }

    pub fn insert_object(&self, snapshot: ObjectSnapshot) {
        self.objects.lock().insert(snapshot.name.clone(), snapshot);
    }

    pub fn set_active_object(&self, name: Option<&str>) {
        *self.active_object.lock() = name.map(String::from);
    }

    pub fn insert_script(&self, name: &str, code: &str) {
        self.scripts.lock().insert(name.to_string(), code.to_string());
    }

    pub fn register_operator<F>(&self, id: &str, f: F)
    where
        F: Fn(&Map<String, Value>) -> Result<Value, BridgeError> + Send + Sync + 'static,
    {
        self.operators.lock().insert(id.to_string(), Box::new(f));
    }
}

impl HostBridge for InMemoryHost {
    fn version(&self) -> String {
        self.version.clone()
    }

    fn active_scene_name(&self) -> Option<String> {
        self.scene.clone()
    }

    fn exec_script(&self, _code: &str) -> Result<Value, BridgeError> {
        Err(BridgeError::Unsupported(
            "script execution is not supported by this host".to_string(),
        ))
    }

    fn named_script(&self, name: &str) -> Option<String> {
        self.scripts.lock().get(name).cloned()
    }

    fn object_snapshot(&self, name: Option<&str>) -> Option<ObjectSnapshot> {
        let objects = self.objects.lock();
        match name {
            Some(name) => objects.get(name).cloned(),
            None => {
                let active = self.active_object.lock();
                active.as_deref().and_then(|n| objects.get(n).cloned())
            }
        }
    }

    fn invoke_operator(
        &self,
        namespace: &str,
        id: &str,
        kwargs: &Map<String, Value>,
    ) -> Result<Value, BridgeError> {
        let key = format!("{}.{}", namespace, id);
        let operators = self.operators.lock();
        let op = operators
            .get(&key)
            .ok_or_else(|| BridgeError::UnknownOperator(key.clone()))?;
        op(kwargs)
    }
}
