//! Server configuration
//!
//! Owned by the embedding host's preferences. Loaded once when the server
//! starts; the server never mutates it.

use serde::{Deserialize, Serialize};

/// Configuration for one command server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind. Anything other than loopback exposes arbitrary
    /// code execution to the network - bind wider only behind a token.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind. Port 0 asks the OS for an ephemeral port; see
    /// `ServerHandle::local_addr`.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared-secret token. Empty disables authentication.
    #[serde(default)]
    pub token: String,

    /// Whether the embedder should start the server at application launch.
    /// Advisory to the host; the server itself never reads it.
    #[serde(default)]
    pub autostart: bool,

    /// Requests larger than this are rejected with an error response
    /// (never silently truncated).
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,

    /// Receive timeout in seconds. `None` blocks until the client writes
    /// or closes, which lets a silent client stall the worker - acceptable
    /// for a local tool, set a timeout for anything else.
    #[serde(default)]
    pub read_timeout_secs: Option<u64>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9999
}

fn default_max_request_bytes() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            token: String::new(),
            autostart: false,
            max_request_bytes: default_max_request_bytes(),
            read_timeout_secs: None,
        }
    }
}
