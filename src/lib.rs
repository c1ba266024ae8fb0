//! Remote command bridge for embedding host applications.
//!
//! One JSON command per TCP connection: decode, authenticate, dispatch to a
//! handler, write the response, close. The embedding application appears
//! only behind the [`HostBridge`] trait; everything else is host-agnostic.
//!
//! ```no_run
//! use std::sync::Arc;
//! use hostlink::{create, InMemoryHost, ServerConfig};
//!
//! let handle = create(ServerConfig::default(), Arc::new(InMemoryHost::demo()));
//! handle.start();
//! // ... later, from the host's shutdown path:
//! handle.stop();
//! ```

pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod server;

// Re-export commonly used types
pub use bridge::{HostBridge, InMemoryHost, ObjectSnapshot};
pub use config::ServerConfig;
pub use server::{create, ServerHandle};
