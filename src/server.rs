//! Connection acceptor
//!
//! Lifecycle: `Stopped --start()--> Listening --stop()--> Stopping --> Stopped`.
//! One background worker owns the listening socket and runs the accept loop.
//! Exactly one client is served at a time (no worker pool; pending
//! connections wait in the OS backlog), and each connection carries exactly
//! one request/response pair before closing.
//! Request N+1 is not read until response N has been written.
//!
//! `stop()` is best-effort cancellation: it clears the running flag and pokes
//! the listener with a throwaway connection to unblock `accept()`. An
//! in-flight handler is never interrupted; the loop observes the flag on its
//! next iteration.

use std::io::{ErrorKind, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use crate::bridge::HostBridge;
use crate::config::ServerConfig;
use crate::dispatch;
use crate::error::CommandError;
use crate::protocol::{self, Response};

/// Create a server over the given bridge. The server does not listen until
/// [`ServerHandle::start`] is called.
pub fn create(config: ServerConfig, bridge: Arc<dyn HostBridge>) -> ServerHandle {
    ServerHandle {
        inner: Arc::new(Inner {
            config,
            bridge,
            running: AtomicBool::new(false),
            local_addr: Mutex::new(None),
            worker: Mutex::new(None),
        }),
    }
}

/// Owning handle to one command server.
///
/// Cloneable so the embedder can hand control to whatever needs to query or
/// stop the server; all clones share one instance. Avoids singletons - pass
/// the handle explicitly.
#[derive(Clone)]
pub struct ServerHandle {
    inner: Arc<Inner>,
}

struct Inner {
    config: ServerConfig,
    bridge: Arc<dyn HostBridge>,
    running: AtomicBool,
    local_addr: Mutex<Option<SocketAddr>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ServerHandle {
    /// Bind, listen, and launch the serve loop on a background thread.
    ///
    /// Returns false without side effects if the server is already
    /// listening (no double-bind) or if the bind itself fails.
    pub fn start(&self) -> bool {
        // The worker slot doubles as the lifecycle lock: start and stop
        // hold it for their whole transition, so a stop cannot interleave
        // with a half-finished start.
        let mut worker_slot = self.inner.worker.lock();

        if self.inner.running.swap(true, Ordering::SeqCst) {
            eprintln!("hostlink: server already running");
            return false;
        }

        let addr = format!("{}:{}", self.inner.config.host, self.inner.config.port);
        let listener = match TcpListener::bind(&addr) {
            Ok(listener) => listener,
            Err(e) => {
                eprintln!("hostlink: failed to bind {}: {}", addr, e);
                self.inner.running.store(false, Ordering::SeqCst);
                return false;
            }
        };

        if self.inner.config.host != "127.0.0.1" && self.inner.config.host != "localhost" {
            eprintln!(
                "WARNING: Binding to {} exposes the command bridge to the network.",
                self.inner.config.host
            );
            eprintln!("  Script commands execute with full host privileges. Configure a token.");
        }

        *self.inner.local_addr.lock() = listener.local_addr().ok();

        let inner = Arc::clone(&self.inner);
        *worker_slot = Some(std::thread::spawn(move || serve_loop(&inner, &listener)));
        true
    }

    /// Request shutdown and wait for the serve loop to exit. Idempotent:
    /// stopping a stopped server is a no-op.
    pub fn stop(&self) {
        let mut worker_slot = self.inner.worker.lock();

        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }

        // Unblock a worker parked in accept(). The loop re-checks the flag
        // on every wakeup, so the throwaway connection just falls through.
        if let Some(addr) = self.inner.local_addr.lock().take() {
            let _ = TcpStream::connect_timeout(&wake_addr(addr), Duration::from_millis(250));
        }

        // The worker never takes this lock, so joining while holding it
        // cannot deadlock.
        if let Some(worker) = worker_slot.take() {
            let _ = worker.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Address actually bound, while listening. Lets embedders (and tests)
    /// configure port 0 and discover the ephemeral port.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.lock()
    }
}

/// A connectable form of the bound address: an unspecified bind address
/// (0.0.0.0) is reachable via loopback.
fn wake_addr(addr: SocketAddr) -> SocketAddr {
    if addr.ip().is_unspecified() {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
    } else {
        addr
    }
}

fn serve_loop(inner: &Inner, listener: &TcpListener) {
    while inner.running.load(Ordering::SeqCst) {
        let mut stream = match listener.accept() {
            Ok((stream, _addr)) => stream,
            Err(e) => {
                if inner.running.load(Ordering::SeqCst) {
                    eprintln!("hostlink: accept error: {}", e);
                    continue;
                }
                break; // stopping - expected wakeup
            }
        };

        // stop() wakes the loop with a throwaway connection
        if !inner.running.load(Ordering::SeqCst) {
            let _ = stream.shutdown(Shutdown::Both);
            break;
        }

        serve_client(&mut stream, inner);
        let _ = stream.shutdown(Shutdown::Both);
    }
}

/// One request/response cycle. Every failure becomes a response payload;
/// nothing escapes to take the loop down.
fn serve_client(stream: &mut TcpStream, inner: &Inner) {
    if let Some(secs) = inner.config.read_timeout_secs {
        let _ = stream.set_read_timeout(Some(Duration::from_secs(secs)));
    }

    let response = match read_request(stream, inner.config.max_request_bytes) {
        Ok(Some(bytes)) => match protocol::decode(&bytes) {
            Ok(request) => dispatch::dispatch(&request, &inner.config, inner.bridge.as_ref()),
            Err(e) => Response::fail(&e),
        },
        Ok(None) => return, // client sent nothing - close silently
        Err(e) => Response::fail(&e),
    };

    let _ = stream.write_all(&response.encode());
    let _ = stream.flush();
}

/// Read one request, stopping at the earliest of: a complete JSON document,
/// EOF, the configured size cap, or the read timeout.
///
/// Oversized requests are rejected, never truncated. Returns `Ok(None)` if
/// the client closed without sending anything.
fn read_request(stream: &mut impl Read, max_bytes: usize) -> Result<Option<Vec<u8>>, CommandError> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.len() > max_bytes {
                    return Err(CommandError::Malformed(format!(
                        "request exceeds {} bytes",
                        max_bytes
                    )));
                }
                // A complete document means the client is done writing -
                // no half-close required.
                if serde_json::from_slice::<serde::de::IgnoredAny>(&buf).is_ok() {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                break // timeout - decode whatever arrived
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(CommandError::Malformed(format!("read error: {}", e))),
        }
    }

    if buf.is_empty() {
        Ok(None)
    } else {
        Ok(Some(buf))
    }
}
