use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use hostlink::{create, InMemoryHost, ServerConfig};

#[derive(Parser)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about = "Remote command bridge for host applications", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the built-in demo host (protocol development tool)
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to (0 = ask the OS for an ephemeral port)
        #[arg(long, default_value = "9999")]
        port: u16,

        /// Auth token (default: HOSTLINK_TOKEN env var; generated when
        /// binding beyond loopback)
        #[arg(long)]
        token: Option<String>,

        /// Maximum request size in bytes
        #[arg(long, default_value = "65536")]
        max_request_bytes: usize,

        /// Receive timeout in seconds (unset = block until the client writes)
        #[arg(long)]
        read_timeout_secs: Option<u64>,
    },

    /// Send one JSON command to a running server and print the response
    Call {
        /// Command JSON, e.g. '{"type":"status"}'
        json: String,

        /// Server host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Server port
        #[arg(long, default_value = "9999")]
        port: u16,

        /// Token injected into the command when it carries none
        #[arg(long)]
        token: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            token,
            max_request_bytes,
            read_timeout_secs,
        } => serve(host, port, token, max_request_bytes, read_timeout_secs),
        Commands::Call {
            json,
            host,
            port,
            token,
        } => call(&json, &host, port, token),
    }
}

fn serve(
    host: String,
    port: u16,
    token: Option<String>,
    max_request_bytes: usize,
    read_timeout_secs: Option<u64>,
) -> Result<()> {
    let token = token
        .or_else(|| std::env::var("HOSTLINK_TOKEN").ok())
        .unwrap_or_else(|| {
            if host != "127.0.0.1" && host != "localhost" {
                let token = generate_token();
                eprintln!("Generated auth token: {}", token);
                token
            } else {
                String::new()
            }
        });

    let config = ServerConfig {
        host,
        port,
        token,
        autostart: true,
        max_request_bytes,
        read_timeout_secs,
    };

    let handle = create(config, Arc::new(InMemoryHost::demo()));
    if !handle.start() {
        bail!("failed to start server");
    }
    let addr = handle.local_addr().context("server has no bound address")?;

    println!("hostlink serving demo host on {}", addr);
    println!(
        "   Test: hostlink call '{{\"type\":\"status\"}}' --port {}",
        addr.port()
    );
    println!("   Press Ctrl+C to stop\n");

    wait_for_shutdown();
    handle.stop();
    println!("hostlink stopped");
    Ok(())
}

fn call(json: &str, host: &str, port: u16, token: Option<String>) -> Result<()> {
    let mut value: Value = serde_json::from_str(json).context("command is not valid JSON")?;

    if let (Some(token), Some(obj)) = (token, value.as_object_mut()) {
        obj.entry("token".to_string())
            .or_insert(Value::String(token));
    }

    let addr = format!("{}:{}", host, port);
    let mut stream =
        TcpStream::connect(&addr).with_context(|| format!("connecting to {}", addr))?;
    stream.write_all(value.to_string().as_bytes())?;
    stream.shutdown(Shutdown::Write)?;

    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    println!("{}", response);
    Ok(())
}

/// Generate a random 32-byte hex token
fn generate_token() -> String {
    (0..32).map(|_| format!("{:02x}", fastrand::u8(..))).collect()
}

#[cfg(unix)]
fn wait_for_shutdown() {
    use std::sync::atomic::{AtomicBool, Ordering};

    static SHUTDOWN: AtomicBool = AtomicBool::new(false);

    extern "C" fn signal_handler(_: libc::c_int) {
        SHUTDOWN.store(true, Ordering::SeqCst);
    }

    unsafe {
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
    }

    while !SHUTDOWN.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }
}

#[cfg(not(unix))]
fn wait_for_shutdown() {
    loop {
        std::thread::park();
    }
}
