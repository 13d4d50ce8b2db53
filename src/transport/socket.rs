//! Unix domain socket implementation.
//!
//! # Example
//!
//! ```ignore
//! use sidecar_bridge::transport::{connect, generate_socket_path, SocketListener};
//!
//! let path = generate_socket_path();
//! let listener = SocketListener::bind(&path).await?;
//! let client = connect(&path).await?;
//! let (server, _addr) = listener.accept().await?;
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::{UnixListener, UnixStream};

use crate::error::{BridgeError, Result};

/// Generate a unique socket path for this process.
///
/// Format: `/tmp/sidecar-{pid}-{random}.sock`
pub fn generate_socket_path() -> String {
    format!("/tmp/sidecar-{}-{:x}.sock", std::process::id(), rand_u64())
}

/// Cheap unique-ish u64 from the clock, the pid and a process-wide counter.
fn rand_u64() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = u64::from(std::process::id());

    nanos.wrapping_mul(0x517c_c1b7_2722_0a95) ^ pid ^ seq.rotate_left(32)
}

/// Connect to a worker listening on `path`.
pub async fn connect(path: &str) -> Result<UnixStream> {
    UnixStream::connect(path).await.map_err(|e| {
        BridgeError::ConnectionClosed(format!("cannot connect to worker at {path}: {e}"))
    })
}

/// Unix Domain Socket listener that removes its socket file on drop.
pub struct SocketListener {
    listener: UnixListener,
    path: String,
}

impl SocketListener {
    /// Bind to a Unix socket path.
    ///
    /// Removes any existing socket file at the path before binding.
    pub async fn bind(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            std::fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)?;

        Ok(Self {
            listener,
            path: path.to_string(),
        })
    }

    /// Accept a single connection.
    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self.listener.accept().await?;
        Ok(stream)
    }

    /// Get the socket path.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for SocketListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
