//! Call dispatcher and connection pool.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring the bridge.
//! The [`Client`] is the single entry point for calls:
//! 1. Pick an open connection (round-robin)
//! 2. Allocate a call id and encode the call
//! 3. Register a pending slot and queue the frame
//! 4. Suspend the calling task until the reply, a timeout, or closure
//!
//! # Example
//!
//! ```ignore
//! use sidecar_bridge::{Client, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .socket_address("/tmp/sidecar.sock")
//!         .connections(2)
//!         .call_timeout(std::time::Duration::from_secs(5))
//!         .connect()
//!         .await?;
//!
//!     let pong = client.call("ping", Value::Nil).await?;
//!     println!("{pong}");
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::BridgeConfig;
use crate::connection::Connection;
use crate::error::{BridgeError, Result};
use crate::value::Value;

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Builder for configuring and connecting a [`Client`].
pub struct ClientBuilder {
    config: BridgeConfig,
}

impl ClientBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::from_config(BridgeConfig::default())
    }

    /// Start from a loaded configuration.
    pub fn from_config(config: BridgeConfig) -> Self {
        Self { config }
    }

    /// Set the worker's socket path.
    ///
    /// Default: `/tmp/sidecar.sock`
    pub fn socket_address(mut self, path: impl Into<String>) -> Self {
        self.config.socket_address = path.into();
        self
    }

    /// Set the number of physical connections.
    ///
    /// Default: 1
    pub fn connections(mut self, count: usize) -> Self {
        self.config.connections = count;
        self
    }

    /// Set the default per-call timeout.
    ///
    /// Default: none
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout_ms = Some(millis(timeout));
        self
    }

    /// Set the largest payload accepted in either direction.
    ///
    /// Default: 64 MB
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Set the maximum pending frames for backpressure.
    ///
    /// Default: 1024
    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.config.max_pending_frames = limit;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Set the backpressure timeout.
    ///
    /// Default: 5 seconds
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.config.backpressure_timeout_ms = millis(timeout);
        self
    }

    /// Validate the settings and open every connection.
    pub async fn connect(self) -> Result<Client> {
        self.config.validate()?;

        let connection_config = self.config.connection_config();
        let mut connections = Vec::with_capacity(self.config.connections);
        for _ in 0..self.config.connections {
            connections
                .push(Connection::connect(&self.config.socket_address, connection_config.clone()).await?);
        }

        tracing::debug!(
            "Opened {} connection(s) to {}",
            connections.len(),
            self.config.socket_address
        );
        Client::from_connections(connections, self.config.call_timeout())
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct ClientInner {
    connections: Vec<Connection>,
    next: AtomicUsize,
    default_timeout: Option<Duration>,
}

/// Handle for issuing calls to a worker. Cheap to clone; clones share the
/// same connections.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Connect using a loaded configuration.
    pub async fn connect(config: BridgeConfig) -> Result<Self> {
        ClientBuilder::from_config(config).connect().await
    }

    /// Wrap already open connections.
    pub fn from_connections(connections: Vec<Connection>, default_timeout: Option<Duration>) -> Result<Self> {
        if connections.is_empty() {
            return Err(BridgeError::Config("a client needs at least one connection".to_string()));
        }
        Ok(Self {
            inner: Arc::new(ClientInner {
                connections,
                next: AtomicUsize::new(0),
                default_timeout,
            }),
        })
    }

    /// Wrap a single connection with no default timeout.
    pub fn from_connection(connection: Connection) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                connections: vec![connection],
                next: AtomicUsize::new(0),
                default_timeout: None,
            }),
        }
    }

    /// Invoke `operation` on the worker and wait for its result.
    ///
    /// Uses the client's default timeout, if any.
    pub async fn call(&self, operation: &str, payload: Value) -> Result<Value> {
        self.dispatch(operation, payload, self.inner.default_timeout).await
    }

    /// Like [`Client::call`] with an explicit timeout.
    pub async fn call_with_timeout(&self, operation: &str, payload: Value, timeout: Duration) -> Result<Value> {
        self.dispatch(operation, payload, Some(timeout)).await
    }

    async fn dispatch(&self, operation: &str, payload: Value, timeout: Option<Duration>) -> Result<Value> {
        self.pick()?.call(operation, payload, timeout).await
    }

    /// Next open connection in round-robin order.
    fn pick(&self) -> Result<&Connection> {
        let connections = &self.inner.connections;
        let start = self.inner.next.fetch_add(1, Ordering::Relaxed);

        (0..connections.len())
            .map(|offset| &connections[(start + offset) % connections.len()])
            .find(|conn| !conn.is_closed())
            .ok_or_else(|| BridgeError::ConnectionClosed("all connections are closed".to_string()))
    }

    /// Close every connection. Pending calls fail with a connection error.
    pub fn close(&self) {
        for conn in &self.inner.connections {
            conn.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.connections.iter().all(Connection::is_closed)
    }

    /// Calls awaiting a reply across all connections.
    pub fn pending_calls(&self) -> usize {
        self.inner.connections.iter().map(Connection::pending_calls).sum()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }
}
