//! Worker side of the bridge protocol.
//!
//! A [`Worker`] accepts connections, reads call frames, runs the registered
//! handler for each call on its own task, and writes the reply back through
//! the connection's writer task. Replies go out in completion order, each
//! tagged with its call's id.
//!
//! # Example
//!
//! ```ignore
//! use sidecar_bridge::worker::Worker;
//! use sidecar_bridge::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Worker::builder()
//!         .handle("ping", |_: Value| async { Ok(Value::map([("ok", 1)])) })
//!         .build()
//!         .bind("/tmp/sidecar.sock")
//!         .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

mod registry;

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::codec::{decode_call, encode_reply, RemoteError, Reply};
use crate::error::Result;
use crate::protocol::{Frame, FrameBuffer, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::transport::SocketListener;
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle};

pub use registry::{
    BoxFuture, Handler, HandlerRegistry, HandlerResult, TypedHandler, INVALID_PAYLOAD,
    UNKNOWN_OPERATION,
};

/// Default maximum concurrently running handlers, across all connections.
pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 256;

/// Category of the error reply sent when a handler task panics.
pub const HANDLER_FAILED: &str = "handler_failed";

/// Category of the error reply sent when a result is too large for a frame.
pub const REPLY_TOO_LARGE: &str = "reply_too_large";

/// Builder for configuring a [`Worker`].
pub struct WorkerBuilder {
    registry: HandlerRegistry,
    writer_config: WriterConfig,
    max_concurrent_calls: usize,
    max_payload_size: u32,
}

impl WorkerBuilder {
    pub fn new() -> Self {
        Self {
            registry: HandlerRegistry::new(),
            writer_config: WriterConfig::default(),
            max_concurrent_calls: DEFAULT_MAX_CONCURRENT_CALLS,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    /// Register a handler for `operation`.
    ///
    /// The call arguments are decoded into `T`; a mismatch is answered with
    /// an `invalid_payload` error reply.
    pub fn handle<F, T, Fut>(mut self, operation: &str, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.register(operation, handler);
        self
    }

    /// Set the maximum number of handlers running at once.
    ///
    /// When the limit is reached, reading further calls waits for a slot.
    /// Default: 256
    pub fn max_concurrent_calls(mut self, limit: usize) -> Self {
        self.max_concurrent_calls = limit.max(1);
        self
    }

    /// Set the largest payload accepted or produced.
    ///
    /// Default: 64 MB
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Set the reply writer settings.
    pub fn writer_config(mut self, config: WriterConfig) -> Self {
        self.writer_config = config;
        self
    }

    pub fn build(self) -> Worker {
        Worker {
            shared: Arc::new(Shared {
                registry: self.registry,
                semaphore: Arc::new(Semaphore::new(self.max_concurrent_calls)),
                writer_config: self.writer_config,
                max_payload_size: self.max_payload_size,
            }),
        }
    }
}

impl Default for WorkerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Shared {
    registry: HandlerRegistry,
    semaphore: Arc<Semaphore>,
    writer_config: WriterConfig,
    max_payload_size: u32,
}

/// A configured worker. Cheap to clone; clones share handlers and the
/// concurrency limit.
#[derive(Clone)]
pub struct Worker {
    shared: Arc<Shared>,
}

impl Worker {
    pub fn builder() -> WorkerBuilder {
        WorkerBuilder::new()
    }

    /// Listen on a Unix socket. A stale socket file at `path` is replaced.
    pub async fn bind(self, path: &str) -> Result<WorkerServer> {
        let listener = SocketListener::bind(path).await?;
        tracing::debug!("Worker listening on {}", path);
        Ok(WorkerServer {
            worker: self,
            listener,
        })
    }

    /// Serve one connection until the peer closes it.
    ///
    /// Handlers still running when the peer leaves finish in the background;
    /// their replies are dropped.
    pub async fn serve_stream<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, write_half) = tokio::io::split(stream);
        let (writer, _writer_task) = spawn_writer_task(write_half, self.shared.writer_config.clone());

        let result = self.read_loop(reader, &writer).await;
        if let Err(e) = &result {
            tracing::error!("Worker connection error: {}", e);
        }
        result
    }

    async fn read_loop<R>(&self, mut reader: R, writer: &WriterHandle) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut frame_buffer = FrameBuffer::with_max_payload(self.shared.max_payload_size);
        let mut buf = vec![0u8; 64 * 1024];

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                tracing::debug!("Client closed the connection");
                return Ok(());
            }

            for frame in frame_buffer.push(&buf[..n])? {
                self.dispatch_frame(frame, writer).await;
            }
        }
    }

    /// Run one call frame on its own task.
    async fn dispatch_frame(&self, frame: Frame, writer: &WriterHandle) {
        if let Err(e) = frame.header.validate(self.shared.max_payload_size) {
            tracing::warn!("Dropping invalid frame: {}", e);
            return;
        }

        if frame.is_reply() {
            tracing::warn!("Received unexpected reply frame for call {}", frame.call_id());
            return;
        }

        let call = match decode_call(&frame) {
            Ok(call) => call,
            Err(e) => {
                tracing::warn!("Undecodable call {}: {}", frame.call_id(), e);
                let reply = Reply::failure(frame.call_id(), RemoteError::new(INVALID_PAYLOAD, 0, e.to_string()));
                send_reply(reply, writer, self.shared.max_payload_size).await;
                return;
            }
        };

        // Waits while max_concurrent_calls handlers are running.
        let permit = match self.shared.semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => return,
        };

        let shared = self.shared.clone();
        let writer = writer.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let id = call.id;
            let operation = call.operation;

            // Run the handler on its own task so a panic still gets a reply.
            let future = shared.registry.dispatch(&operation, call.payload);
            let outcome = match tokio::spawn(future).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Handler for {} (call {}) failed: {}", operation, id, e);
                    Err(RemoteError::new(HANDLER_FAILED, 0, format!("handler for {operation} failed")))
                }
            };

            let reply = match outcome {
                Ok(value) => Reply::success(id, value),
                Err(err) => Reply::failure(id, err),
            };
            send_reply(reply, &writer, shared.max_payload_size).await;
        });
    }
}

async fn send_reply(reply: Reply, writer: &WriterHandle, max_payload_size: u32) {
    let id = reply.id;
    let frame = match encode_reply(&reply, max_payload_size) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("Cannot encode reply for call {}: {}", id, e);
            let fallback = Reply::failure(id, RemoteError::new(REPLY_TOO_LARGE, 0, e.to_string()));
            match encode_reply(&fallback, max_payload_size) {
                Ok(frame) => frame,
                Err(_) => return,
            }
        }
    };

    if let Err(e) = writer.send(frame).await {
        tracing::debug!("Dropping reply for call {}: {}", id, e);
    }
}

/// A worker bound to a Unix socket.
pub struct WorkerServer {
    worker: Worker,
    listener: SocketListener,
}

impl WorkerServer {
    pub fn path(&self) -> &str {
        self.listener.path()
    }

    /// Accept connections forever, serving each on its own task.
    pub async fn run(self) -> Result<()> {
        loop {
            let stream = self.listener.accept().await?;
            tracing::debug!("Accepted connection on {}", self.listener.path());

            let worker = self.worker.clone();
            tokio::spawn(async move {
                let _ = worker.serve_stream(stream).await;
            });
        }
    }

    /// Run the accept loop in the background.
    pub fn spawn(self) -> RunningWorker {
        let path = self.path().to_string();
        RunningWorker {
            path,
            task: tokio::spawn(self.run()),
        }
    }
}

/// Handle to a worker accepting connections in the background.
///
/// Dropping it stops accepting new connections; connections already being
/// served keep running until their peers close them.
pub struct RunningWorker {
    path: String,
    task: JoinHandle<Result<()>>,
}

impl RunningWorker {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for RunningWorker {
    fn drop(&mut self) {
        self.task.abort();
    }
}
