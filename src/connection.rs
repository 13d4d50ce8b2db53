//! Transport connection to a worker.
//!
//! A [`Connection`] owns one socket (or any duplex stream), split into:
//!
//! - a writer task ([`crate::writer`]) that serializes outgoing frames,
//! - a read loop that reassembles reply frames and resolves slots in the
//!   connection's own [`CorrelationTable`],
//! - a monotonically increasing call id counter.
//!
//! When the socket hits EOF or an I/O error, or the writer fails, the
//! connection closes and every pending call fails with
//! [`BridgeError::ConnectionClosed`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::task::JoinHandle;

use crate::codec::{decode_reply, encode_call, Call};
use crate::correlation::{CorrelationTable, Resolution};
use crate::error::{BridgeError, Result};
use crate::protocol::{Frame, FrameBuffer, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::transport;
use crate::value::Value;
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Tunables for a single connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Largest payload accepted in either direction.
    pub max_payload_size: u32,
    /// Writer task settings.
    pub writer: WriterConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            writer: WriterConfig::default(),
        }
    }
}

/// One persistent, multiplexed connection to a worker.
pub struct Connection {
    table: Arc<CorrelationTable>,
    writer: WriterHandle,
    next_id: AtomicU64,
    max_payload_size: u32,
    read_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl Connection {
    /// Connect to a worker listening on a Unix socket.
    pub async fn connect(path: &str, config: ConnectionConfig) -> Result<Self> {
        let stream = transport::connect(path).await?;
        tracing::debug!("Connected to worker at {}", path);
        Ok(Self::from_stream(stream, config))
    }

    /// Run the bridge over an already connected stream.
    ///
    /// Must be called inside a tokio runtime.
    pub fn from_stream<S>(stream: S, config: ConnectionConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, write_half) = tokio::io::split(stream);
        let table = Arc::new(CorrelationTable::new());

        let (writer, write_result) = spawn_writer_task(write_half, config.writer);

        let writer_table = table.clone();
        let writer_task = tokio::spawn(async move {
            let reason = match write_result.await {
                Ok(Ok(())) => return,
                Ok(Err(e)) => format!("write failed: {e}"),
                Err(e) => format!("writer task aborted: {e}"),
            };
            let failed = writer_table.close(&reason);
            tracing::debug!("Connection closed ({}), failed {} pending calls", reason, failed);
        });

        let read_table = table.clone();
        let max_payload_size = config.max_payload_size;
        let read_task = tokio::spawn(async move {
            let reason = match read_loop(reader, &read_table, max_payload_size).await {
                Ok(()) => "worker closed the connection".to_string(),
                Err(e) => {
                    tracing::error!("Read loop error: {}", e);
                    e.to_string()
                }
            };
            let failed = read_table.close(&reason);
            tracing::debug!("Connection closed ({}), failed {} pending calls", reason, failed);
        });

        Self {
            table,
            writer,
            next_id: AtomicU64::new(1),
            max_payload_size,
            read_task,
            writer_task,
        }
    }

    /// Issue a call and wait for its reply.
    ///
    /// With `timeout`, the call fails with [`BridgeError::Timeout`] if no
    /// reply arrives in time. The limit covers queueing the frame as well as
    /// waiting, so writer backpressure cannot outlast it. The slot is
    /// cancelled and a late reply is dropped. Dropping the returned future
    /// cancels the call the same way.
    pub async fn call(&self, operation: &str, payload: Value, timeout: Option<Duration>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = encode_call(&Call::new(id, operation, payload), self.max_payload_size)?;

        let exchange = self.exchange(id, frame);
        match timeout {
            None => exchange.await,
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::debug!("Call {} ({}) timed out after {:?}", id, operation, limit);
                    Err(BridgeError::Timeout {
                        id,
                        elapsed_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    })
                }
            },
        }
    }

    async fn exchange(&self, id: u64, frame: Frame) -> Result<Value> {
        // Register before sending so a fast reply always finds its slot.
        let slot = self.table.register(id)?;
        if let Err(e) = self.writer.send(frame).await {
            slot.forget();
            return Err(e);
        }
        slot.wait().await
    }

    /// Close the connection. Pending calls fail with a connection error.
    pub fn close(&self) {
        let failed = self.table.close("connection closed by client");
        self.read_task.abort();
        self.writer_task.abort();
        tracing::debug!("Connection closed by client, failed {} pending calls", failed);
    }

    pub fn is_closed(&self) -> bool {
        self.table.is_closed() || self.writer.is_closed()
    }

    /// Calls currently awaiting a reply.
    pub fn pending_calls(&self) -> usize {
        self.table.pending_count()
    }

    /// Frames queued for the writer but not yet on the wire.
    pub fn queued_frames(&self) -> usize {
        self.writer.pending_count()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.table.close("connection dropped");
        self.read_task.abort();
    }
}

/// Read replies until EOF or an unrecoverable error.
///
/// Bad frames that still have a sane header are contained: they are logged
/// and, where an owner exists, failed to that one caller only.
async fn read_loop<R>(mut reader: R, table: &CorrelationTable, max_payload_size: u32) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut frame_buffer = FrameBuffer::with_max_payload(max_payload_size);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            if !frame_buffer.is_empty() {
                tracing::warn!("Worker closed mid-frame with {} bytes buffered", frame_buffer.len());
            }
            return Ok(());
        }

        for frame in frame_buffer.push(&buf[..n])? {
            dispatch_frame(&frame, table);
        }
    }
}

fn dispatch_frame(frame: &Frame, table: &CorrelationTable) {
    let id = frame.call_id();

    if let Err(e) = frame.header.validate(u32::MAX) {
        tracing::warn!("Dropping invalid frame for call {}: {}", id, e);
        return;
    }

    let delivered = match decode_reply(frame) {
        Ok(reply) => table.resolve(reply),
        Err(e) if frame.is_reply() => {
            tracing::warn!("Undecodable reply for call {}: {}", id, e);
            table.fail(id, e)
        }
        Err(e) => {
            tracing::warn!("Dropping unexpected frame: {}", e);
            return;
        }
    };

    match delivered {
        Ok(Resolution::Delivered) => {}
        Ok(Resolution::Discarded) => {
            tracing::debug!("Discarded late reply for cancelled call {}", id);
        }
        Err(e) => tracing::warn!("{}", e),
    }
}
