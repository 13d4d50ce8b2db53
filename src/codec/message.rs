//! Call and Reply messages and their frame encoding.
//!
//! A call frame carries `{"op": <name>, "args": <Value>}`. A success reply
//! carries the result value; an error reply carries a [`RemoteError`].
//! The call id lives in the frame header, never in the payload.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::MsgPackCodec;
use crate::error::{BridgeError, Result};
use crate::protocol::{flags, Frame, FrameBuffer, Header};
use crate::value::Value;

/// Error descriptor reported by the worker for a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{category} ({code}): {message}")]
pub struct RemoteError {
    /// Machine-readable error class, e.g. `unknown_operation`.
    pub category: String,
    /// Numeric code; driver-specific, 0 when unused.
    #[serde(default)]
    pub code: i32,
    /// Human-readable message.
    pub message: String,
}

impl RemoteError {
    pub fn new(category: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            code,
            message: message.into(),
        }
    }
}

/// One logical invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub id: u64,
    pub operation: String,
    pub payload: Value,
}

impl Call {
    pub fn new(id: u64, operation: impl Into<String>, payload: Value) -> Self {
        Self {
            id,
            operation: operation.into(),
            payload,
        }
    }
}

/// Outcome carried by a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Value),
    Failure(RemoteError),
}

impl Outcome {
    /// Success payload as `Ok`, remote failure as [`BridgeError::Remote`].
    pub fn into_result(self) -> Result<Value> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(err) => Err(BridgeError::Remote(err)),
        }
    }
}

/// Worker's answer to a [`Call`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub id: u64,
    pub outcome: Outcome,
}

impl Reply {
    pub fn success(id: u64, value: Value) -> Self {
        Self {
            id,
            outcome: Outcome::Success(value),
        }
    }

    pub fn failure(id: u64, error: RemoteError) -> Self {
        Self {
            id,
            outcome: Outcome::Failure(error),
        }
    }
}

#[derive(Serialize)]
struct CallEnvelope<'a> {
    op: &'a str,
    args: &'a Value,
}

#[derive(Deserialize)]
struct OwnedCallEnvelope {
    op: String,
    #[serde(default)]
    args: Value,
}

fn checked_frame(flags: u8, call_id: u64, payload: Vec<u8>, max_payload_size: u32) -> Result<Frame> {
    if payload.len() > max_payload_size as usize {
        return Err(BridgeError::Encode(format!(
            "Payload size {} exceeds maximum {}",
            payload.len(),
            max_payload_size
        )));
    }
    let header = Header::new(flags, call_id, payload.len() as u32);
    Ok(Frame::new(header, Bytes::from(payload)))
}

/// Encode a call into a frame.
///
/// Fails with [`BridgeError::Encode`] if the encoded payload exceeds
/// `max_payload_size`.
pub fn encode_call(call: &Call, max_payload_size: u32) -> Result<Frame> {
    let payload = MsgPackCodec::encode(&CallEnvelope {
        op: &call.operation,
        args: &call.payload,
    })
    .map_err(|e| BridgeError::Encode(e.to_string()))?;
    checked_frame(flags::CALL, call.id, payload, max_payload_size)
}

/// Decode a call frame (worker side).
pub fn decode_call(frame: &Frame) -> Result<Call> {
    if frame.is_reply() {
        return Err(BridgeError::Protocol(format!(
            "Expected call frame, got reply for call {}",
            frame.call_id()
        )));
    }
    let envelope: OwnedCallEnvelope = MsgPackCodec::decode(frame.payload())?;
    Ok(Call::new(frame.call_id(), envelope.op, envelope.args))
}

/// Encode a reply into a frame (worker side).
pub fn encode_reply(reply: &Reply, max_payload_size: u32) -> Result<Frame> {
    let (flags, payload) = match &reply.outcome {
        Outcome::Success(value) => (flags::REPLY, MsgPackCodec::encode(value)?),
        Outcome::Failure(err) => (flags::ERROR_REPLY, MsgPackCodec::encode(err)?),
    };
    checked_frame(flags, reply.id, payload, max_payload_size)
}

/// Decode a reply frame.
pub fn decode_reply(frame: &Frame) -> Result<Reply> {
    if !frame.is_reply() {
        return Err(BridgeError::Protocol(format!(
            "Expected reply frame, got call {}",
            frame.call_id()
        )));
    }

    let outcome = if frame.is_error() {
        let err: RemoteError = MsgPackCodec::decode(frame.payload()).map_err(|e| {
            BridgeError::Protocol(format!("Malformed error reply for call {}: {}", frame.call_id(), e))
        })?;
        Outcome::Failure(err)
    } else if frame.payload().is_empty() {
        Outcome::Success(Value::Nil)
    } else {
        Outcome::Success(MsgPackCodec::decode(frame.payload())?)
    };

    Ok(Reply {
        id: frame.call_id(),
        outcome,
    })
}

/// Pull the next complete reply out of `buffer`.
///
/// `Ok(None)` means more bytes are needed; nothing partial is ever returned.
pub fn next_reply(buffer: &mut FrameBuffer) -> Result<Option<Reply>> {
    match buffer.try_extract_one()? {
        Some(frame) => decode_reply(&frame).map(Some),
        None => Ok(None),
    }
}
