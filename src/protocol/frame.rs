//! Frame struct with typed accessors.
//!
//! Represents a complete protocol frame with header and payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use sidecar_bridge::protocol::{Frame, Header, flags};
//! use bytes::Bytes;
//!
//! let header = Header::new(flags::REPLY, 42, 5);
//! let frame = Frame::new(header, Bytes::from_static(b"hello"));
//!
//! assert_eq!(frame.call_id(), 42);
//! assert_eq!(frame.payload(), b"hello");
//! ```

use bytes::Bytes;

use super::wire_format::{Header, HEADER_SIZE};

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    pub fn call_id(&self) -> u64 {
        self.header.call_id
    }

    #[inline]
    pub fn is_reply(&self) -> bool {
        self.header.is_reply()
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.header.is_error()
    }

    /// Serialize header and payload into one contiguous buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// Build a complete frame as a single byte vector.
///
/// The header's length field is taken from `payload`, so it always
/// matches the bytes that follow it.
///
/// # Example
///
/// ```
/// use sidecar_bridge::protocol::{build_frame, flags, HEADER_SIZE};
///
/// let bytes = build_frame(flags::CALL, 42, b"hello");
/// assert_eq!(bytes.len(), HEADER_SIZE + 5);
/// ```
pub fn build_frame(flags: u8, call_id: u64, payload: &[u8]) -> Vec<u8> {
    let header = Header::new(flags, call_id, payload.len() as u32);
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}
