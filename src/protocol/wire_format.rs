//! Wire format encoding and decoding.
//!
//! Implements the 13-byte header format:
//! ```text
//! ┌───────┬──────────┬──────────┐
//! │ Flags │ Call ID  │ Length   │
//! │ 1 byte│ 8 bytes  │ 4 bytes  │
//! │       │ uint64 BE│ uint32 BE│
//! └───────┴──────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian.

use crate::error::{BridgeError, Result};

/// Header size in bytes (fixed, exactly 13).
pub const HEADER_SIZE: usize = 13;

/// Default maximum payload size (64 MB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Absolute maximum payload size (~2 GB, max i32).
pub const ABSOLUTE_MAX_PAYLOAD_SIZE: u32 = 2_147_483_647;

/// Reserved call ID (never issued).
pub const RESERVED_CALL_ID: u64 = 0;

/// Flag constants for the protocol.
pub mod flags {
    /// Message type: reply (1) or call (0).
    pub const IS_REPLY: u8 = 0b0000_0001;
    /// Error flag: error reply (1) or success (0).
    pub const IS_ERROR: u8 = 0b0000_0010;

    /// Reserved bits mask (bits 2-7).
    pub const RESERVED_MASK: u8 = 0b1111_1100;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }

    /// Call flags = 0x00
    pub const CALL: u8 = 0;
    /// Success reply flags = 0x01
    pub const REPLY: u8 = IS_REPLY;
    /// Error reply flags = 0x03
    pub const ERROR_REPLY: u8 = IS_REPLY | IS_ERROR;
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Flags byte (see `flags` module).
    pub flags: u8,
    /// Call identifier shared by a call and its reply.
    pub call_id: u64,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(flags: u8, call_id: u64, payload_length: u32) -> Self {
        Self {
            flags,
            call_id,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use sidecar_bridge::protocol::{Header, flags};
    ///
    /// let header = Header::new(flags::REPLY, 42, 100);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 13);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (13 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0] = self.flags;
        buf[1..9].copy_from_slice(&self.call_id.to_be_bytes());
        buf[9..13].copy_from_slice(&self.payload_length.to_be_bytes());
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    ///
    /// # Example
    ///
    /// ```
    /// use sidecar_bridge::protocol::Header;
    ///
    /// let bytes = [0x01, 0, 0, 0, 0, 0, 0, 0, 42, 0, 0, 0, 100];
    /// let header = Header::decode(&bytes).unwrap();
    /// assert!(header.is_reply());
    /// assert_eq!(header.call_id, 42);
    /// assert_eq!(header.payload_length, 100);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let buf: &[u8; HEADER_SIZE] = buf.get(..HEADER_SIZE)?.try_into().ok()?;
        let mut call_id = [0u8; 8];
        call_id.copy_from_slice(&buf[1..9]);
        Some(Self {
            flags: buf[0],
            call_id: u64::from_be_bytes(call_id),
            payload_length: u32::from_be_bytes([buf[9], buf[10], buf[11], buf[12]]),
        })
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Call ID is not 0 (reserved)
    /// - Payload length doesn't exceed max
    /// - Reserved flag bits are 0
    /// - Error flag only appears on replies
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.call_id == RESERVED_CALL_ID {
            return Err(BridgeError::Protocol("Call ID 0 is reserved".to_string()));
        }

        if self.payload_length > max_payload_size {
            return Err(BridgeError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }

        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(BridgeError::Protocol(
                "Reserved flag bits must be 0".to_string(),
            ));
        }

        if self.is_error() && !self.is_reply() {
            return Err(BridgeError::Protocol(
                "Error flag set on a call frame".to_string(),
            ));
        }

        Ok(())
    }

    /// Check if this is a reply.
    #[inline]
    pub fn is_reply(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_REPLY)
    }

    /// Check if this is an error reply.
    #[inline]
    pub fn is_error(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_ERROR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = Header::new(flags::REPLY, 42, 100);
        let encoded = original.encode();
        let decoded = Header::decode(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = Header::new(0x03, 0x0102_0304_0506_0708, 0x090A_0B0C);
        let bytes = header.encode();

        assert_eq!(bytes[0], 0x03);
        assert_eq!(&bytes[1..9], &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        assert_eq!(&bytes[9..13], &[0x09, 0x0A, 0x0B, 0x0C]);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; HEADER_SIZE - 1];
        assert!(Header::decode(&buf).is_none());
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut bytes = Header::new(flags::CALL, 7, 3).encode().to_vec();
        bytes.extend_from_slice(b"abc");
        let header = Header::decode(&bytes).unwrap();
        assert_eq!(header.call_id, 7);
        assert_eq!(header.payload_length, 3);
    }

    #[test]
    fn test_validate_call_id_zero_rejected() {
        let header = Header::new(flags::CALL, 0, 0);
        let result = header.validate(DEFAULT_MAX_PAYLOAD_SIZE);
        assert!(result.unwrap_err().to_string().contains("Call ID 0 is reserved"));
    }

    #[test]
    fn test_validate_payload_too_large() {
        let header = Header::new(flags::CALL, 1, 1_000_000);
        let result = header.validate(100);
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_validate_reserved_bits_must_be_zero() {
        let header = Header::new(0b1000_0000, 1, 0);
        let result = header.validate(DEFAULT_MAX_PAYLOAD_SIZE);
        assert!(result.unwrap_err().to_string().contains("Reserved flag bits"));
    }

    #[test]
    fn test_validate_error_flag_requires_reply() {
        let header = Header::new(flags::IS_ERROR, 1, 0);
        assert!(header.validate(DEFAULT_MAX_PAYLOAD_SIZE).is_err());

        let header = Header::new(flags::ERROR_REPLY, 1, 0);
        assert!(header.validate(DEFAULT_MAX_PAYLOAD_SIZE).is_ok());
    }

    #[test]
    fn test_flag_combinations() {
        assert_eq!(flags::CALL, 0x00);
        assert_eq!(flags::REPLY, 0x01);
        assert_eq!(flags::ERROR_REPLY, 0x03);

        let reply = Header::new(flags::ERROR_REPLY, 1, 0);
        assert!(reply.is_reply());
        assert!(reply.is_error());

        let call = Header::new(flags::CALL, 1, 0);
        assert!(!call.is_reply());
        assert!(!call.is_error());
    }
}
