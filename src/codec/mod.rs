//! Codec module - payload serialization and call/reply framing.
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (`to_vec_named`)
//! - [`encode_call`] / [`decode_reply`] - client side of the frame protocol
//! - [`decode_call`] / [`encode_reply`] - worker side of the frame protocol
//!
//! # Example
//!
//! ```
//! use sidecar_bridge::codec::{decode_call, encode_call, Call};
//! use sidecar_bridge::protocol::DEFAULT_MAX_PAYLOAD_SIZE;
//! use sidecar_bridge::Value;
//!
//! let call = Call::new(1, "mongo.findOne", Value::map([("filter", Value::map([(2, 1)]))]));
//! let frame = encode_call(&call, DEFAULT_MAX_PAYLOAD_SIZE).unwrap();
//! assert_eq!(decode_call(&frame).unwrap(), call);
//! ```

mod message;
mod msgpack;

pub use message::{
    decode_call, decode_reply, encode_call, encode_reply, next_reply, Call, Outcome, RemoteError,
    Reply,
};
pub use msgpack::MsgPackCodec;
