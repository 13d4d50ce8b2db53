//! # sidecar-bridge
//!
//! Async request/response bridge between a Rust caller and a companion
//! worker process listening on a Unix domain socket.
//!
//! Many tasks can call concurrently over one or a few persistent
//! connections. Each call suspends only its own task; replies are matched
//! to callers by call id, whatever order they arrive in.
//!
//! ## Architecture
//!
//! - **Client** ([`Client`]): picks a connection, allocates an id, waits
//! - **Connection** ([`connection::Connection`]): writer task + read loop +
//!   per-connection [`correlation::CorrelationTable`]
//! - **Wire** ([`protocol`], [`codec`]): 13-byte header, MessagePack payloads
//! - **Worker** ([`worker`]): the serving half of the same protocol
//! - **Facade** ([`mongo`]): typed document-store operations on top
//! - **Shared config** ([`shared_config`]): host key/value settings the
//!   worker reads and writes over the same protocol
//!
//! ## Example
//!
//! ```ignore
//! use sidecar_bridge::{Client, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .socket_address("/tmp/sidecar.sock")
//!         .connect()
//!         .await?;
//!
//!     let reply = client.call("mongo.runCommand", Value::map([
//!         ("database", Value::from("admin")),
//!         ("command", Value::map([("ping", 1)])),
//!     ])).await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod correlation;
pub mod error;
pub mod mongo;
pub mod protocol;
pub mod shared_config;
pub mod transport;
pub mod value;
pub mod worker;
pub mod writer;

mod client;

pub use client::{Client, ClientBuilder};
pub use codec::RemoteError;
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use mongo::MongoClient;
pub use value::Value;
pub use worker::{Worker, WorkerBuilder};
