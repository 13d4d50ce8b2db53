//! Transport module - Unix domain socket handling.
//!
//! The client side connects to a worker's socket; the worker side binds and
//! accepts. Both yield plain `tokio::net::UnixStream`s, which the connection
//! and worker layers treat as generic `AsyncRead + AsyncWrite` streams.

mod socket;

pub use socket::{connect, generate_socket_path, SocketListener};
