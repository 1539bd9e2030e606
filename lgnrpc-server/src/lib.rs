//! # lgnrpc-server
//!
//! TCP/UDS server for the LGNP transport: accepts connections, reassembles
//! frames, gates them on a required capability bitmask, dispatches decoded
//! messages to an application-supplied resolver and writes the responses
//! back, honoring per-response keep-alive.

pub mod error;
pub mod handler;
pub mod server;
pub mod stream;

pub use error::ServerError;
pub use server::{resolver, Resolver, ResolverFuture, Server, ServerConfig, ServerStats};
pub use stream::BindTo;
