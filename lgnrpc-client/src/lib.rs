//! # lgnrpc-client
//!
//! Client for the LGNP transport. A client manages at most one outbound
//! connection with a single outstanding-request slot; overlapping
//! requests are rejected with [`ClientError::Busy`] rather than raced.
//! Use [`Client::single_request`] when exclusive ownership of a shared
//! client cannot be guaranteed.

pub mod client;
pub mod error;
pub mod stream;

pub use client::{Client, ClientConfig};
pub use error::ClientError;
pub use stream::ConnectTo;
