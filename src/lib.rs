//! # lgnrpc
//!
//! Compact binary RPC transport over TCP or Unix domain sockets. Frames
//! carry a 16-bit control bitmask selecting encryption (AES-CBC),
//! HMAC signing (SHA-256/384/512), a metadata section, and keep-alive
//! semantics. See [`lgnrpc_protocol`] for the wire format,
//! [`lgnrpc_server`] and [`lgnrpc_client`] for the endpoints.

use std::sync::{Arc, Mutex};

pub use lgnrpc_client::{Client, ClientConfig, ClientError, ConnectTo};
pub use lgnrpc_protocol::{
    Codec, ContentType, ControlBitmask, Cryptor, FrameAccumulator, Message, Meta, ProtocolError,
    SignatureAlgorithm, DEFAULT_PORT,
};
pub use lgnrpc_server::{
    resolver, BindTo, Resolver, ResolverFuture, Server, ServerConfig, ServerError, ServerStats,
};

/// Tracks live servers and clients so a process can tear all of them
/// down from one place (typically a signal handler).
///
/// Attaching hands the supervisor a shared handle; the endpoints keep
/// running on their own and [`Supervisor::shutdown_all`] stops whatever
/// is still attached at that point.
#[derive(Default)]
pub struct Supervisor {
    servers: Mutex<Vec<Arc<Server>>>,
    clients: Mutex<Vec<Arc<Client>>>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a server for supervised shutdown.
    pub fn attach_server(&self, server: Arc<Server>) {
        self.servers.lock().unwrap_or_else(|e| e.into_inner()).push(server);
    }

    /// Registers a client for supervised shutdown.
    pub fn attach_client(&self, client: Arc<Client>) {
        self.clients.lock().unwrap_or_else(|e| e.into_inner()).push(client);
    }

    /// Stops every attached server and disconnects every attached client.
    pub async fn shutdown_all(&self) {
        let servers: Vec<_> = self
            .servers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        let clients: Vec<_> = self
            .clients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();

        tracing::info!(
            "shutting down {} server(s) and {} client(s)",
            servers.len(),
            clients.len()
        );
        for server in servers {
            server.shutdown();
        }
        for client in clients {
            let _ = client.disconnect().await;
        }
    }

    /// Number of currently attached servers.
    pub fn server_count(&self) -> usize {
        self.servers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Number of currently attached clients.
    pub fn client_count(&self) -> usize {
        self.clients.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cryptor() -> Arc<Cryptor> {
        Arc::new(Cryptor::new("pepper", vec![7u8; 32]).unwrap())
    }

    #[tokio::test]
    async fn test_supervisor_shutdown_all_drains() {
        let supervisor = Supervisor::new();

        let server = Arc::new(Server::new(
            ServerConfig::default(),
            test_cryptor(),
            resolver(|message| async move { Some(message) }),
        ));
        let client = Arc::new(Client::new(
            ClientConfig::new(ConnectTo::Tcp(format!("127.0.0.1:{DEFAULT_PORT}").parse().unwrap())),
            test_cryptor(),
        ));

        supervisor.attach_server(server.clone());
        supervisor.attach_client(client.clone());
        assert_eq!(supervisor.server_count(), 1);
        assert_eq!(supervisor.client_count(), 1);

        supervisor.shutdown_all().await;
        assert_eq!(supervisor.server_count(), 0);
        assert_eq!(supervisor.client_count(), 0);
        assert!(!server.is_running());
        assert!(!client.is_connected());
    }
}
