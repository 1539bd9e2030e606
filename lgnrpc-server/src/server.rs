//! Server configuration and accept loop.

use crate::error::ServerError;
use crate::handler::{handle_connection, ConnectionContext};
use crate::stream::{BindTo, Listener};
use lgnrpc_protocol::{Codec, ControlBitmask, Cryptor, Message};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tokio::sync::broadcast;

/// Boxed future returned by a resolver invocation.
pub type ResolverFuture = Pin<Box<dyn Future<Output = Option<Message>> + Send>>;

/// Application logic mapping a decoded request to an optional response.
///
/// Supplied by the contract layer; returning `None` closes the connection
/// without writing a response.
pub type Resolver = Arc<dyn Fn(Message) -> ResolverFuture + Send + Sync>;

/// Wraps an async closure into a [`Resolver`].
pub fn resolver<F, Fut>(f: F) -> Resolver
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Message>> + Send + 'static,
{
    Arc::new(move |message| Box::pin(f(message)) as ResolverFuture)
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind: BindTo,
    /// Idle connection timeout.
    pub idle_timeout: Duration,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Capability bitmask every inbound frame must be a superset of.
    pub required_bitmask: ControlBitmask,
    /// Maximum accepted/produced frame size, if bounded.
    pub max_frame_size: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: BindTo::Tcp(
                std::net::SocketAddr::from(([127, 0, 0, 1], lgnrpc_protocol::DEFAULT_PORT)),
            ),
            idle_timeout: Duration::from_secs(300),
            max_connections: 1000,
            required_bitmask: ControlBitmask::new(),
            max_frame_size: None,
        }
    }
}

impl ServerConfig {
    pub fn new(bind: BindTo) -> Self {
        Self {
            bind,
            ..Default::default()
        }
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_required_bitmask(mut self, bitmask: ControlBitmask) -> Self {
        self.required_bitmask = bitmask;
        self
    }

    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = Some(max);
        self
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub requests_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// LGNP server: binds a listener and drives one task per connection.
pub struct Server {
    config: ServerConfig,
    codec: Codec,
    resolver: Resolver,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server around an immutable, shared cryptor.
    pub fn new(config: ServerConfig, cryptor: Arc<Cryptor>, resolver: Resolver) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut codec = Codec::new(cryptor);
        if let Some(max) = config.max_frame_size {
            codec = codec.with_max_frame_size(max);
        }
        Self {
            config,
            codec,
            resolver,
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Binds the configured address and runs until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = Listener::bind(&self.config.bind).await?;
        tracing::info!("server listening on {}", self.config.bind);
        self.serve_inner(listener).await
    }

    /// Serves on a pre-bound TCP listener (useful with port 0 in tests).
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        self.serve_inner(Listener::Tcp(listener)).await
    }

    /// Serves on a pre-bound Unix listener.
    #[cfg(unix)]
    pub async fn serve_unix(&self, listener: UnixListener) -> Result<(), ServerError> {
        self.serve_inner(Listener::Unix(listener)).await
    }

    async fn serve_inner(&self, listener: Listener) -> Result<(), ServerError> {
        self.running.store(true, Ordering::SeqCst);
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            if self.stats.connections_active.load(Ordering::Relaxed)
                                >= self.config.max_connections as u64
                            {
                                tracing::warn!("connection limit reached, rejecting {}", peer);
                                continue;
                            }

                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                            let context = ConnectionContext {
                                codec: self.codec.clone(),
                                resolver: self.resolver.clone(),
                                required_bitmask: self.config.required_bitmask,
                                idle_timeout: self.config.idle_timeout,
                            };
                            let stats = self.stats.clone();
                            let mut conn_shutdown = self.shutdown.subscribe();

                            tokio::spawn(async move {
                                let result = handle_connection(
                                    stream,
                                    peer.clone(),
                                    context,
                                    &mut conn_shutdown,
                                    stats.clone(),
                                )
                                .await;

                                if let Err(e) = result {
                                    tracing::debug!("[{}] connection fault: {}", peer, e);
                                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                }
                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                                tracing::info!("[{}] client disconnected", peer);
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Initiates server shutdown; live connections are interrupted.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the accept loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}
