//! lgnrpc - demo echo server for the LGNP transport.
//!
//! Binds the configured address and answers every request with its own
//! payload. Intended for interoperability testing, not production use:
//! real deployments embed [`lgnrpc::Server`] with their own resolver
//! and key material.

use lgnrpc::{
    resolver, BindTo, Cryptor, Server, ServerConfig, Supervisor, DEFAULT_PORT,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bind_addr = env_or("LGNRPC_BIND", &format!("0.0.0.0:{DEFAULT_PORT}"));
    // Demo-only key material; override both for anything beyond local testing.
    let salt = env_or("LGNRPC_SALT", "lgnrpc");
    let key = env_or("LGNRPC_KEY", "0123456789abcdef0123456789abcdef");

    let cryptor = Arc::new(Cryptor::new(salt, key.into_bytes())?);

    let config = ServerConfig::new(BindTo::Tcp(bind_addr.parse()?));
    tracing::info!("Starting lgnrpc echo server");
    tracing::info!("  Bind address: {}", config.bind);
    tracing::info!("  Idle timeout: {:?}", config.idle_timeout);
    tracing::info!("  Max connections: {}", config.max_connections);

    let server = Arc::new(Server::new(
        config,
        cryptor,
        resolver(|request| async move {
            tracing::debug!("echoing {} ({} bytes)", request.uri, request.payload.len());
            Some(request)
        }),
    ));

    let supervisor = Arc::new(Supervisor::new());
    supervisor.attach_server(server.clone());

    // Shutdown on Ctrl-C
    let signal_supervisor = supervisor.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping...");
        signal_supervisor.shutdown_all().await;
    });

    // Blocks until shutdown
    server.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}
