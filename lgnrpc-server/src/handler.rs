//! Per-connection request/response lifecycle.

use crate::error::ServerError;
use crate::server::{Resolver, ServerStats};
use crate::stream::ServerStream;
use lgnrpc_protocol::{Codec, ControlBitmask, FrameAccumulator, Message};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::broadcast;

/// Socket read buffer size (8 KiB).
const READ_BUFFER_SIZE: usize = 8192;

/// Everything one connection task needs, cloned out of the server.
#[derive(Clone)]
pub(crate) struct ConnectionContext {
    pub(crate) codec: Codec,
    pub(crate) resolver: Resolver,
    pub(crate) required_bitmask: ControlBitmask,
    pub(crate) idle_timeout: Duration,
}

/// Rejects frames whose bitmask is not a superset of the server's
/// required capability bitmask, before they can reach the resolver.
fn check_required_bitmask(
    message: &Message,
    required: ControlBitmask,
) -> Result<(), ServerError> {
    if message.control_bitmask.is_superset_of(required) {
        Ok(())
    } else {
        Err(ServerError::RequiredBitmaskNotSatisfied {
            required: required.bits(),
            frame: message.control_bitmask.bits(),
        })
    }
}

/// Builds the structured error frame: empty URI, `containsError` set,
/// payload `"<code> <message>"`.
pub(crate) fn error_frame(error: &ServerError) -> Message {
    Message::new("", format!("{} {}", error.error_code(), error))
        .with_bitmask(ControlBitmask::new().with_contains_error())
}

async fn write_error_frame(stream: &mut ServerStream, codec: &Codec, error: &ServerError) {
    // Best effort: the connection is faulting anyway.
    if let Ok(bytes) = codec.encode(&error_frame(error)) {
        let _ = stream.write_all(&bytes).await;
    }
}

/// Drives one connection until it closes, faults or the server shuts down.
///
/// Frames are processed strictly in arrival order; the resolver runs on
/// this connection's task, so a slow resolver never stalls other
/// connections.
pub(crate) async fn handle_connection(
    mut stream: ServerStream,
    peer: String,
    context: ConnectionContext,
    shutdown: &mut broadcast::Receiver<()>,
    stats: Arc<ServerStats>,
) -> Result<(), ServerError> {
    tracing::info!("[{}] client connected", peer);

    let mut accumulator = FrameAccumulator::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        tracing::debug!("[{}] connection closed by peer", peer);
                        return Ok(());
                    }
                    Ok(n) => {
                        tracing::debug!("[{}] received {} bytes", peer, n);
                        accumulator.extend(&buf[..n]);
                    }
                    Err(e) => {
                        tracing::debug!("[{}] read error: {}", peer, e);
                        return Err(ServerError::Io(e));
                    }
                }
            }
            _ = tokio::time::sleep(context.idle_timeout) => {
                tracing::debug!("[{}] idle timeout", peer);
                return Err(ServerError::Timeout);
            }
            _ = shutdown.recv() => {
                tracing::debug!("[{}] shutdown signal received", peer);
                return Err(ServerError::ShuttingDown);
            }
        }

        // Process any complete frames, in arrival order.
        loop {
            let message = match accumulator.next_frame(&context.codec) {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(e) => {
                    if e.is_security() {
                        tracing::warn!("[{}] security failure: {}", peer, e);
                    } else {
                        tracing::debug!("[{}] decode error: {}", peer, e);
                    }
                    let error = ServerError::Protocol(e);
                    write_error_frame(&mut stream, &context.codec, &error).await;
                    return Err(error);
                }
            };

            // An inbound error frame is a transport fault, not a request.
            if message.control_bitmask.contains_error() {
                tracing::warn!("[{}] peer sent an error frame, closing", peer);
                return Err(ServerError::ConnectionClosed);
            }

            if let Err(error) = check_required_bitmask(&message, context.required_bitmask) {
                tracing::debug!("[{}] {}", peer, error);
                write_error_frame(&mut stream, &context.codec, &error).await;
                return Err(error);
            }

            stats.requests_total.fetch_add(1, Ordering::Relaxed);
            tracing::info!("[{}] request: {} (id={})", peer, message.uri, message.id);

            let response = match (context.resolver)(message).await {
                Some(response) => response,
                None => {
                    tracing::debug!("[{}] resolver returned no response, closing", peer);
                    return Ok(());
                }
            };

            let keep_alive = response.control_bitmask.keep_alive();
            let bytes = match context.codec.encode(&response) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!("[{}] response encoding failed: {}", peer, e);
                    let error = ServerError::Protocol(e);
                    write_error_frame(&mut stream, &context.codec, &error).await;
                    return Err(error);
                }
            };

            tracing::debug!("[{}] writing {} bytes", peer, bytes.len());
            stream.write_all(&bytes).await?;

            if !keep_alive {
                tracing::debug!("[{}] response without keep-alive, closing", peer);
                return Ok(());
            }
        }
    }
}
