//! Client connection lifecycle and request/response correlation.

use crate::error::ClientError;
use crate::stream::{ClientStream, ConnectTo};
use lgnrpc_protocol::{Codec, Cryptor, FrameAccumulator, Message};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address.
    pub connect: ConnectTo,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Request timeout.
    pub request_timeout: Duration,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
    /// Maximum accepted/produced frame size, if bounded.
    pub max_frame_size: Option<usize>,
}

impl ClientConfig {
    pub fn new(connect: ConnectTo) -> Self {
        Self {
            connect,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_frame_size: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = Some(max);
        self
    }
}

/// Established connection state: the stream plus its reassembly buffer,
/// owned together so a torn-down connection drops stale bytes with it.
struct Connection {
    stream: ClientStream,
    accumulator: FrameAccumulator,
}

/// LGNP client managing at most one outbound connection.
pub struct Client {
    config: ClientConfig,
    cryptor: Arc<Cryptor>,
    codec: Codec,
    connection: Mutex<Option<Connection>>,
    connected: AtomicBool,
    busy: AtomicBool,
}

impl Client {
    /// Creates a new client (not yet connected).
    pub fn new(config: ClientConfig, cryptor: Arc<Cryptor>) -> Self {
        let mut codec = Codec::new(cryptor.clone());
        if let Some(max) = config.max_frame_size {
            codec = codec.with_max_frame_size(max);
        }
        Self {
            config,
            cryptor,
            codec,
            connection: Mutex::new(None),
            connected: AtomicBool::new(false),
            busy: AtomicBool::new(false),
        }
    }

    /// Connects to the configured address.
    pub async fn connect(&self) -> Result<(), ClientError> {
        tracing::debug!("connecting to {}", self.config.connect);

        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            ClientStream::connect(&self.config.connect),
        )
        .await
        .map_err(|_| ClientError::Timeout)?
        .map_err(ClientError::Io)?;

        *self.connection.lock().await = Some(Connection {
            stream,
            accumulator: FrameAccumulator::new(),
        });
        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!("connected to {}", self.config.connect);
        Ok(())
    }

    /// Closes the connection, if any.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(mut connection) = self.connection.lock().await.take() {
            tracing::debug!("disconnecting from {}", self.config.connect);
            let _ = connection.stream.shutdown().await;
        }
        Ok(())
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Sends a request and waits for the correlated response.
    ///
    /// Connects first if needed. Only one request may be outstanding per
    /// client; an overlapping call fails with [`ClientError::Busy`]. If
    /// the response does not carry keep-alive, the client proactively
    /// disconnects afterwards.
    pub async fn request(&self, message: Message) -> Result<Message, ClientError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(ClientError::Busy);
        }
        let result = self.request_inner(message).await;
        self.busy.store(false, Ordering::SeqCst);
        result
    }

    /// Performs one request on a throwaway clone of this client, over a
    /// fresh connection that is torn down afterwards.
    ///
    /// Safe to call from concurrent tasks sharing one client, unlike
    /// [`Client::request`].
    pub async fn single_request(&self, message: Message) -> Result<Message, ClientError> {
        let throwaway = Client::new(self.config.clone(), self.cryptor.clone());
        let result = throwaway.request(message).await;
        let _ = throwaway.disconnect().await;
        result
    }

    async fn request_inner(&self, message: Message) -> Result<Message, ClientError> {
        if !self.is_connected() {
            self.connect().await?;
        }

        let request_id = message.id;
        let encoded = self.codec.encode(&message)?;

        let mut guard = self.connection.lock().await;
        let connection = guard.as_mut().ok_or(ClientError::NotConnected)?;

        tracing::debug!("sending request {} ({} bytes)", request_id, encoded.len());
        if let Err(e) = connection.stream.write_all(&encoded).await {
            *guard = None;
            self.connected.store(false, Ordering::SeqCst);
            return Err(ClientError::Io(e));
        }

        let response = match tokio::time::timeout(
            self.config.request_timeout,
            Self::read_response(connection, &self.codec, self.config.read_buffer_size),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                *guard = None;
                self.connected.store(false, Ordering::SeqCst);
                return Err(e);
            }
            Err(_) => {
                // Mid-frame state is unknown after a timeout; drop the
                // connection rather than resynchronize.
                tracing::debug!("request {} timed out", request_id);
                *guard = None;
                self.connected.store(false, Ordering::SeqCst);
                return Err(ClientError::Timeout);
            }
        };
        drop(guard);

        if response.id != request_id {
            tracing::debug!(
                "response id {} does not match request id {}",
                response.id,
                request_id
            );
        }

        if response.control_bitmask.contains_error() {
            let (code, text) = parse_error_payload(&response.payload);
            tracing::warn!("server error response: {} {}", code, text);
            let _ = self.disconnect().await;
            return Err(ClientError::ErrorResponse {
                code,
                message: text,
            });
        }

        if !response.control_bitmask.keep_alive() {
            tracing::debug!("response without keep-alive, disconnecting");
            let _ = self.disconnect().await;
        }

        Ok(response)
    }

    async fn read_response(
        connection: &mut Connection,
        codec: &Codec,
        buffer_size: usize,
    ) -> Result<Message, ClientError> {
        let mut buf = vec![0u8; buffer_size];
        loop {
            if let Some(message) = connection.accumulator.next_frame(codec)? {
                return Ok(message);
            }
            let n = connection.stream.read(&mut buf).await.map_err(ClientError::Io)?;
            if n == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            connection.accumulator.extend(&buf[..n]);
        }
    }
}

/// Splits a structured `"<code> <message>"` error payload.
fn parse_error_payload(payload: &[u8]) -> (u16, String) {
    let text = String::from_utf8_lossy(payload);
    match text.split_once(' ') {
        Some((code, message)) => (code.parse().unwrap_or(0), message.to_string()),
        None => (0, text.to_string()),
    }
}
