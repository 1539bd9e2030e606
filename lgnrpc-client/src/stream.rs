//! Outbound stream abstraction over TCP and Unix domain sockets.

use pin_project_lite::pin_project;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

/// Address a client connects to.
#[derive(Debug, Clone)]
pub enum ConnectTo {
    Tcp(SocketAddr),
    #[cfg(unix)]
    Unix(PathBuf),
}

impl std::fmt::Display for ConnectTo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectTo::Tcp(addr) => write!(f, "tcp://{addr}"),
            #[cfg(unix)]
            ConnectTo::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

pin_project! {
    /// An established connection stream, TCP or Unix.
    #[project = ClientStreamProj]
    pub enum ClientStream {
        Tcp { #[pin] stream: TcpStream },
        #[cfg(unix)]
        Unix { #[pin] stream: UnixStream },
    }
}

impl ClientStream {
    /// Connects to the target address.
    pub async fn connect(target: &ConnectTo) -> io::Result<Self> {
        match target {
            ConnectTo::Tcp(addr) => {
                let stream = TcpStream::connect(addr).await?;
                stream.set_nodelay(true).ok();
                Ok(ClientStream::Tcp { stream })
            }
            #[cfg(unix)]
            ConnectTo::Unix(path) => {
                let stream = UnixStream::connect(path).await?;
                Ok(ClientStream::Unix { stream })
            }
        }
    }
}

impl AsyncRead for ClientStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            ClientStreamProj::Tcp { stream } => stream.poll_read(cx, buf),
            #[cfg(unix)]
            ClientStreamProj::Unix { stream } => stream.poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ClientStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            ClientStreamProj::Tcp { stream } => stream.poll_write(cx, buf),
            #[cfg(unix)]
            ClientStreamProj::Unix { stream } => stream.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            ClientStreamProj::Tcp { stream } => stream.poll_flush(cx),
            #[cfg(unix)]
            ClientStreamProj::Unix { stream } => stream.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            ClientStreamProj::Tcp { stream } => stream.poll_shutdown(cx),
            #[cfg(unix)]
            ClientStreamProj::Unix { stream } => stream.poll_shutdown(cx),
        }
    }
}
