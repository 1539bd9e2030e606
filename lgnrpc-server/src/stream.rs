//! Listener and stream abstraction over TCP and Unix domain sockets.

use pin_project_lite::pin_project;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

/// Address a server binds to.
#[derive(Debug, Clone)]
pub enum BindTo {
    Tcp(SocketAddr),
    #[cfg(unix)]
    Unix(PathBuf),
}

impl std::fmt::Display for BindTo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindTo::Tcp(addr) => write!(f, "tcp://{addr}"),
            #[cfg(unix)]
            BindTo::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// A bound listener of either flavor.
pub(crate) enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl Listener {
    pub(crate) async fn bind(bind: &BindTo) -> io::Result<Self> {
        match bind {
            BindTo::Tcp(addr) => Ok(Listener::Tcp(TcpListener::bind(addr).await?)),
            #[cfg(unix)]
            BindTo::Unix(path) => Ok(Listener::Unix(UnixListener::bind(path)?)),
        }
    }

    /// Accepts one connection and returns it with a peer label for logs.
    pub(crate) async fn accept(&self) -> io::Result<(ServerStream, String)> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                stream.set_nodelay(true).ok();
                Ok((ServerStream::Tcp { stream }, addr.to_string()))
            }
            #[cfg(unix)]
            Listener::Unix(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok((ServerStream::Unix { stream }, "uds".to_string()))
            }
        }
    }
}

pin_project! {
    /// An accepted connection stream, TCP or Unix.
    #[project = ServerStreamProj]
    pub enum ServerStream {
        Tcp { #[pin] stream: TcpStream },
        #[cfg(unix)]
        Unix { #[pin] stream: UnixStream },
    }
}

impl AsyncRead for ServerStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            ServerStreamProj::Tcp { stream } => stream.poll_read(cx, buf),
            #[cfg(unix)]
            ServerStreamProj::Unix { stream } => stream.poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ServerStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            ServerStreamProj::Tcp { stream } => stream.poll_write(cx, buf),
            #[cfg(unix)]
            ServerStreamProj::Unix { stream } => stream.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            ServerStreamProj::Tcp { stream } => stream.poll_flush(cx),
            #[cfg(unix)]
            ServerStreamProj::Unix { stream } => stream.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            ServerStreamProj::Tcp { stream } => stream.poll_shutdown(cx),
            #[cfg(unix)]
            ServerStreamProj::Unix { stream } => stream.poll_shutdown(cx),
        }
    }
}
