use std::net::SocketAddr as StdSocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::tcp::{OwnedReadHalf as TcpReadHalf, OwnedWriteHalf as TcpWriteHalf};
use tokio::net::unix::{OwnedReadHalf as UnixReadHalf, OwnedWriteHalf as UnixWriteHalf};
use tokio::net::{TcpStream, UnixStream};

// Enum to represent the peer of a connection on either transport
#[derive(Clone, Debug)]
pub enum PeerAddr {
    Tcp(StdSocketAddr),
    Unix(Option<String>),
}

impl std::fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerAddr::Tcp(addr) => write!(f, "{}", addr),
            PeerAddr::Unix(Some(path)) => write!(f, "unix:{}", path),
            PeerAddr::Unix(None) => f.write_str("unix:<unnamed>"),
        }
    }
}

impl From<tokio::net::unix::SocketAddr> for PeerAddr {
    fn from(addr: tokio::net::unix::SocketAddr) -> Self {
        PeerAddr::Unix(addr.as_pathname().map(|p| p.display().to_string()))
    }
}

/// A connected stream socket, inbound or outbound.
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Stream {
    /// Splits into owned halves that can move into separate copy tasks.
    ///
    /// The socket is closed once both halves are dropped; dropping the write
    /// half alone only shuts down the write direction.
    pub fn into_split(self) -> (ReadHalf, WriteHalf) {
        match self {
            Stream::Tcp(tcp) => {
                let (r, w) = tcp.into_split();
                (ReadHalf::Tcp(r), WriteHalf::Tcp(w))
            }
            Stream::Unix(unix) => {
                let (r, w) = unix.into_split();
                (ReadHalf::Unix(r), WriteHalf::Unix(w))
            }
        }
    }
}

// Enum to represent different types of read halves
#[derive(Debug)]
pub enum ReadHalf {
    Tcp(TcpReadHalf),
    Unix(UnixReadHalf),
}

// Enum to represent different types of write halves
#[derive(Debug)]
pub enum WriteHalf {
    Tcp(TcpWriteHalf),
    Unix(UnixWriteHalf),
}

impl AsyncRead for ReadHalf {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ReadHalf::Tcp(tcp) => Pin::new(tcp).poll_read(cx, buf),
            ReadHalf::Unix(unix) => Pin::new(unix).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for WriteHalf {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            WriteHalf::Tcp(tcp) => Pin::new(tcp).poll_write(cx, buf),
            WriteHalf::Unix(unix) => Pin::new(unix).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            WriteHalf::Tcp(tcp) => Pin::new(tcp).poll_flush(cx),
            WriteHalf::Unix(unix) => Pin::new(unix).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            WriteHalf::Tcp(tcp) => Pin::new(tcp).poll_shutdown(cx),
            WriteHalf::Unix(unix) => Pin::new(unix).poll_shutdown(cx),
        }
    }
}
