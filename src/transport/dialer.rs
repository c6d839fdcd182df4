use tokio::io;
use tokio::net::{TcpStream, UnixStream};

use super::Stream;
use crate::config::{Destination, TransportKind};
use crate::error::RelayError;
use crate::relay_debug;

/// Opens a fresh outbound connection to `destination`.
///
/// TCP addresses go through the resolver, so `localhost:8080` works as well
/// as a literal socket address. Nothing is cached or retried.
pub async fn dial(destination: &Destination) -> Result<Stream, RelayError> {
    relay_debug!("Dialing {}", destination);

    connect(destination).await.map_err(|source| RelayError::Dial {
        destination: destination.to_string(),
        source,
    })
}

async fn connect(destination: &Destination) -> io::Result<Stream> {
    match destination.kind() {
        TransportKind::Tcp => {
            let stream = TcpStream::connect(destination.address()).await?;
            stream.set_nodelay(true).ok();
            Ok(Stream::Tcp(stream))
        }
        TransportKind::Unix => {
            let stream = UnixStream::connect(destination.address()).await?;
            Ok(Stream::Unix(stream))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, UnixListener};

    #[tokio::test]
    async fn dials_tcp_destination() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let stream = dial(&Destination::tcp(addr)).await.expect("dial");
        assert!(matches!(stream, Stream::Tcp(_)));
        listener.accept().await.expect("accepted");
    }

    #[tokio::test]
    async fn dials_unix_destination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dest.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let stream = dial(&Destination::unix(path.to_string_lossy())).await.expect("dial");
        assert!(matches!(stream, Stream::Unix(_)));
        listener.accept().await.expect("accepted");
    }

    #[tokio::test]
    async fn missing_destination_is_connection_local() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nobody-home.sock");

        let err = dial(&Destination::unix(path.to_string_lossy())).await.unwrap_err();
        assert!(matches!(err, RelayError::Dial { .. }));
        assert!(!err.is_fatal());
    }
}
