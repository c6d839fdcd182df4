use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;
use uuid::Uuid;

use crate::config::Destination;
use crate::fault::FaultPolicy;
use crate::transport::{self, PeerAddr, ReadHalf, Stream, WriteHalf};
use crate::{relay_debug, relay_info};

const COPY_BUFFER_SIZE: usize = 16 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Upstream,
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upstream => f.write_str("client -> program"),
            Direction::Downstream => f.write_str("program -> client"),
        }
    }
}

/// Close-once guard shared by both directions of a connection pair.
///
/// Whichever direction finishes first flips the flag; the other one observes
/// it and drops its halves, which closes both sockets.
#[derive(Clone, Debug)]
pub struct PairCloser {
    tx: Arc<watch::Sender<bool>>,
}

impl PairCloser {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Returns `true` only for the call that actually closed the pair.
    pub fn close(&self) -> bool {
        self.tx.send_if_modified(|closed| !std::mem::replace(closed, true))
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`close`](Self::close) has been called, even if that
    /// happened before this future was created.
    pub async fn closed(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl Default for PairCloser {
    fn default() -> Self {
        Self::new()
    }
}

/// One accepted connection on its way to the destination.
pub struct ConnectionBridge {
    id: Uuid,
    inbound: Stream,
    peer: PeerAddr,
    destination: Arc<Destination>,
    faults: FaultPolicy,
}

impl ConnectionBridge {
    pub fn new(inbound: Stream, peer: PeerAddr, destination: Arc<Destination>, faults: FaultPolicy) -> Self {
        Self { id: Uuid::new_v4(), inbound, peer, destination, faults }
    }

    /// Dials the destination and, on success, starts both copy directions.
    ///
    /// A failed dial is reported as connection-local and the inbound stream
    /// is dropped here. Returns once the copy tasks have been spawned; they
    /// run detached.
    pub async fn run(self) {
        let ConnectionBridge { id, inbound, peer, destination, faults } = self;

        let outbound = match transport::dial(&destination).await {
            Ok(stream) => stream,
            Err(e) => {
                faults.report(e);
                drop(inbound);
                return;
            }
        };
        relay_info!("Connection {} from {} bridged to {}", id, peer, destination);

        let (in_read, in_write) = inbound.into_split();
        let (out_read, out_write) = outbound.into_split();
        let closer = PairCloser::new();

        tokio::spawn(pump(id, Direction::Upstream, in_read, out_write, closer.clone()));
        tokio::spawn(pump(id, Direction::Downstream, out_read, in_write, closer));
    }
}

/// Copies one direction until EOF, an error, or the peer direction closing
/// the pair. Always closes the pair on the way out.
async fn pump(id: Uuid, direction: Direction, mut reader: ReadHalf, mut writer: WriteHalf, closer: PairCloser) {
    let outcome = tokio::select! {
        res = copy(&mut reader, &mut writer) => Some(res),
        _ = closer.closed() => None,
    };

    match outcome {
        Some(Ok(bytes)) => {
            relay_debug!("Connection {} {}: end of stream after {} bytes", id, direction, bytes);
        }
        Some(Err(e)) => {
            relay_debug!("Connection {} {}: {}", id, direction, e);
        }
        None => {
            relay_debug!("Connection {} {}: closed by peer direction", id, direction);
        }
    }

    if closer.close() {
        relay_info!("Connection {} closed", id);
    }
    // Dropping the halves here; the socket goes away once the peer direction
    // has dropped its halves too.
    drop(reader);
    drop(writer);
}

#[derive(Debug)]
enum CopyError {
    Read(io::Error),
    Write(io::Error),
}

impl fmt::Display for CopyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyError::Read(e) => write!(f, "read failed: {}", e),
            CopyError::Write(e) => write!(f, "write failed: {}", e),
        }
    }
}

async fn copy(reader: &mut ReadHalf, writer: &mut WriteHalf) -> Result<u64, CopyError> {
    let mut buf = BytesMut::with_capacity(COPY_BUFFER_SIZE);
    let mut total = 0u64;

    loop {
        buf.clear();
        buf.reserve(COPY_BUFFER_SIZE);

        let n = reader.read_buf(&mut buf).await.map_err(CopyError::Read)?;
        if n == 0 {
            return Ok(total);
        }

        writer.write_all(&buf).await.map_err(CopyError::Write)?;
        total += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::UnixStream;
    use tokio::time::timeout;

    #[test]
    fn close_is_idempotent() {
        let closer = PairCloser::new();
        assert!(!closer.is_closed());
        assert!(closer.close());
        assert!(!closer.close());
        assert!(!closer.clone().close());
        assert!(closer.is_closed());
    }

    #[tokio::test]
    async fn closed_resolves_after_late_subscribe() {
        let closer = PairCloser::new();
        closer.close();
        timeout(Duration::from_secs(1), closer.closed()).await.expect("already closed");
    }

    #[tokio::test]
    async fn concurrent_closers_agree_on_one_winner() {
        let closer = PairCloser::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = closer.clone();
                tokio::spawn(async move { c.close() })
            })
            .collect();

        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn pump_copies_until_eof_then_closes_pair() {
        let (mut src_peer, src) = UnixStream::pair().unwrap();
        let (dst, mut dst_peer) = UnixStream::pair().unwrap();

        let (reader, _src_write) = Stream::Unix(src).into_split();
        let (_dst_read, writer) = Stream::Unix(dst).into_split();
        let closer = PairCloser::new();

        let task = tokio::spawn(pump(Uuid::new_v4(), Direction::Upstream, reader, writer, closer.clone()));

        src_peer.write_all(b"hello relay").await.unwrap();
        src_peer.shutdown().await.unwrap();

        let mut got = vec![0u8; 11];
        dst_peer.read_exact(&mut got).await.unwrap();
        assert_eq!(&got, b"hello relay");

        timeout(Duration::from_secs(1), task).await.expect("pump finished").unwrap();
        assert!(closer.is_closed());
    }

    #[tokio::test]
    async fn pump_stops_when_peer_direction_closes() {
        let (_src_peer, src) = UnixStream::pair().unwrap();
        let (dst, _dst_peer) = UnixStream::pair().unwrap();

        let (reader, _w) = Stream::Unix(src).into_split();
        let (_r, writer) = Stream::Unix(dst).into_split();
        let closer = PairCloser::new();

        let task = tokio::spawn(pump(Uuid::new_v4(), Direction::Downstream, reader, writer, closer.clone()));
        closer.close();

        timeout(Duration::from_secs(1), task).await.expect("pump unblocked").unwrap();
    }
}
