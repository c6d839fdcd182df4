use std::io;
use std::sync::Arc;

use crate::bridge::ConnectionBridge;
use crate::config::Destination;
use crate::error::RelayError;
use crate::fault::FaultPolicy;
use crate::transport::Listener;
use crate::{relay_debug, relay_info, relay_warn};

/// Accept loop for a single activated listener.
pub struct Acceptor {
    listener: Listener,
    destination: Arc<Destination>,
    faults: FaultPolicy,
}

impl Acceptor {
    pub fn new(listener: Listener, destination: Arc<Destination>, faults: FaultPolicy) -> Self {
        Self { listener, destination, faults }
    }

    /// Accepts until the listener fails.
    ///
    /// Every connection gets its own bridge task so a slow dial never holds
    /// up the next accept. A peer that gave up before being accepted is
    /// skipped; any other accept error is fatal for the whole relay.
    pub async fn run(self) {
        let local = self.listener.describe();
        relay_info!("Accepting connections on {}", local);

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    relay_debug!("Accepted connection from {} on {}", peer, local);

                    let bridge = ConnectionBridge::new(
                        stream,
                        peer,
                        Arc::clone(&self.destination),
                        self.faults.clone(),
                    );
                    tokio::spawn(bridge.run());
                }
                Err(e) if is_aborted_handshake(&e) => {
                    relay_warn!("Connection aborted before accept on {}: {}", local, e);
                }
                Err(e) => {
                    self.faults.report(RelayError::Accept(e));
                    return;
                }
            }
        }
    }
}

/// `ECONNABORTED`: the peer reset the connection while it sat in the backlog.
/// The listener itself is fine.
fn is_aborted_handshake(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::ConnectionAborted
}
