use std::sync::Arc;

use tokio::task::JoinSet;

use crate::acceptor::Acceptor;
use crate::activation;
use crate::config::{Destination, RelayConfig};
use crate::error::RelayError;
use crate::fault::{FaultPolicy, Termination};
use crate::supervisor::Supervisor;
use crate::transport::Listener;
use crate::{relay_error, relay_info};

/// Top-level coordinator: launches acceptors and the optional worker, then
/// waits for the first termination signal.
pub struct Relay {
    cfg: RelayConfig,
}

impl Relay {
    pub fn new(cfg: RelayConfig) -> Self {
        Self { cfg }
    }

    /// Obtains the activated listeners for the configured socket set and
    /// serves them.
    pub async fn run(self) -> Termination {
        match activation::obtain_listeners(self.cfg.socket_name()) {
            Ok(listeners) => self.serve(listeners).await,
            Err(e) => {
                relay_error!("{}", e);
                Termination::Failure(e)
            }
        }
    }

    /// Serves `listeners` until a fatal fault or a clean worker exit.
    ///
    /// Nothing is spawned when `listeners` is empty. On return the acceptors
    /// and the supervisor are aborted; bridges already running are left
    /// alone, the caller is expected to exit the process.
    pub async fn serve(self, listeners: Vec<Listener>) -> Termination {
        if listeners.is_empty() {
            let err = RelayError::NoListeners(self.cfg.socket_name().to_string());
            relay_error!("{}", err);
            return Termination::Failure(err);
        }

        let RelayConfig { destination, worker, .. } = self.cfg;
        let destination: Arc<Destination> = Arc::new(destination);
        let (faults, mut signals) = FaultPolicy::channel();
        let mut tasks = JoinSet::new();

        if let Some(worker) = worker {
            relay_info!("Starting program `{}'", worker.program);
            tasks.spawn(Supervisor::new(worker, faults.clone()).run());
        }

        relay_info!("Relaying {} listener(s) to {}", listeners.len(), destination);
        for listener in listeners {
            let acceptor = Acceptor::new(listener, Arc::clone(&destination), faults.clone());
            tasks.spawn(acceptor.run());
        }

        // From here on only the spawned tasks hold senders.
        drop(faults);

        let termination = signals.recv().await.unwrap_or(Termination::Failure(RelayError::TasksEnded));
        tasks.abort_all();
        termination
    }
}
