use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};

use crate::error::RelayError;
use crate::{relay_debug, relay_error, relay_warn};

/// How the relay ended.
#[derive(Debug)]
pub enum Termination {
    /// The supervised worker exited cleanly.
    Success,
    /// A fatal fault occurred somewhere.
    Failure(RelayError),
}

impl Termination {
    pub fn exit_code(&self) -> i32 {
        match self {
            Termination::Success => 0,
            Termination::Failure(_) => 1,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Termination::Success)
    }
}

/// Handle through which any task reports faults.
///
/// Fatal faults and a clean worker exit become a single [`Termination`]
/// delivered to the coordinator; the first one wins and later ones are
/// dropped. Connection-local faults only produce a warning.
#[derive(Clone, Debug)]
pub struct FaultPolicy {
    tx: Sender<Termination>,
}

impl FaultPolicy {
    pub fn channel() -> (Self, Receiver<Termination>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Routes `err` according to its class.
    pub fn report(&self, err: RelayError) {
        if err.is_fatal() {
            relay_error!("{}", err);
            self.terminate(Termination::Failure(err));
        } else {
            relay_warn!("{}", err);
        }
    }

    /// Ends the relay successfully.
    pub fn finish(&self) {
        self.terminate(Termination::Success);
    }

    fn terminate(&self, termination: Termination) {
        match self.tx.try_send(termination) {
            Ok(()) => {}
            Err(TrySendError::Full(t)) | Err(TrySendError::Closed(t)) => {
                relay_debug!("Relay already terminating, ignoring {:?}", t);
            }
        }
    }
}
