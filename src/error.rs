//! src/error.rs

use std::io;
use std::process::ExitStatus;
use thiserror::Error;

/// Everything that can end the relay or a single connection.
#[derive(Debug, Error)]
pub enum RelayError {
    /* ───────────── Start-up ───────────── */
    #[error("error activating launch socket: {0}")]
    Activation(#[from] ActivationError),

    #[error("error activating launch socket: no listeners for `{0}'")]
    NoListeners(String),

    /* ───────────── Serving ───────────── */
    #[error("error accepting connection: {0}")]
    Accept(#[source] io::Error),

    #[error("error connecting to program at {destination}: {source}")]
    Dial {
        destination: String,
        #[source]
        source: io::Error,
    },

    /* ───────────── Worker ───────────── */
    #[error("program `{program}' failed to start: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("error waiting for program `{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("program `{program}' exited: {status}")]
    WorkerExit { program: String, status: ExitStatus },

    #[error("all relay tasks ended without a termination signal")]
    TasksEnded,
}

impl RelayError {
    /// Only a failed dial is local to its connection; everything else takes
    /// the whole relay down.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RelayError::Dial { .. })
    }
}

/// Failure to obtain pre-bound listeners from the service manager.
#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("process was not socket-activated")]
    NotActivated,

    #[error("invalid {var} value `{value}'")]
    InvalidEnv { var: &'static str, value: String },

    #[error("LISTEN_PID {expected} does not match process id {actual}")]
    PidMismatch { expected: u32, actual: u32 },

    #[error("launch_activate_socket failed: {0}")]
    Launchd(io::Error),

    #[error("descriptor {fd} is not a usable stream socket: {source}")]
    Descriptor {
        fd: i32,
        #[source]
        source: io::Error,
    },
}

/// Argument and environment problems detected before the relay starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("usage: {0} <program> [<arg> ...]")]
    Usage(String),

    #[error("please set LAUNCH_PROGRAM_TCP_ADDRESS or LAUNCH_PROGRAM_SOCKET_PATH")]
    MissingDestination,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_dial_errors_are_connection_local() {
        let dial = RelayError::Dial {
            destination: "127.0.0.1:1".into(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert!(!dial.is_fatal());

        assert!(RelayError::Accept(io::Error::from(io::ErrorKind::Other)).is_fatal());
        assert!(RelayError::NoListeners("Socket".into()).is_fatal());
        assert!(RelayError::Activation(ActivationError::NotActivated).is_fatal());
        assert!(RelayError::TasksEnded.is_fatal());
    }

    #[test]
    fn wait_failure_is_fatal_and_not_reported_as_start_failure() {
        let err = RelayError::Wait {
            program: "worker".into(),
            source: io::Error::from(io::ErrorKind::Interrupted),
        };
        assert!(err.is_fatal());
        let text = err.to_string();
        assert!(text.starts_with("error waiting for program `worker'"), "{text}");
        assert!(!text.contains("failed to start"));
    }

    #[test]
    fn messages_are_single_line() {
        let err = RelayError::Spawn {
            program: "worker".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        let text = err.to_string();
        assert!(text.starts_with("program `worker' failed to start"));
        assert!(!text.contains('\n'));
    }
}
