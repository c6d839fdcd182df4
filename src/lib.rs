pub mod acceptor;
pub mod activation;
pub mod bridge;
pub mod config;
pub mod error;
pub mod fault;
pub mod relay;
pub mod relay_log;
pub mod supervisor;
pub mod transport;

/* Re-exports */
pub use config::{Destination, RelayConfig, TransportKind, WorkerCommand};
pub use error::{ActivationError, ConfigError, RelayError};
pub use fault::{FaultPolicy, Termination};
pub use relay::Relay;
pub use transport::{Listener, Stream};
