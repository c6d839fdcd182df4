use std::fmt;
use std::path::PathBuf;

use crate::error::ConfigError;

pub const SOCKET_NAME_VAR: &str = "LAUNCH_DAEMON_SOCKET_NAME";
pub const TCP_ADDRESS_VAR: &str = "LAUNCH_PROGRAM_TCP_ADDRESS";
pub const SOCKET_PATH_VAR: &str = "LAUNCH_PROGRAM_SOCKET_PATH";

pub const DEFAULT_SOCKET_NAME: &str = "Socket";

/// Program names meaning "relay only, no worker".
const NO_WORKER: [&str; 2] = ["-", "none"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    Unix,
    Tcp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Unix => f.write_str("unix"),
            TransportKind::Tcp => f.write_str("tcp"),
        }
    }
}

/// Where every accepted connection gets forwarded to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    kind: TransportKind,
    address: String,
}

impl Destination {
    pub fn new(kind: TransportKind, address: impl Into<String>) -> Self {
        Self { kind, address: address.into() }
    }

    pub fn tcp(address: impl Into<String>) -> Self {
        Self::new(TransportKind::Tcp, address)
    }

    pub fn unix(path: impl Into<String>) -> Self {
        Self::new(TransportKind::Unix, path)
    }

    #[inline] pub fn kind(&self) -> TransportKind { self.kind }
    #[inline] pub fn address(&self) -> &str       { &self.address }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.address)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Variables exported to the worker on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args, env: Vec::new() }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayConfig {
    pub socket_name: String,
    pub destination: Destination,
    pub worker: Option<WorkerCommand>,
}

impl RelayConfig {
    pub fn new(socket_name: impl Into<String>, destination: Destination) -> Self {
        Self { socket_name: socket_name.into(), destination, worker: None }
    }

    pub fn with_worker(mut self, worker: WorkerCommand) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn socket_name(&self) -> &str {
        &self.socket_name
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn worker(&self) -> Option<&WorkerCommand> {
        self.worker.as_ref()
    }

    /// Builds the configuration from the real process arguments and environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(std::env::args(), |key| std::env::var(key).ok())
    }

    /// Resolves `<self> <program> [<arg> ...]` against an environment lookup.
    ///
    /// A TCP address wins over a socket path. With neither set, a worker gets
    /// a generated socket path in the temp dir; without a worker there is
    /// nothing to fall back to.
    pub fn resolve<I, F>(args: I, lookup: F) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
        F: Fn(&str) -> Option<String>,
    {
        let mut args = args.into_iter();
        let argv0 = args.next().unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
        let program = args.next().ok_or(ConfigError::Usage(argv0))?;
        let program_args: Vec<String> = args.collect();

        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let has_worker = !NO_WORKER.contains(&program.as_str());

        let socket_name = lookup(SOCKET_NAME_VAR).unwrap_or_else(|| DEFAULT_SOCKET_NAME.to_string());
        let mut exports = vec![(SOCKET_NAME_VAR.to_string(), socket_name.clone())];

        let destination = if let Some(addr) = lookup(TCP_ADDRESS_VAR) {
            Destination::tcp(addr)
        } else if let Some(path) = lookup(SOCKET_PATH_VAR) {
            Destination::unix(path)
        } else if has_worker {
            let path = fallback_socket_path(std::process::id());
            let path = path.to_string_lossy().into_owned();
            exports.push((SOCKET_PATH_VAR.to_string(), path.clone()));
            Destination::unix(path)
        } else {
            return Err(ConfigError::MissingDestination);
        };

        let worker = has_worker.then(|| WorkerCommand {
            program,
            args: program_args,
            env: exports,
        });

        Ok(Self { socket_name, destination, worker })
    }
}

/// `<tmpdir>/launch_socket_server.sock-<pid>`
pub fn fallback_socket_path(pid: u32) -> PathBuf {
    std::env::temp_dir().join(format!("launch_socket_server.sock-{pid}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_program_is_usage_error() {
        let err = RelayConfig::resolve(args(&["relay"]), env(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Usage("relay".into()));
    }

    #[test]
    fn tcp_address_wins_over_socket_path() {
        let cfg = RelayConfig::resolve(
            args(&["relay", "-"]),
            env(&[(TCP_ADDRESS_VAR, "127.0.0.1:8080"), (SOCKET_PATH_VAR, "/tmp/app.sock")]),
        )
        .unwrap();

        assert_eq!(cfg.destination(), &Destination::tcp("127.0.0.1:8080"));
        assert_eq!(cfg.socket_name(), DEFAULT_SOCKET_NAME);
        assert!(cfg.worker().is_none());
    }

    #[test]
    fn empty_values_count_as_unset() {
        let cfg = RelayConfig::resolve(
            args(&["relay", "none"]),
            env(&[(TCP_ADDRESS_VAR, ""), (SOCKET_PATH_VAR, "/tmp/app.sock"), (SOCKET_NAME_VAR, "")]),
        )
        .unwrap();

        assert_eq!(cfg.destination(), &Destination::unix("/tmp/app.sock"));
        assert_eq!(cfg.socket_name(), DEFAULT_SOCKET_NAME);
    }

    #[test]
    fn relay_only_needs_a_destination() {
        let err = RelayConfig::resolve(args(&["relay", "-"]), env(&[])).unwrap_err();
        assert_eq!(err, ConfigError::MissingDestination);
    }

    #[test]
    fn worker_gets_generated_socket_path() {
        let cfg = RelayConfig::resolve(
            args(&["relay", "my-app", "--port", "0"]),
            env(&[(SOCKET_NAME_VAR, "Listeners")]),
        )
        .unwrap();

        let expected = fallback_socket_path(std::process::id());
        let expected = expected.to_string_lossy().into_owned();
        assert_eq!(cfg.destination(), &Destination::unix(expected.clone()));

        let worker = cfg.worker().expect("worker configured");
        assert_eq!(worker.program, "my-app");
        assert_eq!(worker.args, args(&["--port", "0"]));
        assert!(worker.env.contains(&(SOCKET_NAME_VAR.to_string(), "Listeners".to_string())));
        assert!(worker.env.contains(&(SOCKET_PATH_VAR.to_string(), expected)));
    }

    #[test]
    fn configured_path_is_not_re_exported() {
        let cfg = RelayConfig::resolve(
            args(&["relay", "my-app"]),
            env(&[(SOCKET_PATH_VAR, "/run/app.sock")]),
        )
        .unwrap();

        let worker = cfg.worker().unwrap();
        assert!(worker.env.iter().all(|(k, _)| k != SOCKET_PATH_VAR));
    }

    #[test]
    fn fallback_path_carries_pid() {
        let path = fallback_socket_path(4242);
        assert!(path.ends_with("launch_socket_server.sock-4242"));
    }
}
