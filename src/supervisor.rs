use std::process::Stdio;

use tokio::process::Command;

use crate::activation::{LISTEN_FDNAMES, LISTEN_FDS, LISTEN_PID};
use crate::config::WorkerCommand;
use crate::error::RelayError;
use crate::fault::FaultPolicy;
use crate::{relay_debug, relay_info};

/// Runs the optional worker program and turns its exit into a termination.
pub struct Supervisor {
    worker: WorkerCommand,
    faults: FaultPolicy,
}

impl Supervisor {
    pub fn new(worker: WorkerCommand, faults: FaultPolicy) -> Self {
        Self { worker, faults }
    }

    /// Spawns the worker with inherited stdio and waits for it.
    ///
    /// Exit status zero ends the relay successfully; anything else, including
    /// a failure to start, is fatal.
    pub async fn run(self) {
        match self.spawn_and_wait().await {
            Ok(()) => {
                relay_info!("Program `{}' exited cleanly", self.worker.program);
                self.faults.finish();
            }
            Err(e) => self.faults.report(e),
        }
    }

    async fn spawn_and_wait(&self) -> Result<(), RelayError> {
        let WorkerCommand { program, args, env } = &self.worker;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env_remove(LISTEN_FDS)
            .env_remove(LISTEN_PID)
            .env_remove(LISTEN_FDNAMES)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(|source| RelayError::Spawn {
            program: program.clone(),
            source,
        })?;
        relay_debug!("Started program `{}' (pid {:?})", program, child.id());

        let status = child.wait().await.map_err(|source| RelayError::Wait {
            program: program.clone(),
            source,
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(RelayError::WorkerExit { program: program.clone(), status })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::Termination;

    fn sh(script: &str) -> WorkerCommand {
        WorkerCommand::new("sh", vec!["-c".into(), script.into()])
    }

    #[tokio::test]
    async fn clean_exit_finishes_relay() {
        let (faults, mut rx) = FaultPolicy::channel();
        Supervisor::new(sh("exit 0"), faults).run().await;
        assert!(rx.recv().await.unwrap().is_success());
    }

    #[tokio::test]
    async fn non_zero_exit_is_fatal() {
        let (faults, mut rx) = FaultPolicy::channel();
        Supervisor::new(sh("exit 3"), faults).run().await;

        match rx.recv().await.unwrap() {
            Termination::Failure(RelayError::WorkerExit { status, .. }) => {
                assert_eq!(status.code(), Some(3));
            }
            other => panic!("unexpected termination {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_program_is_fatal() {
        let (faults, mut rx) = FaultPolicy::channel();
        let worker = WorkerCommand::new("/nonexistent/launch-relay-worker", vec![]);
        Supervisor::new(worker, faults).run().await;

        let t = rx.recv().await.unwrap();
        assert!(matches!(t, Termination::Failure(RelayError::Spawn { .. })));
        assert_eq!(t.exit_code(), 1);
    }

    #[tokio::test]
    async fn worker_sees_exported_env_but_not_activation_vars() {
        let (faults, mut rx) = FaultPolicy::channel();
        let worker = sh(r#"[ "$LAUNCH_DAEMON_SOCKET_NAME" = "Web" ] && [ -z "$LISTEN_FDS" ]"#)
            .with_env("LAUNCH_DAEMON_SOCKET_NAME", "Web")
            .with_env(LISTEN_FDS, "2");
        Supervisor::new(worker, faults).run().await;

        assert!(rx.recv().await.unwrap().is_success());
    }
}
