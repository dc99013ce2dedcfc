//! Command transports.
//!
//! A `Session` runs one shell command line and hands back what it printed.
//! Implementations make no promise about concurrent use; share one across
//! tasks only behind your own serialization.

use std::process::Output;

use async_trait::async_trait;
use openssh::{KnownHosts, Session as SSHSession};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::command::shell_quote;
use crate::error::SlurmError;

/// Captured result of one executed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Turns a non-zero exit into `SchedulerCommandError`.
    pub fn check(self, command: &str) -> Result<Self, SlurmError> {
        if self.exit_code == 0 {
            return Ok(self);
        }
        warn!(command, exit_code = self.exit_code, "scheduler command failed");
        Err(SlurmError::SchedulerCommandError {
            command: command.to_string(),
            exit_code: self.exit_code,
            stderr: self.stderr.trim().to_string(),
        })
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            // Killed by a signal; there is no code to report.
            exit_code: output.status.code().unwrap_or(-1),
        }
    }
}

#[async_trait]
pub trait Session {
    async fn execute(&self, command: &str) -> Result<CommandOutput, SlurmError>;
}

/// Runs commands on a remote login node over a multiplexed SSH connection.
pub struct SshSession {
    destination: String,
    session: SSHSession,
}

impl SshSession {
    pub async fn connect(destination: &str) -> Result<Self, SlurmError> {
        let session = match SSHSession::connect_mux(destination, KnownHosts::Add).await {
            Ok(session) => session,
            Err(e) => {
                warn!(destination, error = ?e, "failed to connect to host");
                return Err(e.into());
            }
        };
        info!(destination, "connected to host");
        Ok(Self {
            destination: destination.to_string(),
            session,
        })
    }

    pub async fn close(self) {
        info!(destination = %self.destination, "terminating connection");
        if let Err(e) = self.session.close().await {
            warn!(destination = %self.destination, error = %e, "error while terminating");
        }
    }
}

#[async_trait]
impl Session for SshSession {
    async fn execute(&self, command: &str) -> Result<CommandOutput, SlurmError> {
        let output = self
            .session
            .command("sh")
            .arg("-c")
            .raw_arg(shell_quote(command))
            .output()
            .await?;
        let output = CommandOutput::from(output);
        debug!(
            destination = %self.destination,
            command,
            exit_code = output.exit_code,
            "ssh command finished"
        );
        Ok(output)
    }
}

/// Runs commands on this machine, for use directly on a login node.
#[derive(Debug, Default, Clone)]
pub struct LocalSession;

impl LocalSession {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Session for LocalSession {
    async fn execute(&self, command: &str) -> Result<CommandOutput, SlurmError> {
        let output = Command::new("sh").arg("-c").arg(command).output().await?;
        let output = CommandOutput::from(output);
        debug!(command, exit_code = output.exit_code, "local command finished");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_passes_zero_exit() {
        let output = CommandOutput::new("ok\n", "", 0);
        assert_eq!(output.clone().check("true").unwrap(), output);
    }

    #[test]
    fn test_check_carries_stderr() {
        let output = CommandOutput::new("", "sbatch: error: invalid partition\n", 1);
        match output.check("sbatch job.sh") {
            Err(SlurmError::SchedulerCommandError {
                command,
                exit_code,
                stderr,
            }) => {
                assert_eq!(command, "sbatch job.sh");
                assert_eq!(exit_code, 1);
                assert_eq!(stderr, "sbatch: error: invalid partition");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_session_captures_streams() {
        let session = LocalSession::new();
        let output = session
            .execute("echo out; echo err 1>&2; exit 3")
            .await
            .unwrap();
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.exit_code, 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_session_keeps_pipes_in_command() {
        let session = LocalSession::new();
        let output = session.execute("printf 'a|b\\n'").await.unwrap();
        assert_eq!(output.stdout, "a|b\n");
    }
}
