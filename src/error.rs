use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SlurmError {
    #[error("Failed to connect SSH session or execute SSH command: {0}")]
    SshError(#[from] openssh::Error),
    #[error("Failed to execute local command: {0}")]
    LocalCommandError(#[from] std::io::Error),
    #[error("Scheduler command '{command}' exited with status {exit_code}: {stderr}")]
    SchedulerCommandError {
        command: String,
        exit_code: i32,
        stderr: String,
    },
    #[error("Malformed scheduler record{}: {reason}", on_line(.line))]
    ParseError {
        line: Option<usize>,
        reason: String,
    },
    #[error("Failed to parse timestamp '{0}'")]
    DateParseError(String),
    #[error("Invalid job id '{0}'")]
    InvalidJobIdError(String),
    #[error("Job {0} not found in queue or accounting")]
    JobNotFound(String),
    #[error("Job {job_id} still queued after {waited:?}")]
    PollTimeout { job_id: String, waited: Duration },
    #[error("Polling job {0} was cancelled")]
    Cancelled(String),
    #[error("Invalid job spec: {0}")]
    InvalidJobSpec(String),
    #[error("Failed to load job spec file: {0}")]
    JobSpecFile(#[from] serde_yaml::Error),
}

impl SlurmError {
    pub(crate) fn parse(line: usize, reason: impl Into<String>) -> Self {
        Self::ParseError {
            line: Some(line),
            reason: reason.into(),
        }
    }

    /// A malformed record that is not tied to an output line.
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::ParseError {
            line: None,
            reason: reason.into(),
        }
    }
}

fn on_line(line: &Option<usize>) -> String {
    line.map(|line| format!(" on line {}", line))
        .unwrap_or_default()
}
