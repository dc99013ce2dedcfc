//! Slurm Relay: submit, reconcile and poll Slurm jobs over SSH or locally.

// Serde helper module.
mod serde;
// Command line arguments and configuration.
pub mod config;
// Scheduler command lines.
pub mod command;
// How to parse scheduler output.
pub mod record;
// How to parse and represent jobs.
pub mod job;
// Queue and accounting reconciliation.
pub mod reconcile;
// Batch job specifications.
pub mod jobspec;
// Command transports.
pub mod session;
// Lookup, submission and polling.
pub mod slurm;
// Error handling.
pub mod error;

pub use config::{Command, Config};
pub use error::SlurmError;
pub use job::{Job, JobId, JobKind, JobState};
pub use jobspec::{Dependency, DependencyKind, JobSpec};
pub use reconcile::{LeaderFields, ReconcileOptions};
pub use record::{parse_records, parse_timestamp, Record};
pub use session::{CommandOutput, LocalSession, Session, SshSession};
pub use slurm::{PollOptions, Slurm};
