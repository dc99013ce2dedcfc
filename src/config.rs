//! Configuration for Slurm Relay.
//!
//! Currently holds clap structs for command line arguments and flags.
//! Job specs can additionally come from YAML files (see `JobSpec`).

use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::error::SlurmError;
use crate::jobspec::JobSpec;

#[derive(Parser)]
#[command(version, author, about)]
pub struct Config {
    /// SSH destination of the login node (e.g. `user@cluster`)
    #[arg(long, global = true, conflicts_with = "local")]
    pub host: Option<String>,

    /// Run scheduler commands on this machine instead of over SSH
    #[arg(long, global = true)]
    pub local: bool,

    /// Only list this user's jobs when no job id is given
    #[arg(long, short, global = true)]
    pub user: Option<String>,

    /// Also list heterogeneous components as top-level jobs
    #[arg(long, global = true)]
    pub no_dedup: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Submit a batch script
    Submit {
        /// Script or executable to hand to sbatch (overrides the spec file's)
        exec: Option<String>,

        /// YAML job spec to start from
        #[arg(long)]
        spec: Option<String>,

        /// Extra sbatch flag as `key=value`, or just `key` for a bare flag
        #[arg(long = "arg", short = 'a')]
        args: Vec<String>,

        /// Start only after this job finished successfully
        #[arg(long)]
        after_ok: Vec<String>,

        /// Block until the job leaves the queue
        #[arg(long, short)]
        wait: bool,

        /// Seconds between queue queries while waiting
        #[arg(long, default_value = "10")]
        interval: u64,

        /// Give up waiting after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// List jobs, from the queue if any are queued, else from accounting
    Find {
        /// Restrict to one job id
        #[arg(long, short)]
        job: Option<String>,
    },
    /// Show one job
    Get { job: String },
    /// Cancel jobs
    Cancel {
        #[arg(required = true)]
        jobs: Vec<String>,
    },
    /// Wait for a job to leave the queue and print its final state
    Wait {
        job: String,

        /// Seconds between queue queries
        #[arg(long, default_value = "10")]
        interval: u64,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// List queued jobs
    Queue,
    /// List jobs known to accounting, finished ones included
    History,
}

impl Command {
    /// Assemble the job spec for `Submit` from the spec file and flags.
    pub fn job_spec(&self) -> Result<Option<JobSpec>, SlurmError> {
        let Command::Submit {
            exec,
            spec,
            args,
            after_ok,
            ..
        } = self
        else {
            return Ok(None);
        };
        let mut job = match (spec, exec) {
            (Some(path), _) => JobSpec::from_yaml_file(path)?,
            (None, Some(exec)) => JobSpec::new(exec.as_str()),
            (None, None) => {
                return Err(SlurmError::InvalidJobSpec(
                    "need an executable or --spec".to_string(),
                ))
            }
        };
        if let (Some(_), Some(exec)) = (spec, exec) {
            job = job.with_exec(exec.as_str());
        }
        for arg in args {
            job = match arg.split_once('=') {
                Some((key, value)) => job.arg(key, value),
                None => job.flag(arg.as_str()),
            };
        }
        for id in after_ok {
            job = job.after_ok(id.as_str());
        }
        job.validate()?;
        Ok(Some(job))
    }
}

pub fn seconds(secs: Option<u64>) -> Option<Duration> {
    secs.map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_submit_flags_build_spec() {
        let config = Config::parse_from([
            "srelay",
            "--local",
            "submit",
            "train.sh",
            "-a",
            "nodes=2",
            "-a",
            "exclusive",
            "--after-ok",
            "41",
        ]);
        assert!(config.local);
        let spec = config.command.job_spec().unwrap().unwrap();
        assert_eq!(
            spec,
            JobSpec::new("train.sh").nodes(2).exclusive().after_ok("41")
        );
    }

    #[test]
    fn test_submit_flags_override_spec_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
exec: train.sh
args:
  nodes: 2
  partition: cpu
dependencies:
  - kind: afterok
    job_ids: ["41"]
"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap();
        let config = Config::parse_from([
            "srelay",
            "submit",
            "eval.sh",
            "--spec",
            path,
            "-a",
            "nodes=4",
            "--after-ok",
            "9",
        ]);
        let spec = config.command.job_spec().unwrap().unwrap();
        assert_eq!(
            spec,
            JobSpec::new("eval.sh")
                .nodes(4)
                .partition("cpu")
                .after_ok("41")
                .after_ok("9")
        );
    }

    #[test]
    fn test_spec_file_alone_keeps_its_exec() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "exec: train.sh\nargs:\n  exclusive: ~\n").unwrap();
        let path = file.path().to_str().unwrap();
        let config = Config::parse_from(["srelay", "submit", "--spec", path]);
        let spec = config.command.job_spec().unwrap().unwrap();
        assert_eq!(spec, JobSpec::new("train.sh").exclusive());
    }

    #[test]
    fn test_submit_needs_exec_or_spec() {
        let config = Config::parse_from(["srelay", "submit"]);
        assert!(config.command.job_spec().is_err());
    }

    #[test]
    fn test_other_commands_have_no_spec() {
        let config = Config::parse_from(["srelay", "--host", "login", "get", "42"]);
        assert_eq!(config.host.as_deref(), Some("login"));
        assert!(config.command.job_spec().unwrap().is_none());
    }

    #[test]
    fn test_history_takes_user() {
        let config = Config::parse_from(["srelay", "history", "-u", "alice"]);
        assert!(matches!(config.command, Command::History));
        assert_eq!(config.user.as_deref(), Some("alice"));
    }

    #[test]
    fn test_host_conflicts_with_local() {
        assert!(Config::try_parse_from(["srelay", "--host", "h", "--local", "queue"]).is_err());
    }
}
