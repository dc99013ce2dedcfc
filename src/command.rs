//! Scheduler command lines.
//!
//! Every builder returns a single string meant for `sh -c`. Values that came
//! from callers are quoted with `shell_quote`.

use itertools::Itertools;

use crate::jobspec::JobSpec;

/// Fields requested from `squeue`, in output order.
pub const QUEUE_FIELDS: &[&str] = &["ACCOUNT", "JOBID", "STATE", "EXEC_HOST", "END_TIME"];
/// Fields requested from `sacct`, in output order.
pub const ACCOUNTING_FIELDS: &[&str] = &["ACCOUNT", "JOBID", "STATE", "END_TIME"];

/// `%i` rather than `%A` so heterogeneous components print as `leader+offset`.
const SQUEUE_FORMAT: &str = "%a|%i|%T|%B|%e";
const SACCT_FORMAT: &str = "Account,JobID,State,End";

/// Quote `value` for a POSIX shell unless it is made only of safe characters.
pub fn shell_quote(value: &str) -> String {
    if value.is_empty() {
        return "''".to_string();
    }
    if value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:@+=,%".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Filter shared by the queue and accounting queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Filter<'a> {
    pub job_id: Option<&'a str>,
    pub user: Option<&'a str>,
}

impl<'a> Filter<'a> {
    pub fn job(job_id: &'a str) -> Self {
        Self {
            job_id: Some(job_id),
            user: None,
        }
    }

    pub fn user(mut self, user: Option<&'a str>) -> Self {
        self.user = user;
        self
    }
}

pub fn squeue(filter: Filter<'_>) -> String {
    let mut args = vec!["squeue".to_string()];
    if let Some(user) = filter.user {
        args.push(format!("-u {}", shell_quote(user)));
    }
    if let Some(job_id) = filter.job_id {
        args.push(format!("-j {}", shell_quote(job_id)));
    }
    args.push(format!("-o \"{}\"", SQUEUE_FORMAT));
    args.push("-h".to_string());
    args.join(" ")
}

/// `allocations_only` adds `-X`, which hides job step sub-records.
pub fn sacct(filter: Filter<'_>, allocations_only: bool) -> String {
    let mut args = vec![
        "sacct".to_string(),
        "-n".to_string(),
        "-P".to_string(),
        format!("--format {}", SACCT_FORMAT),
    ];
    if allocations_only {
        args.push("-X".to_string());
    }
    if let Some(user) = filter.user {
        args.push(format!("-u {}", shell_quote(user)));
    }
    if let Some(job_id) = filter.job_id {
        args.push(format!("-j {}", shell_quote(job_id)));
    }
    args.join(" ")
}

/// Options go before the script; anything after it is passed to the script.
pub fn sbatch(spec: &JobSpec) -> String {
    let flags = spec
        .construct_args()
        .into_iter()
        .map(|(key, value)| match value {
            Some(value) if !value.is_empty() => format!("--{}={}", key, shell_quote(&value)),
            _ => format!("--{}", key),
        });
    std::iter::once("sbatch".to_string())
        .chain(flags)
        .chain(std::iter::once(shell_quote(spec.exec())))
        .join(" ")
}

pub fn scancel(job_id: &str) -> String {
    format!("scancel {}", shell_quote(job_id))
}
