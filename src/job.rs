//! Jobs as reported by the scheduler.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;

use crate::error::SlurmError;
use crate::record::{format_timestamp, parse_timestamp, Record};

/// A decoded `JOBID` column.
///
/// Heterogeneous components print as `<leader>+<offset>`; the component's
/// own job id is `leader + offset`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId {
    pub job_id: String,
    pub leader_id: String,
    pub heterogeneous_index: Option<u32>,
}

impl JobId {
    /// Id of the synthetic entry that groups a heterogeneous job.
    pub fn leader(leader_id: &str) -> Self {
        Self {
            job_id: leader_id.to_string(),
            leader_id: leader_id.to_string(),
            heterogeneous_index: None,
        }
    }

}

impl FromStr for JobId {
    type Err = SlurmError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || SlurmError::InvalidJobIdError(raw.to_string());
        match raw.split_once('+') {
            None => Ok(Self::leader(raw)),
            Some((leader, index)) => {
                if !is_number(leader) || !is_number(index) {
                    return Err(invalid());
                }
                let leader_num: u64 = leader.parse().map_err(|_| invalid())?;
                let index: u32 = index.parse().map_err(|_| invalid())?;
                let job_id = leader_num
                    .checked_add(u64::from(index))
                    .ok_or_else(invalid)?;
                Ok(Self {
                    job_id: job_id.to_string(),
                    leader_id: leader.to_string(),
                    heterogeneous_index: Some(index),
                })
            }
        }
    }
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Single,
    Heterogeneous,
}

/// Job state as reported by Slurm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    BootFail,
    /// sacct appends `by <uid>` when a user cancelled the job.
    Cancelled { by: Option<String> },
    Completed,
    Completing,
    Configuring,
    Deadline,
    Failed,
    NodeFail,
    OutOfMemory,
    Pending,
    Preempted,
    Requeued,
    Resizing,
    Running,
    Suspended,
    Timeout,
    Unknown(String),
}

impl From<&str> for JobState {
    fn from(s: &str) -> Self {
        match s {
            "BOOT_FAIL" => JobState::BootFail,
            "CANCELLED" => JobState::Cancelled { by: None },
            "COMPLETED" => JobState::Completed,
            "COMPLETING" => JobState::Completing,
            "CONFIGURING" => JobState::Configuring,
            "DEADLINE" => JobState::Deadline,
            "FAILED" => JobState::Failed,
            "NODE_FAIL" => JobState::NodeFail,
            "OUT_OF_MEMORY" => JobState::OutOfMemory,
            "PENDING" => JobState::Pending,
            "PREEMPTED" => JobState::Preempted,
            "REQUEUED" => JobState::Requeued,
            "RESIZING" => JobState::Resizing,
            "RUNNING" => JobState::Running,
            "SUSPENDED" => JobState::Suspended,
            "TIMEOUT" => JobState::Timeout,
            other => match other.strip_prefix("CANCELLED by ") {
                Some(by) if !by.is_empty() => JobState::Cancelled {
                    by: Some(by.to_string()),
                },
                _ => JobState::Unknown(other.to_string()),
            },
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            JobState::BootFail => "BOOT_FAIL",
            JobState::Cancelled { by: Some(by) } => return write!(f, "CANCELLED by {}", by),
            JobState::Cancelled { by: None } => "CANCELLED",
            JobState::Completed => "COMPLETED",
            JobState::Completing => "COMPLETING",
            JobState::Configuring => "CONFIGURING",
            JobState::Deadline => "DEADLINE",
            JobState::Failed => "FAILED",
            JobState::NodeFail => "NODE_FAIL",
            JobState::OutOfMemory => "OUT_OF_MEMORY",
            JobState::Pending => "PENDING",
            JobState::Preempted => "PREEMPTED",
            JobState::Requeued => "REQUEUED",
            JobState::Resizing => "RESIZING",
            JobState::Running => "RUNNING",
            JobState::Suspended => "SUSPENDED",
            JobState::Timeout => "TIMEOUT",
            JobState::Unknown(raw) => raw.as_str(),
        };
        f.write_str(name)
    }
}

impl JobState {
    /// Whether no further transition can happen.
    ///
    /// sacct reports a user cancellation as `CANCELLED by <uid>`. That parses
    /// to `Cancelled { by: Some(uid) }` and is terminal like plain
    /// `CANCELLED`; any other unrecognized text stays `Unknown` and is not.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::BootFail
                | JobState::Cancelled { .. }
                | JobState::Completed
                | JobState::Deadline
                | JobState::Failed
                | JobState::NodeFail
                | JobState::OutOfMemory
                | JobState::Preempted
                | JobState::Timeout
        )
    }
}

/// One job, or one component of a heterogeneous job, at the time it was read.
///
/// A `Heterogeneous` job is a synthetic leader whose `children` are its
/// components, ordered by `heterogeneous_index`. Jobs are snapshots; use
/// `Slurm::refresh` to update one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    job_id: String,
    job_leader_id: String,
    kind: JobKind,
    heterogeneous_index: Option<u32>,
    account: String,
    partition: Option<String>,
    exec_host: Option<String>,
    state: JobState,
    end_time: Option<NaiveDateTime>,
    children: Vec<Job>,
}

impl Job {
    /// Build a job from one queue or accounting record.
    ///
    /// `id` decides the job's identity; the record's own `JOBID` is not read,
    /// so a heterogeneous leader can be built from a component's record.
    pub fn from_record(record: &Record, id: &JobId, kind: JobKind) -> Result<Self, SlurmError> {
        let heterogeneous_index = match kind {
            JobKind::Single => id.heterogeneous_index,
            JobKind::Heterogeneous => None,
        };
        Ok(Self {
            job_id: id.job_id.clone(),
            job_leader_id: id.leader_id.clone(),
            kind,
            heterogeneous_index,
            account: record.require("ACCOUNT")?.to_string(),
            partition: record.get("PARTITION").map(str::to_string),
            exec_host: record.get("EXEC_HOST").map(str::to_string),
            state: JobState::from(record.require("STATE")?),
            end_time: parse_timestamp(record.require("END_TIME")?)?,
            children: Vec::new(),
        })
    }

    /// Render back into the fields it was built from.
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("ACCOUNT", self.account.as_str());
        record.insert("JOBID", self.raw_job_id());
        record.insert("STATE", self.state.to_string());
        if let Some(host) = &self.exec_host {
            record.insert("EXEC_HOST", host.as_str());
        }
        record.insert("END_TIME", format_timestamp(self.end_time.as_ref()));
        if let Some(partition) = &self.partition {
            record.insert("PARTITION", partition.as_str());
        }
        record
    }

    /// The job id as the scheduler prints it (`leader+offset` for components).
    pub fn raw_job_id(&self) -> String {
        match self.heterogeneous_index {
            Some(index) => format!("{}+{}", self.job_leader_id, index),
            None => self.job_id.clone(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn job_leader_id(&self) -> &str {
        &self.job_leader_id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn heterogeneous_index(&self) -> Option<u32> {
        self.heterogeneous_index
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn partition(&self) -> Option<&str> {
        self.partition.as_deref()
    }

    pub fn exec_host(&self) -> Option<&str> {
        self.exec_host.as_deref()
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn end_time(&self) -> Option<&NaiveDateTime> {
        self.end_time.as_ref()
    }

    pub fn children(&self) -> &[Job] {
        &self.children
    }

    pub fn running(&self) -> bool {
        self.state == JobState::Running
    }

    pub fn pending(&self) -> bool {
        self.state == JobState::Pending
    }

    pub fn cancelled(&self) -> bool {
        matches!(self.state, JobState::Cancelled { .. })
    }

    pub fn failed(&self) -> bool {
        self.state == JobState::Failed
    }

    pub fn completed(&self) -> bool {
        self.state == JobState::Completed
    }

    pub fn terminated(&self) -> bool {
        self.state.is_terminal()
    }

    pub(crate) fn push_child(&mut self, child: Job) {
        self.children.push(child);
    }

    pub(crate) fn sort_children(&mut self) {
        self.children.sort_by_key(|child| child.heterogeneous_index);
    }

    /// Overwrite the fields that change over a job's life with `snapshot`'s.
    pub(crate) fn update_from(&mut self, snapshot: &Job) {
        self.state = snapshot.state.clone();
        self.end_time = snapshot.end_time;
    }

    /// Take the leader-level fields from another component record.
    pub(crate) fn resnapshot(&mut self, record: &Record) -> Result<(), SlurmError> {
        self.account = record.require("ACCOUNT")?.to_string();
        self.partition = record.get("PARTITION").map(str::to_string);
        self.exec_host = record.get("EXEC_HOST").map(str::to_string);
        self.state = JobState::from(record.require("STATE")?);
        self.end_time = parse_timestamp(record.require("END_TIME")?)?;
        Ok(())
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} [{}] {}", self.job_id, self.account, self.state)?;
        if let Some(index) = self.heterogeneous_index {
            write!(f, " (component {} of {})", index, self.job_leader_id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::QUEUE_FIELDS;
    use crate::record::parse_records;

    fn queue_record(line: &str) -> Record {
        parse_records(line, QUEUE_FIELDS).unwrap().remove(0)
    }

    #[test]
    fn test_plain_job_id() {
        for raw in ["1", "12345", "77_3", "abc"] {
            let id: JobId = raw.parse().unwrap();
            assert_eq!(id.job_id, raw);
            assert_eq!(id.leader_id, raw);
            assert_eq!(id.heterogeneous_index, None);
        }
    }

    #[test]
    fn test_heterogeneous_job_id() {
        for (leader, index) in [(101u64, 0u32), (101, 1), (5000, 7), (0, 0)] {
            let id: JobId = format!("{}+{}", leader, index).parse().unwrap();
            assert_eq!(id.leader_id, leader.to_string());
            assert_eq!(id.heterogeneous_index, Some(index));
            assert_eq!(id.job_id, (leader + u64::from(index)).to_string());
        }
    }

    #[test]
    fn test_invalid_heterogeneous_job_id() {
        for raw in ["abc+1", "101+x", "101+", "+1", "101+-1", "101++1", "101+1+2"] {
            assert!(
                matches!(raw.parse::<JobId>(), Err(SlurmError::InvalidJobIdError(_))),
                "{} should be rejected",
                raw
            );
        }
        let overflow = format!("{}+1", u64::MAX);
        assert!(overflow.parse::<JobId>().is_err());
    }

    #[test]
    fn test_terminal_states_are_exact() {
        let terminal = [
            "BOOT_FAIL",
            "CANCELLED",
            "COMPLETED",
            "DEADLINE",
            "FAILED",
            "NODE_FAIL",
            "OUT_OF_MEMORY",
            "PREEMPTED",
            "TIMEOUT",
        ];
        for state in terminal {
            assert!(JobState::from(state).is_terminal(), "{}", state);
        }
        for state in [
            "PENDING",
            "RUNNING",
            "COMPLETING",
            "SUSPENDED",
            "REQUEUED",
            "CONFIGURING",
            "DEALINE",
            "completed",
            "",
            "SOMETHING_NEW",
        ] {
            assert!(!JobState::from(state).is_terminal(), "{}", state);
        }
    }

    #[test]
    fn test_state_display_round_trips() {
        for raw in ["RUNNING", "OUT_OF_MEMORY", "CANCELLED by 1001", "WEIRD"] {
            assert_eq!(JobState::from(raw).to_string(), raw);
        }
    }

    #[test]
    fn test_cancelled_by_user_is_terminal() {
        let state = JobState::from("CANCELLED by 1001");
        assert_eq!(
            state,
            JobState::Cancelled {
                by: Some("1001".to_string())
            }
        );
        assert!(state.is_terminal());
        // Without a uid it is not a cancellation record at all.
        assert!(!JobState::from("CANCELLED by ").is_terminal());
        assert!(!JobState::from("CANCELLED_BY_1001").is_terminal());
    }

    #[test]
    fn test_predicates() {
        let id = JobId::leader("9");
        let running =
            Job::from_record(&queue_record("p|9|RUNNING|n1|Unknown"), &id, JobKind::Single)
                .unwrap();
        assert!(running.running() && !running.pending() && !running.terminated());

        let pending =
            Job::from_record(&queue_record("p|9|PENDING|n/a|N/A"), &id, JobKind::Single).unwrap();
        assert!(pending.pending() && !pending.terminated());

        let done = Job::from_record(
            &queue_record("p|9|COMPLETED|n1|2024-01-02T03:04:05"),
            &id,
            JobKind::Single,
        )
        .unwrap();
        assert!(done.completed() && done.terminated() && !done.failed() && !done.cancelled());
        assert!(done.end_time().is_some());
    }

    #[test]
    fn test_from_record_round_trip() {
        let line = "physics|101+1|PENDING|n/a|Unknown";
        let record = queue_record(line);
        let id: JobId = record.get("JOBID").unwrap().parse().unwrap();
        let job = Job::from_record(&record, &id, JobKind::Single).unwrap();
        assert_eq!(job.job_id(), "102");
        assert_eq!(job.job_leader_id(), "101");
        assert_eq!(job.heterogeneous_index(), Some(1));
        assert_eq!(job.to_record().to_line(QUEUE_FIELDS), line);
    }

    #[test]
    fn test_from_record_keeps_partition() {
        let mut record = queue_record("physics|5|RUNNING|n1|Unknown");
        record.insert("PARTITION", "gpu");
        let job = Job::from_record(&record, &JobId::leader("5"), JobKind::Single).unwrap();
        assert_eq!(job.partition(), Some("gpu"));
        let back = job.to_record();
        assert_eq!(back.get("ACCOUNT"), Some("physics"));
        assert_eq!(back.get("PARTITION"), Some("gpu"));
        assert_eq!(back.get("STATE"), Some("RUNNING"));
    }

    #[test]
    fn test_from_record_missing_field() {
        let mut record = Record::new();
        record.insert("ACCOUNT", "p");
        record.insert("STATE", "RUNNING");
        let result = Job::from_record(&record, &JobId::leader("1"), JobKind::Single);
        assert!(matches!(result, Err(SlurmError::ParseError { line: None, .. })));
    }

    #[test]
    fn test_from_record_bad_time() {
        let record = queue_record("p|1|RUNNING|n1|soon");
        let result = Job::from_record(&record, &JobId::leader("1"), JobKind::Single);
        assert!(matches!(result, Err(SlurmError::DateParseError(_))));
    }

    #[test]
    fn test_heterogeneous_leader_has_no_index() {
        let record = queue_record("p|101+0|RUNNING|n1|Unknown");
        let job =
            Job::from_record(&record, &JobId::leader("101"), JobKind::Heterogeneous).unwrap();
        assert_eq!(job.kind(), JobKind::Heterogeneous);
        assert_eq!(job.heterogeneous_index(), None);
        assert_eq!(job.job_id(), "101");
    }
}
