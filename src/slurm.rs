//! Lookup, submission and polling on top of a `Session`.
//!
//! The queue (`squeue`) is authoritative while a job is pending or running.
//! Once a job leaves it, accounting (`sacct`) is the only place left to look.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::command::{self, Filter, ACCOUNTING_FIELDS, QUEUE_FIELDS};
use crate::error::SlurmError;
use crate::job::{Job, JobKind};
use crate::jobspec::JobSpec;
use crate::reconcile::{accounting_jobs, queue_jobs, LeaderFields, ReconcileOptions};
use crate::record::{parse_records, Record};
use crate::session::{CommandOutput, Session};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// How `Slurm::poll_to_completion` waits.
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Sleep between queue queries.
    pub interval: Duration,
    /// Give up with `PollTimeout` once this much time has passed.
    pub timeout: Option<Duration>,
    /// Cancelling this token aborts the poll with `Cancelled`.
    pub cancel: CancellationToken,
}

impl PollOptions {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

/// Client for one Slurm cluster reached through `session`.
///
/// Every method issues its commands one after another and awaits each; the
/// session is never used concurrently by a single call.
pub struct Slurm {
    session: Arc<dyn Session + Send + Sync>,
    user: Option<String>,
    reconcile: ReconcileOptions,
    allocations_only: bool,
    poll: PollOptions,
}

impl Slurm {
    pub fn new<S>(session: S) -> Self
    where
        S: Session + Send + Sync + 'static,
    {
        Self::from_shared(Arc::new(session))
    }

    pub fn from_shared(session: Arc<dyn Session + Send + Sync>) -> Self {
        Self {
            session,
            user: None,
            reconcile: ReconcileOptions::default(),
            allocations_only: true,
            poll: PollOptions::default(),
        }
    }

    /// User whose jobs are listed when a query names neither a job nor a user.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_reconcile(mut self, reconcile: ReconcileOptions) -> Self {
        self.reconcile = reconcile;
        self
    }

    /// Whether accounting queries hide job step sub-records. On by default.
    pub fn with_allocations_only(mut self, allocations_only: bool) -> Self {
        self.allocations_only = allocations_only;
        self
    }

    /// Interval used by `submit` when asked to wait.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll.interval = interval;
        self
    }

    /// Interval, timeout and cancellation used by `submit` when asked to wait.
    pub fn with_poll_options(mut self, options: PollOptions) -> Self {
        self.poll = options;
        self
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, SlurmError> {
        debug!(command, "dispatching scheduler command");
        self.session.execute(command).await?.check(command)
    }

    fn filter<'a>(&'a self, job_id: Option<&'a str>, user: Option<&'a str>) -> Filter<'a> {
        let user = match (job_id, user) {
            (_, Some(user)) => Some(user),
            (None, None) => self.user.as_deref(),
            (Some(_), None) => None,
        };
        Filter { job_id, user }
    }

    async fn queue_records(&self, filter: Filter<'_>) -> Result<Vec<Record>, SlurmError> {
        let output = self.run(&command::squeue(filter)).await?;
        parse_records(&output.stdout, QUEUE_FIELDS)
    }

    async fn accounting_records(&self, filter: Filter<'_>) -> Result<Vec<Record>, SlurmError> {
        let output = self
            .run(&command::sacct(filter, self.allocations_only))
            .await?;
        parse_records(&output.stdout, ACCOUNTING_FIELDS)
    }

    /// Jobs in the queue view, heterogeneous components grouped.
    pub async fn queue(
        &self,
        job_id: Option<&str>,
        user: Option<&str>,
    ) -> Result<Vec<Job>, SlurmError> {
        let records = self.queue_records(self.filter(job_id, user)).await?;
        queue_jobs(&records, &self.reconcile)
    }

    /// Jobs in the accounting view, one per row.
    pub async fn accounting(
        &self,
        job_id: Option<&str>,
        user: Option<&str>,
    ) -> Result<Vec<Job>, SlurmError> {
        let records = self.accounting_records(self.filter(job_id, user)).await?;
        accounting_jobs(&records)
    }

    /// Everything currently queued for the default user.
    pub async fn queued(&self) -> Result<Vec<Job>, SlurmError> {
        self.queue(None, None).await
    }

    /// Everything accounting reports for the default user.
    pub async fn accounted(&self) -> Result<Vec<Job>, SlurmError> {
        self.accounting(None, None).await
    }

    /// Queue first; accounting only when the queue has nothing.
    ///
    /// A job visible in both is reported from the queue alone.
    pub async fn find(
        &self,
        job_id: Option<&str>,
        user: Option<&str>,
    ) -> Result<Vec<Job>, SlurmError> {
        let queued = self.queue(job_id, user).await?;
        if !queued.is_empty() {
            return Ok(queued);
        }
        self.accounting(job_id, user).await
    }

    pub async fn get(&self, job_id: &str, raise_not_found: bool) -> Result<Option<Job>, SlurmError> {
        match self.find(Some(job_id), None).await?.into_iter().next() {
            Some(job) => Ok(Some(job)),
            None if raise_not_found => Err(SlurmError::JobNotFound(job_id.to_string())),
            None => Ok(None),
        }
    }

    /// Submit `spec` and return the job as the scheduler now reports it.
    ///
    /// With `wait`, polls it to completion with this client's poll options
    /// and returns the final snapshot. Their timeout and cancellation token
    /// apply to the wait.
    pub async fn submit(&self, spec: &JobSpec, wait: bool) -> Result<Job, SlurmError> {
        spec.validate()?;
        let output = self.run(&command::sbatch(spec)).await?;
        let job_id = output
            .stdout
            .split_whitespace()
            .last()
            .ok_or_else(|| SlurmError::malformed("sbatch printed no job id"))?;
        info!(job_id, exec = spec.exec(), "submitted batch job");

        let mut job = self
            .get(job_id, true)
            .await?
            .ok_or_else(|| SlurmError::JobNotFound(job_id.to_string()))?;
        if wait {
            self.poll_to_completion(&mut job, &self.poll).await?;
        }
        Ok(job)
    }

    pub async fn cancel(&self, job_id: &str) -> Result<(), SlurmError> {
        self.run(&command::scancel(job_id)).await?;
        info!(job_id, "cancelled job");
        Ok(())
    }

    /// Re-read `job` and overwrite its state and end time.
    ///
    /// Returns whether the job was found.
    pub async fn refresh(&self, job: &mut Job, raise_not_found: bool) -> Result<bool, SlurmError> {
        let found = self.find(Some(job.job_id()), None).await?;
        match pick(&found, job, self.reconcile.leader_fields) {
            Some(snapshot) => {
                job.update_from(snapshot);
                Ok(true)
            }
            None if raise_not_found => Err(SlurmError::JobNotFound(job.job_id().to_string())),
            None => Ok(false),
        }
    }

    /// Wait until `job` leaves the queue, then record its final state.
    ///
    /// The queue is queried every `options.interval`. After the job is gone
    /// from it, accounting is queried once.
    pub async fn poll_to_completion(
        &self,
        job: &mut Job,
        options: &PollOptions,
    ) -> Result<(), SlurmError> {
        let job_id = job.job_id().to_string();
        let started = Instant::now();
        let deadline = options.timeout.map(|timeout| started + timeout);

        loop {
            if options.cancel.is_cancelled() {
                return Err(SlurmError::Cancelled(job_id));
            }
            let records = self.queue_records(Filter::job(&job_id)).await?;
            if records.is_empty() {
                break;
            }
            debug!(job_id = %job_id, components = records.len(), "job still queued");

            let mut wake = Instant::now() + options.interval;
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(SlurmError::PollTimeout {
                        job_id,
                        waited: started.elapsed(),
                    });
                }
                wake = wake.min(deadline);
            }
            tokio::select! {
                _ = sleep_until(wake) => {}
                _ = options.cancel.cancelled() => return Err(SlurmError::Cancelled(job_id)),
            }
        }

        let records = self.accounting_records(Filter::job(&job_id)).await?;
        let jobs = accounting_jobs(&records)?;
        let snapshot = pick(&jobs, job, self.reconcile.leader_fields)
            .ok_or_else(|| SlurmError::JobNotFound(job_id.clone()))?;
        job.update_from(snapshot);
        info!(job_id = %job_id, state = %job.state(), "job left the queue");
        Ok(())
    }
}

/// The entry in `jobs` that stands for `job`, if any.
///
/// A heterogeneous leader takes an already grouped leader entry when there is
/// one, else a component row chosen by `leader_fields` the way the queue
/// reconciler snapshots leaders. Any other job needs an exact id match.
fn pick<'a>(jobs: &'a [Job], job: &Job, leader_fields: LeaderFields) -> Option<&'a Job> {
    if job.kind() != JobKind::Heterogeneous {
        return jobs.iter().find(|candidate| candidate.job_id() == job.job_id());
    }
    let components: Vec<&Job> = jobs
        .iter()
        .filter(|candidate| candidate.job_leader_id() == job.job_leader_id())
        .collect();
    if let Some(leader) = components
        .iter()
        .copied()
        .find(|candidate| candidate.kind() == JobKind::Heterogeneous)
    {
        return Some(leader);
    }
    let first = components.first().copied();
    match leader_fields {
        LeaderFields::FirstSeen => first,
        LeaderFields::LeaderComponent => components
            .iter()
            .copied()
            .find(|candidate| candidate.heterogeneous_index() == Some(0))
            .or(first),
    }
}
