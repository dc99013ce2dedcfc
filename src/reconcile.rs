//! Turning scheduler records into jobs.
//!
//! The queue prints one row per heterogeneous component; `queue_jobs` folds
//! those rows back into one leader per group. Accounting rows are already one
//! per job and map straight through.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::debug;

use crate::error::SlurmError;
use crate::job::{Job, JobId, JobKind};
use crate::record::Record;

/// Where a heterogeneous leader takes its account, state and end time from.
///
/// Components of one group can disagree while the group is mid-transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeaderFields {
    /// The first component row seen for the group.
    #[default]
    FirstSeen,
    /// The component with offset 0 once it is seen, else the first seen.
    LeaderComponent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Only emit the leader for a heterogeneous group. When false, every
    /// component is also emitted top-level at its own position.
    pub dedup: bool,
    pub leader_fields: LeaderFields,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            dedup: true,
            leader_fields: LeaderFields::FirstSeen,
        }
    }
}

enum Slot {
    Job(Job),
    Leader(String),
}

/// Group queue records into single jobs and heterogeneous leaders.
///
/// Output is in first-seen order; a leader sits where its first component was.
/// Each leader's children are ordered by offset.
pub fn queue_jobs(records: &[Record], options: &ReconcileOptions) -> Result<Vec<Job>, SlurmError> {
    let mut slots = Vec::with_capacity(records.len());
    let mut leaders: HashMap<String, Job> = HashMap::new();

    for record in records {
        let id: JobId = record.require("JOBID")?.parse()?;
        let Some(index) = id.heterogeneous_index else {
            slots.push(Slot::Job(Job::from_record(record, &id, JobKind::Single)?));
            continue;
        };

        let component = Job::from_record(record, &id, JobKind::Single)?;
        let leader = match leaders.entry(id.leader_id.clone()) {
            Entry::Occupied(entry) => {
                let leader = entry.into_mut();
                if index == 0 && options.leader_fields == LeaderFields::LeaderComponent {
                    leader.resnapshot(record)?;
                }
                leader
            }
            Entry::Vacant(entry) => {
                slots.push(Slot::Leader(id.leader_id.clone()));
                entry.insert(Job::from_record(
                    record,
                    &JobId::leader(&id.leader_id),
                    JobKind::Heterogeneous,
                )?)
            }
        };
        if !options.dedup {
            slots.push(Slot::Job(component.clone()));
        }
        leader.push_child(component);
    }

    let jobs: Vec<Job> = slots
        .into_iter()
        .filter_map(|slot| match slot {
            Slot::Job(job) => Some(job),
            Slot::Leader(leader_id) => leaders.remove(&leader_id).map(|mut leader| {
                leader.sort_children();
                leader
            }),
        })
        .collect();
    debug!(records = records.len(), jobs = jobs.len(), "reconciled queue records");
    Ok(jobs)
}

/// Map accounting records to jobs, one per record, in order.
pub fn accounting_jobs(records: &[Record]) -> Result<Vec<Job>, SlurmError> {
    records
        .iter()
        .map(|record| {
            let id: JobId = record.require("JOBID")?.parse()?;
            Job::from_record(record, &id, JobKind::Single)
        })
        .collect()
}
