// src/engine/core.rs

//! Pure state-transition rules.
//!
//! Everything here works on snapshots and returns the changes to apply, so
//! the rules can be tested without Tokio, a store, or an agent. The async
//! runner (`engine::runtime`) applies the results.

use crate::errors::{ClusterdagError, Result};
use crate::model::{JobSnapshot, StateBatch};
use crate::types::{Command, HealthStatus, JobState};

/// Changes to apply once a stage failed: every stage still `PENDING` and all
/// of its tasks become `CANCELED`, and the job becomes `FAILED`.
///
/// Stages that already started keep their state.
pub fn cascade_cancel(snapshot: &JobSnapshot) -> StateBatch {
    let mut batch = StateBatch::default();

    for stage in snapshot
        .stages
        .iter()
        .filter(|s| s.state == JobState::Pending)
    {
        batch.stages.push((stage.id, JobState::Canceled));
        for task in snapshot.tasks_of(stage.id) {
            batch.tasks.push((task.id, JobState::Canceled));
        }
    }

    batch.jobs.push((snapshot.job.id, JobState::Failed));
    batch
}

/// Aggregate state of a parent from its children's states.
///
/// - any `FAILED` -> `FAILED`
/// - all `SUCCESSFUL` (or no children) -> `SUCCESSFUL`
/// - all `PENDING` -> `PENDING`
/// - all `CANCELED` -> `CANCELED`
/// - anything else is still `PROCESSING`
pub fn derive_state<I>(children: I) -> JobState
where
    I: IntoIterator<Item = JobState>,
{
    let states: Vec<JobState> = children.into_iter().collect();

    if states.contains(&JobState::Failed) {
        return JobState::Failed;
    }
    for uniform in [JobState::Successful, JobState::Pending, JobState::Canceled] {
        if states.iter().all(|&s| s == uniform) {
            return uniform;
        }
    }
    JobState::Processing
}

/// Reset a `FAILED` job for another run: every task, every stage and the
/// job go back to `PENDING`. Stage order and host targeting are untouched.
pub fn retry_reset(snapshot: &JobSnapshot) -> Result<StateBatch> {
    if snapshot.job.state != JobState::Failed {
        return Err(ClusterdagError::NotRetryable {
            job_id: snapshot.job.id,
            state: snapshot.job.state,
        });
    }

    Ok(StateBatch {
        jobs: vec![(snapshot.job.id, JobState::Pending)],
        stages: snapshot
            .stages
            .iter()
            .map(|s| (s.id, JobState::Pending))
            .collect(),
        tasks: snapshot
            .tasks
            .iter()
            .map(|t| (t.id, JobState::Pending))
            .collect(),
    })
}

/// Change to a component record after one of its tasks finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComponentUpdate {
    pub installed: Option<bool>,
    pub status: Option<HealthStatus>,
}

impl ComponentUpdate {
    pub fn is_empty(&self) -> bool {
        self.installed.is_none() && self.status.is_none()
    }
}

/// How a finished task changes its component's recorded state.
pub fn component_update(command: Command, success: bool) -> ComponentUpdate {
    match (command, success) {
        (Command::Add, true) => ComponentUpdate {
            installed: Some(true),
            status: None,
        },
        (Command::Start | Command::Check, true) => ComponentUpdate {
            installed: None,
            status: Some(HealthStatus::Healthy),
        },
        (Command::Start | Command::Check, false) => ComponentUpdate {
            installed: None,
            status: Some(HealthStatus::Unhealthy),
        },
        (Command::Stop, true) => ComponentUpdate {
            installed: None,
            status: Some(HealthStatus::Unhealthy),
        },
        (Command::Stop, false) => ComponentUpdate {
            installed: None,
            status: Some(HealthStatus::Unknown),
        },
        _ => ComponentUpdate::default(),
    }
}
