// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::agent::{AgentClient, AgentRequest, TaskLogHub};
use crate::engine::core::{cascade_cancel, component_update};
use crate::errors::{ClusterdagError, Result};
use crate::model::{CommandContext, JobId, JobSnapshot, StageRecord, TaskContext, TaskRecord};
use crate::plan::stages::CLUSTER_SERVICE;
use crate::plan::{CommandIdentifier, HookContext, JobFactories};
use crate::stack::StackMetadata;
use crate::store::Store;
use crate::types::JobState;

/// Engine settings.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Deadline for a single agent call.
    pub rpc_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            rpc_timeout: Duration::from_secs(600),
        }
    }
}

/// Executes persisted jobs.
///
/// Stages run strictly in `order`. The tasks of one stage run concurrently
/// and the stage waits for all of them, even after one failed. The first
/// failed stage ends the job: untouched stages and their tasks are canceled
/// in a single batch.
///
/// Any store error aborts the run with `Err`.
#[derive(Clone)]
pub struct JobRunner {
    stack: Arc<StackMetadata>,
    store: Arc<dyn Store>,
    agent: Arc<dyn AgentClient>,
    logs: TaskLogHub,
    factories: Arc<JobFactories>,
    options: EngineOptions,
}

impl fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRunner")
            .field("store", &self.store)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl JobRunner {
    pub fn new(
        stack: Arc<StackMetadata>,
        store: Arc<dyn Store>,
        agent: Arc<dyn AgentClient>,
        logs: TaskLogHub,
        factories: Arc<JobFactories>,
        options: EngineOptions,
    ) -> Self {
        Self {
            stack,
            store,
            agent,
            logs,
            factories,
            options,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Load a job with its stages and tasks.
    pub fn snapshot(&self, job_id: JobId) -> Result<JobSnapshot> {
        let job = self
            .store
            .job(job_id)?
            .ok_or(ClusterdagError::JobNotFound(job_id))?;
        Ok(JobSnapshot {
            job,
            stages: self.store.stages_of_job(job_id)?,
            tasks: self.store.tasks_of_job(job_id)?,
        })
    }

    /// Run a `PENDING` job to completion and return its final state.
    ///
    /// Any other state is rejected with `JobNotPending` and left untouched;
    /// failed jobs go through `retry`, which resets them first.
    pub async fn run_job(&self, job_id: JobId) -> Result<JobState> {
        let job = self
            .store
            .job(job_id)?
            .ok_or(ClusterdagError::JobNotFound(job_id))?;
        if job.state != JobState::Pending {
            return Err(ClusterdagError::JobNotPending {
                job_id,
                state: job.state,
            });
        }
        ensure_stages_pending(job_id, &self.store.stages_of_job(job_id)?)?;
        let command: CommandContext = serde_json::from_str(&job.context)?;
        let kind = self.factories.lookup(CommandIdentifier::of(&command))?;

        self.store.set_job_state(job_id, JobState::Processing)?;
        info!(job_id, name = %job.name, retry = job.retry_count, "job started");

        let hooks = HookContext {
            stack: &self.stack,
            store: self.store.as_ref(),
            job: &job,
            command: &command,
        };
        if let Err(err) = kind.before_run(&hooks) {
            error!(job_id, error = %err, "job preparation failed");
            self.abandon(job_id);
            return Err(err);
        }

        match self.run_stages(job_id).await {
            Ok(true) => {
                self.store.set_job_state(job_id, JobState::Successful)?;
                let job = self.reload(job_id)?;
                kind.on_success(&HookContext { job: &job, ..hooks })?;
                info!(job_id, "job succeeded");
                Ok(JobState::Successful)
            }
            Ok(false) => {
                let snapshot = self.snapshot(job_id)?;
                let batch = cascade_cancel(&snapshot);
                debug!(
                    job_id,
                    canceled_stages = batch.stages.len(),
                    canceled_tasks = batch.tasks.len(),
                    "canceling remaining work"
                );
                self.store.update_states(&batch)?;
                let job = self.reload(job_id)?;
                kind.on_failure(&HookContext { job: &job, ..hooks })?;
                warn!(job_id, "job failed");
                Ok(JobState::Failed)
            }
            Err(err) => {
                error!(job_id, error = %err, "job run aborted");
                self.abandon(job_id);
                Err(err)
            }
        }
    }

    fn reload(&self, job_id: JobId) -> Result<crate::model::JobRecord> {
        self.store
            .job(job_id)?
            .ok_or(ClusterdagError::JobNotFound(job_id))
    }

    /// Best effort: mark the job failed and cancel what never started.
    fn abandon(&self, job_id: JobId) {
        let result = self
            .snapshot(job_id)
            .and_then(|snapshot| self.store.update_states(&cascade_cancel(&snapshot)));
        if let Err(err) = result {
            error!(job_id, error = %err, "could not record job failure");
        }
    }

    /// `Ok(false)` as soon as one stage fails.
    async fn run_stages(&self, job_id: JobId) -> Result<bool> {
        // Reloaded after hooks so records linked to a new cluster are seen.
        let snapshot = self.snapshot(job_id)?;

        ensure_stages_pending(job_id, &snapshot.stages)?;

        for stage in &snapshot.stages {
            let tasks: Vec<TaskRecord> = snapshot.tasks_of(stage.id).cloned().collect();
            if !self.run_stage(stage, tasks).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn run_stage(&self, stage: &StageRecord, tasks: Vec<TaskRecord>) -> Result<bool> {
        self.store.set_stage_state(stage.id, JobState::Processing)?;
        info!(
            job_id = stage.job_id,
            stage_id = stage.id,
            order = stage.order,
            stage = %stage.name,
            tasks = tasks.len(),
            "stage started"
        );

        let mut set = JoinSet::new();
        for task in tasks {
            let runner = self.clone();
            set.spawn(async move { runner.run_task(task).await });
        }

        let mut succeeded = true;
        let mut fatal: Option<ClusterdagError> = None;
        while let Some(joined) = set.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(join_err) => Err(ClusterdagError::Other(anyhow::anyhow!(
                    "task worker panicked: {join_err}"
                ))),
            };
            match outcome {
                Ok(true) => {}
                Ok(false) => {
                    if succeeded && !set.is_empty() {
                        debug!(
                            stage_id = stage.id,
                            in_flight = set.len(),
                            "task failed; waiting for in-flight siblings"
                        );
                    }
                    succeeded = false;
                }
                Err(err) => {
                    succeeded = false;
                    fatal.get_or_insert(err);
                }
            }
        }

        if let Some(err) = fatal {
            return Err(err);
        }

        let state = if succeeded {
            JobState::Successful
        } else {
            JobState::Failed
        };
        self.store.set_stage_state(stage.id, state)?;
        info!(stage_id = stage.id, stage = %stage.name, state = %state, "stage finished");
        Ok(succeeded)
    }

    /// `Ok(true)` if the agent reported success.
    async fn run_task(&self, task: TaskRecord) -> Result<bool> {
        self.store.set_task_state(task.id, JobState::Processing)?;
        let sink = self.logs.open(task.id);
        sink.line(format!("{} started", task.name));

        let outcome = self.invoke_agent(&task, sink.clone()).await;
        let success = outcome.is_ok();
        match &outcome {
            Ok(message) => {
                sink.line(format!("{} succeeded: {message}", task.name));
                info!(
                    task_id = task.id,
                    hostname = %task.hostname,
                    command = %task.command,
                    "task succeeded"
                );
            }
            Err(err) => {
                sink.line(format!("{} failed: {err}", task.name));
                warn!(
                    job_id = task.job_id,
                    stage_id = task.stage_id,
                    task_id = task.id,
                    hostname = %task.hostname,
                    command = %task.command,
                    error = %err,
                    "task failed"
                );
            }
        }

        let recorded = self.record_task_result(&task, success);
        self.logs.close(task.id);
        recorded?;
        Ok(success)
    }

    async fn invoke_agent(&self, task: &TaskRecord, sink: crate::agent::TaskLogSink) -> Result<String> {
        let fail = |reason: String| ClusterdagError::TaskExecution {
            task_id: task.id,
            hostname: task.hostname.clone(),
            reason,
        };

        let context: TaskContext = serde_json::from_str(&task.context)?;
        let request = AgentRequest {
            task_id: task.id,
            hostname: task.hostname.clone(),
            service_name: task.service_name.clone(),
            component_name: task.component_name.clone(),
            command: task.command,
            custom_command: task.custom_command.clone(),
            context,
        };

        let deadline = self.options.rpc_timeout;
        match timeout(deadline, self.agent.execute(request, sink)).await {
            Ok(Ok(reply)) if reply.is_success() => Ok(reply.message),
            Ok(Ok(reply)) => Err(fail(format!(
                "exit status {}: {}",
                reply.exit_status, reply.message
            ))),
            Ok(Err(err)) => Err(fail(err.to_string())),
            Err(_) => Err(fail(format!(
                "agent did not answer within {}s",
                deadline.as_secs_f64()
            ))),
        }
    }

    fn record_task_result(&self, task: &TaskRecord, success: bool) -> Result<()> {
        let state = if success {
            JobState::Successful
        } else {
            JobState::Failed
        };
        self.store.set_task_state(task.id, state)?;

        let Some(cluster_id) = task.cluster_id else {
            return Ok(());
        };
        if task.service_name == CLUSTER_SERVICE {
            return Ok(());
        }

        let update = component_update(task.command, success);
        if let Some(installed) = update.installed {
            self.store.set_component_installed(
                cluster_id,
                &task.component_name,
                &task.hostname,
                installed,
            )?;
        }
        if let Some(status) = update.status {
            self.store.set_component_status(
                cluster_id,
                &task.component_name,
                &task.hostname,
                status,
            )?;
        }
        Ok(())
    }
}

/// A job only succeeds when all of its stages ran in this attempt.
fn ensure_stages_pending(job_id: JobId, stages: &[StageRecord]) -> Result<()> {
    match stages.iter().find(|s| s.state != JobState::Pending) {
        Some(stage) => Err(ClusterdagError::StageNotPending {
            job_id,
            stage_id: stage.id,
            state: stage.state,
        }),
        None => Ok(()),
    }
}
