// src/service.rs

//! Job-level operations: plan, submit, inspect, list, retry and follow task
//! logs. This is the surface the CLI (or any API layer) drives.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::agent::{AgentClient, TaskLogHub, TaskLogStream};
use crate::config::ConfigFile;
use crate::engine::{EngineOptions, JobRunner};
use crate::errors::{ClusterdagError, Result};
use crate::model::{ClusterId, CommandContext, JobId, JobRecord, JobSnapshot, Page, PageRequest, TaskId};
use crate::plan::{persist_plan, JobFactories, JobPlan};
use crate::scheduler::{JobHandle, JobScheduler};
use crate::stack::StackMetadata;
use crate::store::Store;
use crate::types::JobState;

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorOptions {
    pub rpc_timeout: Duration,
    pub max_concurrent_jobs: usize,
    pub log_buffer_lines: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            rpc_timeout: Duration::from_secs(600),
            max_concurrent_jobs: 8,
            log_buffer_lines: 2000,
        }
    }
}

impl From<&ConfigFile> for OrchestratorOptions {
    fn from(cfg: &ConfigFile) -> Self {
        Self {
            rpc_timeout: Duration::from_secs(cfg.config.rpc_timeout_secs),
            max_concurrent_jobs: cfg.config.max_concurrent_jobs,
            log_buffer_lines: cfg.config.log_buffer_lines,
        }
    }
}

/// Returned by [`Orchestrator::submit`].
#[derive(Debug)]
pub struct JobSubmission {
    pub job_id: JobId,
    /// State at submission time.
    pub state: JobState,
    pub handle: JobHandle,
}

/// What a log viewer gets for a task.
#[derive(Debug)]
pub enum TaskLog {
    /// Live output of a running task.
    Stream(TaskLogStream),
    /// Nothing to stream; a message explaining why.
    Notice(String),
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    stack: Arc<StackMetadata>,
    store: Arc<dyn Store>,
    factories: Arc<JobFactories>,
    logs: TaskLogHub,
    scheduler: JobScheduler,
}

impl Orchestrator {
    pub fn new(
        stack: Arc<StackMetadata>,
        store: Arc<dyn Store>,
        agent: Arc<dyn AgentClient>,
        options: OrchestratorOptions,
    ) -> Self {
        let factories = Arc::new(JobFactories::new());
        let logs = TaskLogHub::new(options.log_buffer_lines);
        let runner = JobRunner::new(
            Arc::clone(&stack),
            Arc::clone(&store),
            agent,
            logs.clone(),
            Arc::clone(&factories),
            EngineOptions {
                rpc_timeout: options.rpc_timeout,
            },
        );
        let scheduler = JobScheduler::new(runner, options.max_concurrent_jobs);

        Self {
            stack,
            store,
            factories,
            logs,
            scheduler,
        }
    }

    /// Build stack metadata from a validated config and wire everything up.
    pub fn from_config(
        cfg: &ConfigFile,
        store: Arc<dyn Store>,
        agent: Arc<dyn AgentClient>,
    ) -> Result<Self> {
        let stack = Arc::new(StackMetadata::from_config(&cfg.stack)?);
        Ok(Self::new(stack, store, agent, OrchestratorOptions::from(cfg)))
    }

    pub fn stack(&self) -> &StackMetadata {
        &self.stack
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn logs(&self) -> &TaskLogHub {
        &self.logs
    }

    /// Validate and plan a command without persisting or running anything.
    pub fn plan(&self, command: &CommandContext) -> Result<JobPlan> {
        self.factories
            .create_job(&self.stack, self.store.as_ref(), command)
    }

    /// Plan, persist and start a command. Fails before anything is stored if
    /// the command is unsupported or invalid.
    pub fn submit(&self, command: &CommandContext) -> Result<JobSubmission> {
        let plan = self.plan(command)?;
        let job_id = persist_plan(self.store.as_ref(), &plan)?;
        let handle = self.scheduler.submit(job_id)?;
        info!(job_id, name = %plan.name, "job submitted");
        Ok(JobSubmission {
            job_id,
            state: JobState::Pending,
            handle,
        })
    }

    /// A job with its stages and tasks.
    pub fn job(&self, job_id: JobId) -> Result<JobSnapshot> {
        self.scheduler.runner().snapshot(job_id)
    }

    pub fn list_jobs(
        &self,
        cluster_id: Option<ClusterId>,
        page: PageRequest,
    ) -> Result<Page<JobRecord>> {
        self.store.list_jobs(cluster_id, page)
    }

    /// Start a job that was persisted but not yet run.
    pub fn start(&self, job_id: JobId) -> Result<JobHandle> {
        self.scheduler.submit(job_id)
    }

    /// Whether a worker currently owns the job.
    pub fn is_running(&self, job_id: JobId) -> bool {
        self.scheduler.is_running(job_id)
    }

    /// Retry a `FAILED` job; anything else is rejected as not retryable.
    pub fn retry(&self, job_id: JobId) -> Result<JobHandle> {
        self.scheduler.retry(job_id)
    }

    /// Follow a task's output.
    pub fn task_log(&self, task_id: TaskId) -> Result<TaskLog> {
        let task = self
            .store
            .task(task_id)?
            .ok_or(ClusterdagError::TaskNotFound(task_id))?;

        if matches!(task.state, JobState::Pending | JobState::Canceled) {
            return Ok(TaskLog::Notice(format!(
                "There is no log when task is in status: {}, please reopen the window when status changed",
                task.state.as_str().to_lowercase()
            )));
        }

        Ok(match self.logs.subscribe(task_id) {
            Some(stream) => TaskLog::Stream(stream),
            None => TaskLog::Notice(format!(
                "Task {task_id} is {}; its live log is no longer available",
                task.state.as_str().to_lowercase()
            )),
        })
    }
}
