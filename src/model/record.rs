// src/model/record.rs

//! Persisted records.
//!
//! Children refer to their parents by id only; relationships are resolved
//! through the store.

use serde::{Deserialize, Serialize};

use crate::types::{Command, HealthStatus, JobState};

pub type JobId = u64;
pub type StageId = u64;
pub type TaskId = u64;
pub type ClusterId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub name: String,
    /// `CommandContext` as JSON.
    pub context: String,
    pub state: JobState,
    pub cluster_id: Option<ClusterId>,
    /// Incremented on each retry.
    pub retry_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub id: StageId,
    pub job_id: JobId,
    pub cluster_id: Option<ClusterId>,
    pub name: String,
    /// 1-based position inside the job.
    pub order: u32,
    pub service_name: Option<String>,
    pub component_name: Option<String>,
    /// `StageContext` as JSON.
    pub context: String,
    pub state: JobState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub job_id: JobId,
    pub stage_id: StageId,
    pub cluster_id: Option<ClusterId>,
    pub name: String,
    pub hostname: String,
    pub command: Command,
    pub custom_command: Option<String>,
    pub service_name: String,
    pub component_name: String,
    pub service_user: String,
    /// `TaskContext` as JSON.
    pub context: String,
    pub state: JobState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub id: ClusterId,
    pub name: String,
    pub display_name: String,
    pub user_group: String,
    pub root_dir: String,
    pub stack_name: String,
    pub stack_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    pub id: u64,
    pub cluster_id: ClusterId,
    pub hostname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: u64,
    pub cluster_id: ClusterId,
    pub name: String,
    pub display_name: String,
    pub user: String,
    pub status: HealthStatus,
    pub restart_required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub id: u64,
    pub cluster_id: ClusterId,
    pub service_name: String,
    pub name: String,
    pub hostname: String,
    pub installed: bool,
    pub status: HealthStatus,
}

/// A job with all of its stages (by order) and tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub job: JobRecord,
    pub stages: Vec<StageRecord>,
    pub tasks: Vec<TaskRecord>,
}

impl JobSnapshot {
    pub fn tasks_of(&self, stage_id: StageId) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.iter().filter(move |t| t.stage_id == stage_id)
    }
}

/// State changes written together in one store call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateBatch {
    pub jobs: Vec<(JobId, JobState)>,
    pub stages: Vec<(StageId, JobState)>,
    pub tasks: Vec<(TaskId, JobState)>,
}

impl StateBatch {
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty() && self.stages.is_empty() && self.tasks.is_empty()
    }
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page_num: usize,
    pub page_size: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page_num: 1,
            page_size: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page_num: usize,
    pub page_size: usize,
}
