// src/store/mod.rs

//! Persistence boundary.
//!
//! The engine only needs simple record operations plus one batched state
//! update used for cascading cancellation. [`MemoryStore`] is the in-process
//! implementation; anything durable plugs in behind the same trait.
//!
//! Insert methods ignore the `id` of the record they are given and return
//! the id the store assigned.

use std::fmt;

use crate::errors::Result;
use crate::model::{
    ClusterId, ClusterRecord, ComponentRecord, HostRecord, JobId, JobRecord, Page, PageRequest,
    ServiceRecord, StageId, StageRecord, StateBatch, TaskId, TaskRecord,
};
use crate::types::{HealthStatus, JobState};

pub mod memory;

pub use memory::MemoryStore;

pub trait Store: Send + Sync + fmt::Debug {
    fn insert_job(&self, job: JobRecord) -> Result<JobId>;
    fn insert_stage(&self, stage: StageRecord) -> Result<StageId>;
    fn insert_task(&self, task: TaskRecord) -> Result<TaskId>;

    /// Remove a job with all of its stages and tasks. Missing ids are fine.
    fn delete_job(&self, job_id: JobId) -> Result<()>;

    fn job(&self, id: JobId) -> Result<Option<JobRecord>>;
    fn stage(&self, id: StageId) -> Result<Option<StageRecord>>;
    fn task(&self, id: TaskId) -> Result<Option<TaskRecord>>;

    /// Stages of a job sorted by `order`.
    fn stages_of_job(&self, job_id: JobId) -> Result<Vec<StageRecord>>;
    /// Tasks of a job sorted by id.
    fn tasks_of_job(&self, job_id: JobId) -> Result<Vec<TaskRecord>>;

    fn set_job_state(&self, id: JobId, state: JobState) -> Result<()>;
    fn set_stage_state(&self, id: StageId, state: JobState) -> Result<()>;
    fn set_task_state(&self, id: TaskId, state: JobState) -> Result<()>;

    /// Apply every change in `batch` or none of them.
    fn update_states(&self, batch: &StateBatch) -> Result<()>;

    /// Increment and return the job's retry counter.
    fn bump_retry_count(&self, job_id: JobId) -> Result<u32>;

    /// Point the job and all of its stages and tasks at `cluster_id`.
    fn link_job_to_cluster(&self, job_id: JobId, cluster_id: ClusterId) -> Result<()>;

    /// Jobs owned by `cluster_id` (or by no cluster when `None`), newest first.
    fn list_jobs(&self, cluster_id: Option<ClusterId>, page: PageRequest)
    -> Result<Page<JobRecord>>;

    fn insert_cluster(&self, cluster: ClusterRecord) -> Result<ClusterId>;
    fn cluster(&self, id: ClusterId) -> Result<Option<ClusterRecord>>;
    fn cluster_by_name(&self, name: &str) -> Result<Option<ClusterRecord>>;

    /// Insert a host unless `(cluster_id, hostname)` already exists.
    fn upsert_host(&self, host: HostRecord) -> Result<u64>;
    fn hosts_of_cluster(&self, cluster_id: ClusterId) -> Result<Vec<HostRecord>>;

    /// Insert a service unless `(cluster_id, name)` already exists.
    fn upsert_service(&self, service: ServiceRecord) -> Result<u64>;
    fn services_of_cluster(&self, cluster_id: ClusterId) -> Result<Vec<ServiceRecord>>;
    fn set_service_status(
        &self,
        cluster_id: ClusterId,
        name: &str,
        status: HealthStatus,
    ) -> Result<bool>;
    fn set_service_restart_required(
        &self,
        cluster_id: ClusterId,
        name: &str,
        restart_required: bool,
    ) -> Result<bool>;

    /// Insert a component unless `(cluster_id, name, hostname)` already exists.
    fn upsert_component(&self, component: ComponentRecord) -> Result<u64>;
    fn components_of_cluster(&self, cluster_id: ClusterId) -> Result<Vec<ComponentRecord>>;
    fn set_component_installed(
        &self,
        cluster_id: ClusterId,
        name: &str,
        hostname: &str,
        installed: bool,
    ) -> Result<bool>;
    fn set_component_status(
        &self,
        cluster_id: ClusterId,
        name: &str,
        hostname: &str,
        status: HealthStatus,
    ) -> Result<bool>;
}
