use std::sync::{Mutex, MutexGuard};

use clusterdag::errors::{ClusterdagError, Result};
use clusterdag::model::{
    ClusterId, ClusterRecord, ComponentRecord, HostRecord, JobId, JobRecord, Page, PageRequest,
    ServiceRecord, StageId, StageRecord, StateBatch, TaskId, TaskRecord,
};
use clusterdag::store::{MemoryStore, Store};
use clusterdag::types::{HealthStatus, JobState};

#[derive(Debug, Default)]
struct Faults {
    task_state: Option<JobState>,
    link_job: bool,
    /// Task inserts still allowed before they start failing.
    task_inserts_left: Option<usize>,
}

/// `MemoryStore` that rejects chosen writes with a persistence error.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    faults: Mutex<Faults>,
}

fn injected(what: String) -> ClusterdagError {
    ClusterdagError::Persistence(format!("injected failure {what}"))
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap()
    }

    /// Reject every `set_task_state(_, state)` from now on.
    pub fn fail_task_state(&self, state: JobState) {
        self.faults().task_state = Some(state);
    }

    /// Reject `link_job_to_cluster`.
    pub fn fail_link_job(&self) {
        self.faults().link_job = true;
    }

    /// Accept `n` more task inserts, then reject the rest.
    pub fn fail_task_inserts_after(&self, n: usize) {
        self.faults().task_inserts_left = Some(n);
    }

    pub fn heal(&self) {
        *self.faults() = Faults::default();
    }
}

impl Store for FlakyStore {
    fn insert_job(&self, job: JobRecord) -> Result<JobId> {
        self.inner.insert_job(job)
    }
    fn insert_stage(&self, stage: StageRecord) -> Result<StageId> {
        self.inner.insert_stage(stage)
    }
    fn insert_task(&self, task: TaskRecord) -> Result<TaskId> {
        if let Some(left) = self.faults().task_inserts_left.as_mut() {
            if *left == 0 {
                return Err(injected(format!("inserting task '{}'", task.name)));
            }
            *left -= 1;
        }
        self.inner.insert_task(task)
    }
    fn delete_job(&self, job_id: JobId) -> Result<()> {
        self.inner.delete_job(job_id)
    }

    fn job(&self, id: JobId) -> Result<Option<JobRecord>> {
        self.inner.job(id)
    }
    fn stage(&self, id: StageId) -> Result<Option<StageRecord>> {
        self.inner.stage(id)
    }
    fn task(&self, id: TaskId) -> Result<Option<TaskRecord>> {
        self.inner.task(id)
    }
    fn stages_of_job(&self, job_id: JobId) -> Result<Vec<StageRecord>> {
        self.inner.stages_of_job(job_id)
    }
    fn tasks_of_job(&self, job_id: JobId) -> Result<Vec<TaskRecord>> {
        self.inner.tasks_of_job(job_id)
    }

    fn set_job_state(&self, id: JobId, state: JobState) -> Result<()> {
        self.inner.set_job_state(id, state)
    }
    fn set_stage_state(&self, id: StageId, state: JobState) -> Result<()> {
        self.inner.set_stage_state(id, state)
    }
    fn set_task_state(&self, id: TaskId, state: JobState) -> Result<()> {
        if self.faults().task_state == Some(state) {
            return Err(injected(format!("writing task {id} as {state}")));
        }
        self.inner.set_task_state(id, state)
    }

    fn update_states(&self, batch: &StateBatch) -> Result<()> {
        self.inner.update_states(batch)
    }
    fn bump_retry_count(&self, job_id: JobId) -> Result<u32> {
        self.inner.bump_retry_count(job_id)
    }
    fn link_job_to_cluster(&self, job_id: JobId, cluster_id: ClusterId) -> Result<()> {
        if self.faults().link_job {
            return Err(injected(format!("linking job {job_id} to cluster {cluster_id}")));
        }
        self.inner.link_job_to_cluster(job_id, cluster_id)
    }
    fn list_jobs(&self, cluster_id: Option<ClusterId>, page: PageRequest) -> Result<Page<JobRecord>> {
        self.inner.list_jobs(cluster_id, page)
    }

    fn insert_cluster(&self, cluster: ClusterRecord) -> Result<ClusterId> {
        self.inner.insert_cluster(cluster)
    }
    fn cluster(&self, id: ClusterId) -> Result<Option<ClusterRecord>> {
        self.inner.cluster(id)
    }
    fn cluster_by_name(&self, name: &str) -> Result<Option<ClusterRecord>> {
        self.inner.cluster_by_name(name)
    }
    fn upsert_host(&self, host: HostRecord) -> Result<u64> {
        self.inner.upsert_host(host)
    }
    fn hosts_of_cluster(&self, cluster_id: ClusterId) -> Result<Vec<HostRecord>> {
        self.inner.hosts_of_cluster(cluster_id)
    }

    fn upsert_service(&self, service: ServiceRecord) -> Result<u64> {
        self.inner.upsert_service(service)
    }
    fn services_of_cluster(&self, cluster_id: ClusterId) -> Result<Vec<ServiceRecord>> {
        self.inner.services_of_cluster(cluster_id)
    }
    fn set_service_status(&self, cluster_id: ClusterId, name: &str, status: HealthStatus) -> Result<bool> {
        self.inner.set_service_status(cluster_id, name, status)
    }
    fn set_service_restart_required(
        &self,
        cluster_id: ClusterId,
        name: &str,
        restart_required: bool,
    ) -> Result<bool> {
        self.inner
            .set_service_restart_required(cluster_id, name, restart_required)
    }

    fn upsert_component(&self, component: ComponentRecord) -> Result<u64> {
        self.inner.upsert_component(component)
    }
    fn components_of_cluster(&self, cluster_id: ClusterId) -> Result<Vec<ComponentRecord>> {
        self.inner.components_of_cluster(cluster_id)
    }
    fn set_component_installed(
        &self,
        cluster_id: ClusterId,
        name: &str,
        hostname: &str,
        installed: bool,
    ) -> Result<bool> {
        self.inner
            .set_component_installed(cluster_id, name, hostname, installed)
    }
    fn set_component_status(
        &self,
        cluster_id: ClusterId,
        name: &str,
        hostname: &str,
        status: HealthStatus,
    ) -> Result<bool> {
        self.inner
            .set_component_status(cluster_id, name, hostname, status)
    }
}
