// src/store/memory.rs

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::errors::{ClusterdagError, Result};
use crate::model::{
    ClusterId, ClusterRecord, ComponentRecord, HostRecord, JobId, JobRecord, Page, PageRequest,
    ServiceRecord, StageId, StageRecord, StateBatch, TaskId, TaskRecord,
};
use crate::store::Store;
use crate::types::{HealthStatus, JobState};

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    jobs: BTreeMap<JobId, JobRecord>,
    stages: BTreeMap<StageId, StageRecord>,
    tasks: BTreeMap<TaskId, TaskRecord>,
    clusters: BTreeMap<ClusterId, ClusterRecord>,
    hosts: BTreeMap<u64, HostRecord>,
    services: BTreeMap<u64, ServiceRecord>,
    components: BTreeMap<u64, ComponentRecord>,
}

impl Inner {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process store. All records live behind one mutex, which also makes
/// [`Store::update_states`] atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| ClusterdagError::Persistence("memory store lock poisoned".to_string()))
    }
}

fn missing(kind: &str, id: u64) -> ClusterdagError {
    ClusterdagError::Persistence(format!("{kind} {id} does not exist"))
}

impl Store for MemoryStore {
    fn insert_job(&self, mut job: JobRecord) -> Result<JobId> {
        let mut inner = self.lock()?;
        job.id = inner.next_id();
        let id = job.id;
        inner.jobs.insert(id, job);
        Ok(id)
    }

    fn insert_stage(&self, mut stage: StageRecord) -> Result<StageId> {
        let mut inner = self.lock()?;
        if !inner.jobs.contains_key(&stage.job_id) {
            return Err(missing("job", stage.job_id));
        }
        stage.id = inner.next_id();
        let id = stage.id;
        inner.stages.insert(id, stage);
        Ok(id)
    }

    fn insert_task(&self, mut task: TaskRecord) -> Result<TaskId> {
        let mut inner = self.lock()?;
        if !inner.stages.contains_key(&task.stage_id) {
            return Err(missing("stage", task.stage_id));
        }
        task.id = inner.next_id();
        let id = task.id;
        inner.tasks.insert(id, task);
        Ok(id)
    }

    fn delete_job(&self, job_id: JobId) -> Result<()> {
        let mut inner = self.lock()?;
        inner.tasks.retain(|_, t| t.job_id != job_id);
        inner.stages.retain(|_, s| s.job_id != job_id);
        inner.jobs.remove(&job_id);
        Ok(())
    }

    fn job(&self, id: JobId) -> Result<Option<JobRecord>> {
        Ok(self.lock()?.jobs.get(&id).cloned())
    }

    fn stage(&self, id: StageId) -> Result<Option<StageRecord>> {
        Ok(self.lock()?.stages.get(&id).cloned())
    }

    fn task(&self, id: TaskId) -> Result<Option<TaskRecord>> {
        Ok(self.lock()?.tasks.get(&id).cloned())
    }

    fn stages_of_job(&self, job_id: JobId) -> Result<Vec<StageRecord>> {
        let inner = self.lock()?;
        let mut stages: Vec<StageRecord> = inner
            .stages
            .values()
            .filter(|s| s.job_id == job_id)
            .cloned()
            .collect();
        stages.sort_by_key(|s| s.order);
        Ok(stages)
    }

    fn tasks_of_job(&self, job_id: JobId) -> Result<Vec<TaskRecord>> {
        let inner = self.lock()?;
        Ok(inner
            .tasks
            .values()
            .filter(|t| t.job_id == job_id)
            .cloned()
            .collect())
    }

    fn set_job_state(&self, id: JobId, state: JobState) -> Result<()> {
        let mut inner = self.lock()?;
        let job = inner.jobs.get_mut(&id).ok_or_else(|| missing("job", id))?;
        job.state = state;
        Ok(())
    }

    fn set_stage_state(&self, id: StageId, state: JobState) -> Result<()> {
        let mut inner = self.lock()?;
        let stage = inner.stages.get_mut(&id).ok_or_else(|| missing("stage", id))?;
        stage.state = state;
        Ok(())
    }

    fn set_task_state(&self, id: TaskId, state: JobState) -> Result<()> {
        let mut inner = self.lock()?;
        let task = inner.tasks.get_mut(&id).ok_or_else(|| missing("task", id))?;
        task.state = state;
        Ok(())
    }

    fn update_states(&self, batch: &StateBatch) -> Result<()> {
        let mut inner = self.lock()?;

        // Check everything first so a bad id leaves the store untouched.
        for (id, _) in &batch.jobs {
            if !inner.jobs.contains_key(id) {
                return Err(missing("job", *id));
            }
        }
        for (id, _) in &batch.stages {
            if !inner.stages.contains_key(id) {
                return Err(missing("stage", *id));
            }
        }
        for (id, _) in &batch.tasks {
            if !inner.tasks.contains_key(id) {
                return Err(missing("task", *id));
            }
        }

        for (id, state) in &batch.tasks {
            if let Some(t) = inner.tasks.get_mut(id) {
                t.state = *state;
            }
        }
        for (id, state) in &batch.stages {
            if let Some(s) = inner.stages.get_mut(id) {
                s.state = *state;
            }
        }
        for (id, state) in &batch.jobs {
            if let Some(j) = inner.jobs.get_mut(id) {
                j.state = *state;
            }
        }
        Ok(())
    }

    fn bump_retry_count(&self, job_id: JobId) -> Result<u32> {
        let mut inner = self.lock()?;
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| missing("job", job_id))?;
        job.retry_count += 1;
        Ok(job.retry_count)
    }

    fn link_job_to_cluster(&self, job_id: JobId, cluster_id: ClusterId) -> Result<()> {
        let mut inner = self.lock()?;
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| missing("job", job_id))?;
        job.cluster_id = Some(cluster_id);

        for stage in inner.stages.values_mut().filter(|s| s.job_id == job_id) {
            stage.cluster_id = Some(cluster_id);
        }
        for task in inner.tasks.values_mut().filter(|t| t.job_id == job_id) {
            task.cluster_id = Some(cluster_id);
        }
        Ok(())
    }

    fn list_jobs(
        &self,
        cluster_id: Option<ClusterId>,
        page: PageRequest,
    ) -> Result<Page<JobRecord>> {
        let inner = self.lock()?;
        let matching: Vec<&JobRecord> = inner
            .jobs
            .values()
            .rev()
            .filter(|j| j.cluster_id == cluster_id)
            .collect();

        let page_num = page.page_num.max(1);
        let page_size = page.page_size.max(1);
        let items = matching
            .iter()
            .skip((page_num - 1) * page_size)
            .take(page_size)
            .map(|j| (*j).clone())
            .collect();

        Ok(Page {
            items,
            total: matching.len(),
            page_num,
            page_size,
        })
    }

    fn insert_cluster(&self, mut cluster: ClusterRecord) -> Result<ClusterId> {
        let mut inner = self.lock()?;
        if inner.clusters.values().any(|c| c.name == cluster.name) {
            return Err(ClusterdagError::Persistence(format!(
                "cluster '{}' already exists",
                cluster.name
            )));
        }
        cluster.id = inner.next_id();
        let id = cluster.id;
        inner.clusters.insert(id, cluster);
        Ok(id)
    }

    fn cluster(&self, id: ClusterId) -> Result<Option<ClusterRecord>> {
        Ok(self.lock()?.clusters.get(&id).cloned())
    }

    fn cluster_by_name(&self, name: &str) -> Result<Option<ClusterRecord>> {
        Ok(self
            .lock()?
            .clusters
            .values()
            .find(|c| c.name == name)
            .cloned())
    }

    fn upsert_host(&self, mut host: HostRecord) -> Result<u64> {
        let mut inner = self.lock()?;
        if let Some(existing) = inner
            .hosts
            .values()
            .find(|h| h.cluster_id == host.cluster_id && h.hostname == host.hostname)
        {
            return Ok(existing.id);
        }
        host.id = inner.next_id();
        let id = host.id;
        inner.hosts.insert(id, host);
        Ok(id)
    }

    fn hosts_of_cluster(&self, cluster_id: ClusterId) -> Result<Vec<HostRecord>> {
        Ok(self
            .lock()?
            .hosts
            .values()
            .filter(|h| h.cluster_id == cluster_id)
            .cloned()
            .collect())
    }

    fn upsert_service(&self, mut service: ServiceRecord) -> Result<u64> {
        let mut inner = self.lock()?;
        if let Some(existing) = inner
            .services
            .values()
            .find(|s| s.cluster_id == service.cluster_id && s.name == service.name)
        {
            return Ok(existing.id);
        }
        service.id = inner.next_id();
        let id = service.id;
        inner.services.insert(id, service);
        Ok(id)
    }

    fn services_of_cluster(&self, cluster_id: ClusterId) -> Result<Vec<ServiceRecord>> {
        Ok(self
            .lock()?
            .services
            .values()
            .filter(|s| s.cluster_id == cluster_id)
            .cloned()
            .collect())
    }

    fn set_service_status(
        &self,
        cluster_id: ClusterId,
        name: &str,
        status: HealthStatus,
    ) -> Result<bool> {
        let mut inner = self.lock()?;
        match inner
            .services
            .values_mut()
            .find(|s| s.cluster_id == cluster_id && s.name == name)
        {
            Some(s) => {
                s.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn set_service_restart_required(
        &self,
        cluster_id: ClusterId,
        name: &str,
        restart_required: bool,
    ) -> Result<bool> {
        let mut inner = self.lock()?;
        match inner
            .services
            .values_mut()
            .find(|s| s.cluster_id == cluster_id && s.name == name)
        {
            Some(s) => {
                s.restart_required = restart_required;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn upsert_component(&self, mut component: ComponentRecord) -> Result<u64> {
        let mut inner = self.lock()?;
        if let Some(existing) = inner.components.values().find(|c| {
            c.cluster_id == component.cluster_id
                && c.name == component.name
                && c.hostname == component.hostname
        }) {
            return Ok(existing.id);
        }
        component.id = inner.next_id();
        let id = component.id;
        inner.components.insert(id, component);
        Ok(id)
    }

    fn components_of_cluster(&self, cluster_id: ClusterId) -> Result<Vec<ComponentRecord>> {
        Ok(self
            .lock()?
            .components
            .values()
            .filter(|c| c.cluster_id == cluster_id)
            .cloned()
            .collect())
    }

    fn set_component_installed(
        &self,
        cluster_id: ClusterId,
        name: &str,
        hostname: &str,
        installed: bool,
    ) -> Result<bool> {
        let mut inner = self.lock()?;
        match inner.components.values_mut().find(|c| {
            c.cluster_id == cluster_id && c.name == name && c.hostname == hostname
        }) {
            Some(c) => {
                c.installed = installed;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn set_component_status(
        &self,
        cluster_id: ClusterId,
        name: &str,
        hostname: &str,
        status: HealthStatus,
    ) -> Result<bool> {
        let mut inner = self.lock()?;
        match inner.components.values_mut().find(|c| {
            c.cluster_id == cluster_id && c.name == name && c.hostname == hostname
        }) {
            Some(c) => {
                c.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
