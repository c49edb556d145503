// src/plan/hooks.rs

//! Per-kind hooks run by the engine around job execution.
//!
//! `before_run` hooks create inventory records. They run on every attempt
//! and are idempotent: records left behind by an earlier attempt, complete
//! or not, are reused rather than created twice.

use tracing::{debug, info};

use crate::errors::{ClusterdagError, Result};
use crate::model::{
    ClusterId, CommandContext, ComponentRecord, HostRecord, JobRecord, ServiceRecord,
};
use crate::plan::{placeholder_cluster, JobKind};
use crate::stack::StackMetadata;
use crate::store::Store;
use crate::types::HealthStatus;

#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub stack: &'a StackMetadata,
    pub store: &'a dyn Store,
    pub job: &'a JobRecord,
    pub command: &'a CommandContext,
}

impl HookContext<'_> {
    fn cluster_id(&self) -> Result<ClusterId> {
        self.job
            .cluster_id
            .or(self.command.cluster_id)
            .ok_or_else(|| {
                ClusterdagError::Persistence(format!("job {} has no cluster", self.job.id))
            })
    }

    fn is_retry(&self) -> bool {
        self.job.retry_count > 0
    }

    /// The cluster an earlier attempt of this job created, if any.
    fn cluster_from_earlier_attempt(&self, name: &str) -> Result<Option<ClusterId>> {
        if let Some(id) = self.job.cluster_id {
            return Ok(Some(id));
        }
        if !self.is_retry() {
            return Ok(None);
        }
        // Created but never linked: the first attempt failed in between.
        Ok(self.store.cluster_by_name(name)?.map(|c| c.id))
    }
}

impl JobKind {
    pub fn before_run(self, ctx: &HookContext<'_>) -> Result<()> {
        debug!(job_id = ctx.job.id, kind = ?self, retry = ctx.is_retry(), "preparing job records");
        match self {
            JobKind::ClusterAdd => create_cluster(ctx),
            JobKind::HostAdd => register_hosts(ctx),
            JobKind::ServiceAdd => register_services(ctx),
            JobKind::ComponentAdd => register_components(ctx),
            _ => Ok(()),
        }
    }

    pub fn on_success(self, ctx: &HookContext<'_>) -> Result<()> {
        match self {
            JobKind::ServiceAdd => {
                let cluster_id = ctx.cluster_id()?;
                for sc in ctx.command.service_commands.iter().filter(|s| !s.installed) {
                    ctx.store
                        .set_service_status(cluster_id, &sc.service_name, HealthStatus::Healthy)?;
                }
                Ok(())
            }
            JobKind::ServiceRestart | JobKind::ServiceConfigure => {
                let cluster_id = ctx.cluster_id()?;
                for sc in &ctx.command.service_commands {
                    ctx.store
                        .set_service_restart_required(cluster_id, &sc.service_name, false)?;
                    ctx.store
                        .set_service_status(cluster_id, &sc.service_name, HealthStatus::Healthy)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn on_failure(self, ctx: &HookContext<'_>) -> Result<()> {
        match self {
            JobKind::ServiceRestart | JobKind::ServiceConfigure => {
                let cluster_id = ctx.cluster_id()?;
                for sc in &ctx.command.service_commands {
                    ctx.store.set_service_status(
                        cluster_id,
                        &sc.service_name,
                        HealthStatus::Unhealthy,
                    )?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn create_cluster(ctx: &HookContext<'_>) -> Result<()> {
    let cc = ctx.command.cluster_command.as_ref().ok_or_else(|| {
        ClusterdagError::InvalidCommand("cluster add requires a cluster_command".to_string())
    })?;

    let cluster_id = match ctx.cluster_from_earlier_attempt(&cc.name)? {
        Some(id) => id,
        None => ctx.store.insert_cluster(placeholder_cluster(ctx.stack, cc))?,
    };
    for host in &cc.hosts {
        ctx.store.upsert_host(HostRecord {
            id: 0,
            cluster_id,
            hostname: host.hostname.clone(),
        })?;
    }
    ctx.store.link_job_to_cluster(ctx.job.id, cluster_id)?;

    info!(job_id = ctx.job.id, cluster_id, cluster = %cc.name, "cluster created");
    Ok(())
}

fn register_hosts(ctx: &HookContext<'_>) -> Result<()> {
    let cluster_id = ctx.cluster_id()?;
    for hostname in ctx.command.hostnames() {
        ctx.store.upsert_host(HostRecord {
            id: 0,
            cluster_id,
            hostname,
        })?;
    }
    Ok(())
}

fn register_services(ctx: &HookContext<'_>) -> Result<()> {
    let cluster_id = ctx.cluster_id()?;
    for sc in ctx.command.service_commands.iter().filter(|s| !s.installed) {
        let Some(service) = ctx.stack.service(&sc.service_name) else {
            continue;
        };
        ctx.store.upsert_service(ServiceRecord {
            id: 0,
            cluster_id,
            name: service.name.clone(),
            display_name: service.display_name.clone(),
            user: service.user.clone(),
            status: HealthStatus::Unhealthy,
            restart_required: false,
        })?;
        for ch in &sc.component_hosts {
            upsert_components(ctx, cluster_id, &service.name, &ch.component_name, &ch.hostnames)?;
        }
    }
    Ok(())
}

fn register_components(ctx: &HookContext<'_>) -> Result<()> {
    let cluster_id = ctx.cluster_id()?;
    for ch in &ctx.command.component_commands {
        let Some(service) = ctx.stack.service_of(&ch.component_name) else {
            continue;
        };
        upsert_components(ctx, cluster_id, &service.name, &ch.component_name, &ch.hostnames)?;
        ctx.store
            .set_service_restart_required(cluster_id, &service.name, true)?;
    }
    Ok(())
}

fn upsert_components(
    ctx: &HookContext<'_>,
    cluster_id: ClusterId,
    service_name: &str,
    component_name: &str,
    hostnames: &[String],
) -> Result<()> {
    for hostname in hostnames {
        ctx.store.upsert_component(ComponentRecord {
            id: 0,
            cluster_id,
            service_name: service_name.to_string(),
            name: component_name.to_lowercase(),
            hostname: hostname.clone(),
            installed: false,
            status: HealthStatus::Unknown,
        })?;
    }
    Ok(())
}
