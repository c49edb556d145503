// src/plan/mod.rs

//! Command dispatch and job construction.
//!
//! A command is identified by its `(level, command)` pair. The
//! [`JobFactories`] registry maps each pair to a [`JobKind`], and the kind
//! decides which stages to build and which hooks run around execution.
//!
//! Construction is pure with respect to execution: [`JobFactories::create_job`]
//! validates the command and returns an unsaved [`JobPlan`]; [`persist_plan`]
//! writes it to the store. Nothing is persisted when validation or planning
//! fails.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, error, info, warn};

use crate::errors::{ClusterdagError, Result};
use crate::model::{
    ClusterCommand, ClusterRecord, CommandContext, JobId, JobRecord, StageContext, StageRecord,
    TaskContext, TaskRecord,
};
use crate::stack::StackMetadata;
use crate::store::Store;
use crate::types::{Command, CommandLevel, JobState};

pub mod hooks;
pub mod jobs;
pub mod stages;
pub mod validate;

pub use hooks::HookContext;

/// Registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandIdentifier {
    pub level: CommandLevel,
    pub command: Command,
}

impl CommandIdentifier {
    pub fn new(level: CommandLevel, command: Command) -> Self {
        Self { level, command }
    }

    pub fn of(command: &CommandContext) -> Self {
        Self::new(command.command_level, command.command)
    }
}

impl fmt::Display for CommandIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.level, self.command)
    }
}

/// Every job variant the orchestrator knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    ClusterAdd,
    ClusterStart,
    ClusterStop,
    ClusterRestart,
    HostAdd,
    HostStart,
    HostStop,
    HostRestart,
    ServiceAdd,
    ServiceStart,
    ServiceStop,
    ServiceRestart,
    ServiceCheck,
    ServiceConfigure,
    ComponentAdd,
    ComponentStart,
    ComponentStop,
    ComponentRestart,
    ComponentCustom,
}

impl JobKind {
    pub const ALL: [JobKind; 19] = [
        JobKind::ClusterAdd,
        JobKind::ClusterStart,
        JobKind::ClusterStop,
        JobKind::ClusterRestart,
        JobKind::HostAdd,
        JobKind::HostStart,
        JobKind::HostStop,
        JobKind::HostRestart,
        JobKind::ServiceAdd,
        JobKind::ServiceStart,
        JobKind::ServiceStop,
        JobKind::ServiceRestart,
        JobKind::ServiceCheck,
        JobKind::ServiceConfigure,
        JobKind::ComponentAdd,
        JobKind::ComponentStart,
        JobKind::ComponentStop,
        JobKind::ComponentRestart,
        JobKind::ComponentCustom,
    ];

    pub fn identifier(self) -> CommandIdentifier {
        use CommandLevel as L;
        let (level, command) = match self {
            JobKind::ClusterAdd => (L::Cluster, Command::Add),
            JobKind::ClusterStart => (L::Cluster, Command::Start),
            JobKind::ClusterStop => (L::Cluster, Command::Stop),
            JobKind::ClusterRestart => (L::Cluster, Command::Restart),
            JobKind::HostAdd => (L::Host, Command::Add),
            JobKind::HostStart => (L::Host, Command::Start),
            JobKind::HostStop => (L::Host, Command::Stop),
            JobKind::HostRestart => (L::Host, Command::Restart),
            JobKind::ServiceAdd => (L::Service, Command::Add),
            JobKind::ServiceStart => (L::Service, Command::Start),
            JobKind::ServiceStop => (L::Service, Command::Stop),
            JobKind::ServiceRestart => (L::Service, Command::Restart),
            JobKind::ServiceCheck => (L::Service, Command::Check),
            JobKind::ServiceConfigure => (L::Service, Command::Configure),
            JobKind::ComponentAdd => (L::Component, Command::Add),
            JobKind::ComponentStart => (L::Component, Command::Start),
            JobKind::ComponentStop => (L::Component, Command::Stop),
            JobKind::ComponentRestart => (L::Component, Command::Restart),
            JobKind::ComponentCustom => (L::Component, Command::Custom),
        };
        CommandIdentifier::new(level, command)
    }

    /// Human-readable job name.
    pub fn job_name(self) -> &'static str {
        match self {
            JobKind::ClusterAdd => "Add cluster",
            JobKind::ClusterStart => "Start cluster",
            JobKind::ClusterStop => "Stop cluster",
            JobKind::ClusterRestart => "Restart cluster",
            JobKind::HostAdd => "Add hosts",
            JobKind::HostStart => "Start hosts",
            JobKind::HostStop => "Stop hosts",
            JobKind::HostRestart => "Restart hosts",
            JobKind::ServiceAdd => "Add services",
            JobKind::ServiceStart => "Start services",
            JobKind::ServiceStop => "Stop services",
            JobKind::ServiceRestart => "Restart services",
            JobKind::ServiceCheck => "Check services",
            JobKind::ServiceConfigure => "Configure services",
            JobKind::ComponentAdd => "Add components",
            JobKind::ComponentStart => "Start components",
            JobKind::ComponentStop => "Stop components",
            JobKind::ComponentRestart => "Restart components",
            JobKind::ComponentCustom => "Run custom command",
        }
    }
}

/// Collaborators and inputs available while building a job.
#[derive(Debug, Clone, Copy)]
pub struct PlanContext<'a> {
    pub stack: &'a StackMetadata,
    pub store: &'a dyn Store,
    pub command: &'a CommandContext,
    /// Target cluster. For cluster creation this is an unsaved placeholder
    /// (id 0) built from the command.
    pub cluster: &'a ClusterRecord,
}

/// Unsaved job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobPlan {
    pub kind: JobKind,
    pub name: String,
    pub command: CommandContext,
    pub cluster_id: Option<u64>,
    pub stages: Vec<StagePlan>,
}

/// Unsaved stage. Its order is its index in [`JobPlan::stages`] plus one.
#[derive(Debug, Clone, PartialEq)]
pub struct StagePlan {
    pub name: String,
    pub service_name: Option<String>,
    pub component_name: Option<String>,
    pub context: StageContext,
    pub tasks: Vec<TaskPlan>,
}

/// Unsaved task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskPlan {
    pub name: String,
    pub context: TaskContext,
}

/// Registry of job kinds keyed by command identifier.
#[derive(Debug, Clone)]
pub struct JobFactories {
    registry: BTreeMap<CommandIdentifier, JobKind>,
}

impl Default for JobFactories {
    fn default() -> Self {
        Self::new()
    }
}

impl JobFactories {
    /// Registry populated with every built-in kind.
    pub fn new() -> Self {
        let mut factories = Self {
            registry: BTreeMap::new(),
        };
        for kind in JobKind::ALL {
            factories.register(kind.identifier(), kind);
        }
        debug!(count = factories.registry.len(), "job factories registered");
        factories
    }

    /// Register `kind` under `id`. The first registration wins; returns
    /// `false` when `id` was already taken.
    pub fn register(&mut self, id: CommandIdentifier, kind: JobKind) -> bool {
        if let Some(existing) = self.registry.get(&id) {
            warn!(
                identifier = %id,
                existing = ?existing,
                ignored = ?kind,
                "duplicate job factory registration ignored"
            );
            return false;
        }
        self.registry.insert(id, kind);
        true
    }

    pub fn lookup(&self, id: CommandIdentifier) -> Result<JobKind> {
        self.registry
            .get(&id)
            .copied()
            .ok_or(ClusterdagError::UnsupportedCommand {
                level: id.level,
                command: id.command,
            })
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &CommandIdentifier> {
        self.registry.keys()
    }

    /// Validate `command` and build its unsaved plan.
    pub fn create_job(
        &self,
        stack: &StackMetadata,
        store: &dyn Store,
        command: &CommandContext,
    ) -> Result<JobPlan> {
        let command = &command.with_normalized_names();
        let kind = self.lookup(CommandIdentifier::of(command))?;
        let cluster = resolve_cluster(kind, stack, store, command)?;

        let ctx = PlanContext {
            stack,
            store,
            command,
            cluster: &cluster,
        };
        validate::validate(kind, &ctx)?;

        let stages = jobs::create_stages(kind, &ctx)?;
        let cluster_id = (cluster.id != 0).then_some(cluster.id);

        info!(
            kind = ?kind,
            cluster = %cluster.name,
            stages = stages.len(),
            "job planned"
        );
        Ok(JobPlan {
            kind,
            name: kind.job_name().to_string(),
            command: command.clone(),
            cluster_id,
            stages,
        })
    }
}

/// Target cluster for a command. Cluster creation gets a placeholder built
/// from the command; everything else must name an existing cluster.
fn resolve_cluster(
    kind: JobKind,
    stack: &StackMetadata,
    store: &dyn Store,
    command: &CommandContext,
) -> Result<ClusterRecord> {
    if kind == JobKind::ClusterAdd {
        let cc = command.cluster_command.as_ref().ok_or_else(|| {
            ClusterdagError::InvalidCommand("cluster add requires a cluster_command".to_string())
        })?;
        return Ok(placeholder_cluster(stack, cc));
    }

    let cluster_id = command.cluster_id.ok_or_else(|| {
        ClusterdagError::InvalidCommand(format!(
            "{} requires a cluster_id",
            CommandIdentifier::of(command)
        ))
    })?;
    store
        .cluster(cluster_id)?
        .ok_or_else(|| ClusterdagError::InvalidCommand(format!("cluster {cluster_id} does not exist")))
}

/// Unsaved cluster record described by a cluster command.
pub(crate) fn placeholder_cluster(stack: &StackMetadata, cc: &ClusterCommand) -> ClusterRecord {
    ClusterRecord {
        id: 0,
        name: cc.name.clone(),
        display_name: cc.display_name.clone().unwrap_or_else(|| cc.name.clone()),
        user_group: cc
            .user_group
            .clone()
            .unwrap_or_else(|| stack.user_group.clone()),
        root_dir: cc.root_dir.clone().unwrap_or_else(|| stack.root_dir.clone()),
        stack_name: stack.name.clone(),
        stack_version: stack.version.clone(),
    }
}

/// Write a plan to the store as a `PENDING` job with its stages and tasks.
///
/// Either the whole job is written or, on error, whatever was already
/// inserted is deleted again.
pub fn persist_plan(store: &dyn Store, plan: &JobPlan) -> Result<JobId> {
    let job_id = store.insert_job(JobRecord {
        id: 0,
        name: plan.name.clone(),
        context: serde_json::to_string(&plan.command)?,
        state: JobState::Pending,
        cluster_id: plan.cluster_id,
        retry_count: 0,
    })?;

    if let Err(err) = persist_stages(store, job_id, plan) {
        warn!(job_id, error = %err, "persisting job failed; rolling back");
        if let Err(cleanup) = store.delete_job(job_id) {
            error!(job_id, error = %cleanup, "could not remove partially written job");
        }
        return Err(err);
    }

    info!(job_id, name = %plan.name, stages = plan.stages.len(), "job persisted");
    Ok(job_id)
}

fn persist_stages(store: &dyn Store, job_id: JobId, plan: &JobPlan) -> Result<()> {
    for (i, stage) in plan.stages.iter().enumerate() {
        let stage_id = store.insert_stage(StageRecord {
            id: 0,
            job_id,
            cluster_id: plan.cluster_id,
            name: stage.name.clone(),
            order: (i + 1) as u32,
            service_name: stage.service_name.clone(),
            component_name: stage.component_name.clone(),
            context: serde_json::to_string(&stage.context)?,
            state: JobState::Pending,
        })?;

        for task in &stage.tasks {
            let tc = &task.context;
            store.insert_task(TaskRecord {
                id: 0,
                job_id,
                stage_id,
                cluster_id: plan.cluster_id,
                name: task.name.clone(),
                hostname: tc.hostname.clone(),
                command: tc.command,
                custom_command: tc.custom_command.clone(),
                service_name: tc.service_name.clone(),
                component_name: tc.component_name.clone(),
                service_user: tc.service_user.clone(),
                context: serde_json::to_string(tc)?,
                state: JobState::Pending,
            })?;
        }
    }

    Ok(())
}
