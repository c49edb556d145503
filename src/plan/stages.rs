// src/plan/stages.rs

//! Stage-building helpers shared by the job kinds.

use std::collections::BTreeMap;

use crate::dag::Direction;
use crate::errors::{ClusterdagError, Result};
use crate::model::{ComponentHosts, ComponentRecord, StageContext, TaskContext};
use crate::plan::{PlanContext, StagePlan, TaskPlan};
use crate::types::Command;

/// Service name used by cluster-level stages.
pub const CLUSTER_SERVICE: &str = "cluster";
/// Component name used by cluster-level stages.
pub const AGENT_COMPONENT: &str = "agent";
/// Custom command run by the cache-refresh stage.
pub const CACHE_COMMAND: &str = "update_cache_files";

const CLUSTER_STAGE_USER: &str = "root";

/// Merge component/host pairs: one entry per component (lowercased) in
/// first-seen order, hosts deduplicated, empty entries dropped.
pub fn merge_targets<'a, I>(targets: I) -> Vec<ComponentHosts>
where
    I: IntoIterator<Item = &'a ComponentHosts>,
{
    let mut out: Vec<ComponentHosts> = Vec::new();
    for t in targets {
        let name = t.component_name.to_lowercase();
        let pos = match out.iter().position(|e| e.component_name == name) {
            Some(pos) => pos,
            None => {
                out.push(ComponentHosts {
                    component_name: name,
                    hostnames: Vec::new(),
                });
                out.len() - 1
            }
        };
        for h in &t.hostnames {
            if !out[pos].hostnames.contains(h) {
                out[pos].hostnames.push(h.clone());
            }
        }
    }
    out.retain(|e| !e.hostnames.is_empty());
    out
}

/// Targets named by the command itself.
pub fn command_targets(ctx: &PlanContext<'_>) -> Vec<ComponentHosts> {
    merge_targets(ctx.command.component_hosts())
}

/// Installed components of the target cluster accepted by `keep`.
pub fn installed_targets<F>(ctx: &PlanContext<'_>, keep: F) -> Result<Vec<ComponentHosts>>
where
    F: Fn(&ComponentRecord) -> bool,
{
    let components = ctx.store.components_of_cluster(ctx.cluster.id)?;
    let pairs: Vec<ComponentHosts> = components
        .iter()
        .filter(|c| c.installed && keep(c))
        .map(|c| ComponentHosts {
            component_name: c.name.clone(),
            hostnames: vec![c.hostname.clone()],
        })
        .collect();
    Ok(merge_targets(&pairs))
}

/// Hostnames registered for the target cluster (none for a new cluster).
pub fn cluster_hostnames(ctx: &PlanContext<'_>) -> Result<Vec<String>> {
    if ctx.cluster.id == 0 {
        return Ok(Vec::new());
    }
    Ok(ctx
        .store
        .hosts_of_cluster(ctx.cluster.id)?
        .into_iter()
        .map(|h| h.hostname)
        .collect())
}

/// One stage per resolved component-command over `targets`.
///
/// The dependency graph decides the order. `STOP` alone uses teardown
/// order. Host selection per verb:
/// - `ADD`, `CONFIGURE`, `CUSTOM`: every host, clients included;
/// - `START`, `STOP`: every host, clients skipped;
/// - `CHECK`, `PREPARE`: first host only, clients skipped;
/// - `INIT`: first host only.
pub fn component_stages(
    ctx: &PlanContext<'_>,
    targets: &[ComponentHosts],
    commands: &[Command],
) -> Result<Vec<StagePlan>> {
    if targets.is_empty() {
        return Ok(Vec::new());
    }

    let available: Vec<String> = targets.iter().map(|t| t.component_name.clone()).collect();
    let graph = ctx.stack.graph();
    let todo = if commands == [Command::Stop] {
        graph.stop_order(&available)?
    } else {
        graph.build_todo_list(&available, commands, Direction::Forward)?
    };

    let mut stages = Vec::new();
    for cc in todo {
        let Some(hosts) = targets
            .iter()
            .find(|t| t.component_name == cc.component)
            .map(|t| t.hostnames.as_slice())
        else {
            continue;
        };
        let Some(first) = hosts.first() else {
            continue;
        };
        let is_client = ctx.stack.is_client(&cc.component);

        let selected: Vec<String> = match cc.command {
            Command::Start | Command::Stop if is_client => continue,
            Command::Check | Command::Prepare if is_client => continue,
            Command::Check | Command::Prepare | Command::Init => vec![first.clone()],
            _ => hosts.to_vec(),
        };

        stages.push(component_stage(ctx, &cc.component, cc.command, selected)?);
    }
    Ok(stages)
}

/// One configure stage per target, in command order.
pub fn configure_stages(ctx: &PlanContext<'_>, targets: &[ComponentHosts]) -> Result<Vec<StagePlan>> {
    targets
        .iter()
        .map(|t| component_stage(ctx, &t.component_name, Command::Configure, t.hostnames.clone()))
        .collect()
}

/// A single stage for `command` on one component.
pub fn component_stage(
    ctx: &PlanContext<'_>,
    component_name: &str,
    command: Command,
    hostnames: Vec<String>,
) -> Result<StagePlan> {
    let component = ctx.stack.component(component_name).ok_or_else(|| {
        ClusterdagError::InvalidCommand(format!("unknown component '{component_name}'"))
    })?;
    let service = ctx.stack.service(&component.service_name).ok_or_else(|| {
        ClusterdagError::InvalidCommand(format!("unknown service '{}'", component.service_name))
    })?;

    let custom_command = match command {
        Command::Custom => ctx.command.custom_command.clone(),
        _ => None,
    };
    let verb = match &custom_command {
        Some(custom) => humanize(custom),
        None => command.display_verb().to_string(),
    };
    let stage_name = format!("{verb} {}", component.display_name);
    let configs = service_configs(ctx, &service.name);

    let tasks = hostnames
        .iter()
        .map(|host| TaskPlan {
            name: format!("{stage_name} on {host}"),
            context: TaskContext {
                cluster_id: cluster_id(ctx),
                cluster_name: Some(ctx.cluster.name.clone()),
                hostname: host.clone(),
                service_name: service.name.clone(),
                service_user: service.user.clone(),
                user_group: ctx.cluster.user_group.clone(),
                root_dir: ctx.cluster.root_dir.clone(),
                component_name: component.name.clone(),
                component_display_name: component.display_name.clone(),
                command,
                custom_command: custom_command.clone(),
                stack_name: ctx.stack.name.clone(),
                stack_version: ctx.stack.version.clone(),
                script: component.script.clone(),
                configs: configs.clone(),
            },
        })
        .collect();

    Ok(StagePlan {
        name: stage_name,
        service_name: Some(service.name.clone()),
        component_name: Some(component.name.clone()),
        context: StageContext {
            cluster_id: cluster_id(ctx),
            service_name: Some(service.name.clone()),
            component_name: Some(component.name.clone()),
            command,
            custom_command,
            hostnames,
        },
        tasks,
    })
}

/// Refresh the host-local cache on `hostnames`.
pub fn cache_stage(ctx: &PlanContext<'_>, hostnames: Vec<String>) -> StagePlan {
    cluster_stage(
        ctx,
        "Update cache files",
        "Update cache files",
        Command::Custom,
        Some(CACHE_COMMAND.to_string()),
        hostnames,
    )
}

/// Verify every host in `hostnames` is reachable and ready.
pub fn host_check_stage(ctx: &PlanContext<'_>, hostnames: Vec<String>) -> StagePlan {
    cluster_stage(ctx, "Check hosts", "Check host", Command::Check, None, hostnames)
}

fn cluster_stage(
    ctx: &PlanContext<'_>,
    stage_name: &str,
    task_verb: &str,
    command: Command,
    custom_command: Option<String>,
    hostnames: Vec<String>,
) -> StagePlan {
    let tasks = hostnames
        .iter()
        .map(|host| TaskPlan {
            name: format!("{task_verb} on {host}"),
            context: TaskContext {
                cluster_id: cluster_id(ctx),
                cluster_name: Some(ctx.cluster.name.clone()),
                hostname: host.clone(),
                service_name: CLUSTER_SERVICE.to_string(),
                service_user: CLUSTER_STAGE_USER.to_string(),
                user_group: ctx.cluster.user_group.clone(),
                root_dir: ctx.cluster.root_dir.clone(),
                component_name: AGENT_COMPONENT.to_string(),
                component_display_name: "Agent".to_string(),
                command,
                custom_command: custom_command.clone(),
                stack_name: ctx.stack.name.clone(),
                stack_version: ctx.stack.version.clone(),
                script: None,
                configs: BTreeMap::new(),
            },
        })
        .collect();

    StagePlan {
        name: stage_name.to_string(),
        service_name: Some(CLUSTER_SERVICE.to_string()),
        component_name: Some(AGENT_COMPONENT.to_string()),
        context: StageContext {
            cluster_id: cluster_id(ctx),
            service_name: Some(CLUSTER_SERVICE.to_string()),
            component_name: Some(AGENT_COMPONENT.to_string()),
            command,
            custom_command,
            hostnames,
        },
        tasks,
    }
}

fn cluster_id(ctx: &PlanContext<'_>) -> Option<u64> {
    (ctx.cluster.id != 0).then_some(ctx.cluster.id)
}

fn service_configs(ctx: &PlanContext<'_>, service_name: &str) -> BTreeMap<String, serde_json::Value> {
    ctx.command
        .service_commands
        .iter()
        .find(|s| s.service_name == service_name)
        .map(|s| s.configs.clone())
        .unwrap_or_default()
}

/// `update_cache_files` -> `Update cache files`.
fn humanize(action: &str) -> String {
    let spaced = action.replace(['_', '-'], " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Order-preserving union of host lists.
pub fn union_hosts<'a, I>(lists: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a [String]>,
{
    let mut out: Vec<String> = Vec::new();
    for list in lists {
        for h in list {
            if !out.contains(h) {
                out.push(h.clone());
            }
        }
    }
    out
}
