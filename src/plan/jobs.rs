// src/plan/jobs.rs

//! Stage recipes per job kind.

use crate::errors::Result;
use crate::model::ComponentHosts;
use crate::plan::stages::{
    cache_stage, cluster_hostnames, command_targets, component_stages, configure_stages,
    host_check_stage, installed_targets, union_hosts,
};
use crate::plan::{JobKind, PlanContext, StagePlan};
use crate::types::Command;

/// Build the ordered stage list for `kind`.
pub fn create_stages(kind: JobKind, ctx: &PlanContext<'_>) -> Result<Vec<StagePlan>> {
    match kind {
        JobKind::ClusterAdd => cluster_add(ctx),
        JobKind::HostAdd => host_add(ctx),
        JobKind::ServiceAdd => service_add(ctx),
        JobKind::ComponentAdd => component_add(ctx),

        JobKind::ClusterStart | JobKind::HostStart | JobKind::ServiceStart
        | JobKind::ComponentStart => {
            let targets = lifecycle_targets(kind, ctx)?;
            component_stages(ctx, &targets, &[Command::Start])
        }
        JobKind::ClusterStop | JobKind::HostStop | JobKind::ServiceStop
        | JobKind::ComponentStop => {
            let targets = lifecycle_targets(kind, ctx)?;
            component_stages(ctx, &targets, &[Command::Stop])
        }
        JobKind::ClusterRestart | JobKind::HostRestart | JobKind::ServiceRestart
        | JobKind::ComponentRestart => {
            let targets = lifecycle_targets(kind, ctx)?;
            let mut stages = component_stages(ctx, &targets, &[Command::Stop])?;
            stages.extend(component_stages(ctx, &targets, &[Command::Start])?);
            Ok(stages)
        }

        JobKind::ServiceCheck => {
            let targets = lifecycle_targets(kind, ctx)?;
            component_stages(ctx, &targets, &[Command::Check])
        }
        JobKind::ServiceConfigure => service_configure(ctx, &lifecycle_targets(kind, ctx)?),
        JobKind::ComponentCustom => {
            let targets = command_targets(ctx);
            component_stages(ctx, &targets, &[Command::Custom])
        }
    }
}

fn cluster_add(ctx: &PlanContext<'_>) -> Result<Vec<StagePlan>> {
    let hosts: Vec<String> = ctx
        .command
        .cluster_command
        .as_ref()
        .map(|cc| {
            let names: Vec<String> = cc.hosts.iter().map(|h| h.hostname.clone()).collect();
            union_hosts([names.as_slice()])
        })
        .unwrap_or_default();

    Ok(vec![
        host_check_stage(ctx, hosts.clone()),
        cache_stage(ctx, hosts),
    ])
}

fn host_add(ctx: &PlanContext<'_>) -> Result<Vec<StagePlan>> {
    let new_hosts = ctx.command.hostnames();
    let existing = cluster_hostnames(ctx)?;
    let all_hosts = union_hosts([existing.as_slice(), new_hosts.as_slice()]);

    Ok(vec![
        host_check_stage(ctx, new_hosts),
        cache_stage(ctx, all_hosts),
    ])
}

/// `[add, cache, configure, init+start+prepare, check]` over services not
/// yet installed.
fn service_add(ctx: &PlanContext<'_>) -> Result<Vec<StagePlan>> {
    let targets = crate::plan::stages::merge_targets(
        ctx.command
            .service_commands
            .iter()
            .filter(|s| !s.installed)
            .flat_map(|s| s.component_hosts.iter()),
    );

    let mut stages = component_stages(ctx, &targets, &[Command::Add])?;
    stages.push(cache_stage(ctx, cache_hosts(ctx, &targets)?));
    stages.extend(configure_stages(ctx, &targets)?);
    stages.extend(component_stages(
        ctx,
        &targets,
        &[Command::Init, Command::Start, Command::Prepare],
    )?);
    stages.extend(component_stages(ctx, &targets, &[Command::Check])?);
    Ok(stages)
}

/// `[add, cache, configure, init+start+prepare]` on hosts where the
/// component is not installed yet.
fn component_add(ctx: &PlanContext<'_>) -> Result<Vec<StagePlan>> {
    let installed = installed_targets(ctx, |_| true)?;
    let targets: Vec<ComponentHosts> = command_targets(ctx)
        .into_iter()
        .map(|mut t| {
            if let Some(done) = installed.iter().find(|i| i.component_name == t.component_name) {
                t.hostnames.retain(|h| !done.hostnames.contains(h));
            }
            t
        })
        .filter(|t| !t.hostnames.is_empty())
        .collect();

    let mut stages = component_stages(ctx, &targets, &[Command::Add])?;
    stages.push(cache_stage(ctx, cache_hosts(ctx, &targets)?));
    stages.extend(configure_stages(ctx, &targets)?);
    stages.extend(component_stages(
        ctx,
        &targets,
        &[Command::Init, Command::Start, Command::Prepare],
    )?);
    Ok(stages)
}

/// `[cache, configure, stop, start]`: new configuration only takes effect
/// once the components restart.
fn service_configure(ctx: &PlanContext<'_>, targets: &[ComponentHosts]) -> Result<Vec<StagePlan>> {
    let hosts = union_hosts(targets.iter().map(|t| t.hostnames.as_slice()));
    let mut stages = vec![cache_stage(ctx, hosts)];
    stages.extend(configure_stages(ctx, targets)?);
    stages.extend(component_stages(ctx, targets, &[Command::Stop])?);
    stages.extend(component_stages(ctx, targets, &[Command::Start])?);
    Ok(stages)
}

/// Targets for start/stop/restart/check/configure kinds.
fn lifecycle_targets(kind: JobKind, ctx: &PlanContext<'_>) -> Result<Vec<ComponentHosts>> {
    match kind {
        JobKind::ClusterStart | JobKind::ClusterStop | JobKind::ClusterRestart => {
            installed_targets(ctx, |_| true)
        }
        JobKind::HostStart | JobKind::HostStop | JobKind::HostRestart => {
            let hosts = ctx.command.hostnames();
            installed_targets(ctx, |c| hosts.contains(&c.hostname))
        }
        JobKind::ServiceStart
        | JobKind::ServiceStop
        | JobKind::ServiceRestart
        | JobKind::ServiceCheck
        | JobKind::ServiceConfigure => {
            let services: Vec<&str> = ctx
                .command
                .service_commands
                .iter()
                .map(|s| s.service_name.as_str())
                .collect();
            installed_targets(ctx, |c| services.contains(&c.service_name.as_str()))
        }
        _ => Ok(command_targets(ctx)),
    }
}

/// Every host of the cluster plus any host the targets touch.
fn cache_hosts(ctx: &PlanContext<'_>, targets: &[ComponentHosts]) -> Result<Vec<String>> {
    let existing = cluster_hostnames(ctx)?;
    let mut lists: Vec<&[String]> = vec![existing.as_slice()];
    lists.extend(targets.iter().map(|t| t.hostnames.as_slice()));
    Ok(union_hosts(lists))
}
