// src/plan/validate.rs

//! Command validators. They run before any record is created so a bad
//! command fails fast with [`ClusterdagError::InvalidCommand`].

use std::collections::HashSet;

use crate::config::validate::compile;
use crate::errors::{ClusterdagError, Result};
use crate::plan::{JobKind, PlanContext};
use crate::types::{Command, CommandLevel};

pub fn validate(kind: JobKind, ctx: &PlanContext<'_>) -> Result<()> {
    match kind {
        JobKind::ClusterAdd => validate_cluster_add(ctx),
        _ => {
            let cluster_hosts = registered_hosts(ctx)?;
            match kind.identifier().level {
                CommandLevel::Cluster => Ok(()),
                CommandLevel::Host => validate_hosts(ctx, kind, &cluster_hosts),
                CommandLevel::Service => {
                    validate_services(ctx, &cluster_hosts)?;
                    if kind == JobKind::ServiceAdd {
                        validate_required_services(ctx)?;
                    }
                    Ok(())
                }
                CommandLevel::Component => {
                    validate_components(ctx, &cluster_hosts)?;
                    if kind == JobKind::ComponentCustom {
                        validate_custom_command(ctx)?;
                    }
                    Ok(())
                }
            }
        }
    }
}

/// RFC 1123 host name: dot-separated labels of letters, digits and inner
/// hyphens. Dotted IPv4 addresses match too.
const HOSTNAME_PATTERN: &str =
    r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$";
const MAX_HOSTNAME_LEN: usize = 253;

fn invalid(msg: impl Into<String>) -> ClusterdagError {
    ClusterdagError::InvalidCommand(msg.into())
}

fn check_hostnames<'a>(hostnames: impl IntoIterator<Item = &'a String>) -> Result<()> {
    let re = compile(HOSTNAME_PATTERN)?;
    for host in hostnames {
        if host.trim().is_empty() {
            return Err(invalid("hostnames must not be empty"));
        }
        if host.len() > MAX_HOSTNAME_LEN || !re.is_match(host) {
            return Err(invalid(format!("'{host}' is not a valid hostname")));
        }
    }
    Ok(())
}

fn registered_hosts(ctx: &PlanContext<'_>) -> Result<HashSet<String>> {
    Ok(ctx
        .store
        .hosts_of_cluster(ctx.cluster.id)?
        .into_iter()
        .map(|h| h.hostname)
        .collect())
}

fn validate_cluster_add(ctx: &PlanContext<'_>) -> Result<()> {
    let cc = ctx
        .command
        .cluster_command
        .as_ref()
        .ok_or_else(|| invalid("cluster add requires a cluster_command"))?;

    if cc.name.trim().is_empty() {
        return Err(invalid("cluster name must not be empty"));
    }
    if cc.hosts.is_empty() {
        return Err(invalid(format!("cluster '{}' must have at least one host", cc.name)));
    }
    check_hostnames(cc.hosts.iter().map(|h| &h.hostname))?;
    if ctx.store.cluster_by_name(&cc.name)?.is_some() {
        return Err(invalid(format!("cluster '{}' already exists", cc.name)));
    }
    Ok(())
}

fn validate_hosts(ctx: &PlanContext<'_>, kind: JobKind, cluster_hosts: &HashSet<String>) -> Result<()> {
    let hosts = ctx.command.hostnames();
    if hosts.is_empty() {
        return Err(invalid("host command requires at least one host"));
    }
    check_hostnames(&hosts)?;
    for host in &hosts {
        let known = cluster_hosts.contains(host);
        match kind {
            JobKind::HostAdd if known => {
                return Err(invalid(format!(
                    "host '{host}' already belongs to cluster '{}'",
                    ctx.cluster.name
                )));
            }
            JobKind::HostAdd => {}
            _ if !known => {
                return Err(invalid(format!(
                    "host '{host}' does not belong to cluster '{}'",
                    ctx.cluster.name
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

fn validate_services(ctx: &PlanContext<'_>, cluster_hosts: &HashSet<String>) -> Result<()> {
    if ctx.command.service_commands.is_empty() {
        return Err(invalid("service command requires at least one service"));
    }
    for sc in &ctx.command.service_commands {
        let service = ctx
            .stack
            .service(&sc.service_name)
            .ok_or_else(|| invalid(format!("unknown service '{}'", sc.service_name)))?;

        for ch in &sc.component_hosts {
            let component = ctx
                .stack
                .component(&ch.component_name)
                .ok_or_else(|| invalid(format!("unknown component '{}'", ch.component_name)))?;
            if component.service_name != service.name {
                return Err(invalid(format!(
                    "component '{}' does not belong to service '{}'",
                    ch.component_name, service.name
                )));
            }
            check_hosts_in_cluster(ctx, &ch.hostnames, cluster_hosts)?;
        }
    }
    Ok(())
}

fn validate_components(ctx: &PlanContext<'_>, cluster_hosts: &HashSet<String>) -> Result<()> {
    if ctx.command.component_commands.is_empty() {
        return Err(invalid("component command requires at least one component"));
    }
    for ch in &ctx.command.component_commands {
        if ctx.stack.component(&ch.component_name).is_none() {
            return Err(invalid(format!("unknown component '{}'", ch.component_name)));
        }
        if ch.hostnames.is_empty() {
            return Err(invalid(format!(
                "component '{}' has no target hosts",
                ch.component_name
            )));
        }
        check_hosts_in_cluster(ctx, &ch.hostnames, cluster_hosts)?;
    }
    Ok(())
}

fn check_hosts_in_cluster(
    ctx: &PlanContext<'_>,
    hostnames: &[String],
    cluster_hosts: &HashSet<String>,
) -> Result<()> {
    for host in hostnames {
        if !cluster_hosts.contains(host) {
            return Err(invalid(format!(
                "host '{host}' does not belong to cluster '{}'",
                ctx.cluster.name
            )));
        }
    }
    Ok(())
}

/// Every required service must already be installed or be added by the
/// same command.
fn validate_required_services(ctx: &PlanContext<'_>) -> Result<()> {
    let installed: HashSet<String> = ctx
        .store
        .services_of_cluster(ctx.cluster.id)?
        .into_iter()
        .map(|s| s.name)
        .collect();
    let requested: HashSet<&str> = ctx
        .command
        .service_commands
        .iter()
        .map(|s| s.service_name.as_str())
        .collect();

    for sc in &ctx.command.service_commands {
        let Some(service) = ctx.stack.service(&sc.service_name) else {
            continue;
        };
        for required in &service.required_services {
            if !installed.contains(required) && !requested.contains(required.as_str()) {
                return Err(invalid(format!(
                    "service '{}' requires '{required}', which is neither installed nor part of this command",
                    service.name
                )));
            }
        }
    }
    Ok(())
}

fn validate_custom_command(ctx: &PlanContext<'_>) -> Result<()> {
    let custom = ctx
        .command
        .custom_command
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| invalid(format!("{} requires a custom_command", Command::Custom)))?;

    for ch in &ctx.command.component_commands {
        let Some(component) = ctx.stack.component(&ch.component_name) else {
            continue;
        };
        if !component.custom_commands.iter().any(|c| c == custom) {
            return Err(invalid(format!(
                "component '{}' does not support custom command '{custom}'",
                component.name
            )));
        }
    }
    Ok(())
}
