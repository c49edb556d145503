// src/config/validate.rs

use std::collections::{HashMap, HashSet};

use regex::Regex;

use crate::config::model::{AgentSection, ConfigFile, RawConfigFile, StackSection};
use crate::dag::{ComponentCommand, DependencyGraph};
use crate::errors::{ClusterdagError, Result};
use crate::types::Command;

const COMPONENT_COMMAND_PATTERN: &str = r"^(?P<component>[A-Za-z0-9_.-]+)-(?P<command>[A-Za-z]+)$";
const PLACEHOLDER_PATTERN: &str = r"\{([A-Za-z_]*)\}";

const AGENT_PLACEHOLDERS: [&str; 5] = ["host", "service", "component", "command", "task_id"];

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ClusterdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.agent, raw.stack))
    }
}

pub fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_global_config(cfg)?;
    validate_agent(&cfg.agent)?;
    validate_stack(&cfg.stack)?;
    build_dependency_graph(&cfg.stack)?;
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    let c = &cfg.config;
    if c.rpc_timeout_secs == 0 {
        return Err(ClusterdagError::ConfigError(
            "[config].rpc_timeout_secs must be >= 1 (got 0)".to_string(),
        ));
    }
    if c.max_concurrent_jobs == 0 {
        return Err(ClusterdagError::ConfigError(
            "[config].max_concurrent_jobs must be >= 1 (got 0)".to_string(),
        ));
    }
    if c.log_buffer_lines == 0 {
        return Err(ClusterdagError::ConfigError(
            "[config].log_buffer_lines must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_agent(agent: &AgentSection) -> Result<()> {
    if agent.command.trim().is_empty() {
        return Err(ClusterdagError::ConfigError(
            "[agent].command must not be empty".to_string(),
        ));
    }
    let placeholder = compile(PLACEHOLDER_PATTERN)?;
    for cap in placeholder.captures_iter(&agent.command) {
        let name = &cap[1];
        if !AGENT_PLACEHOLDERS.contains(&name) {
            return Err(ClusterdagError::ConfigError(format!(
                "[agent].command uses unknown placeholder '{{{name}}}' (expected one of {})",
                AGENT_PLACEHOLDERS.join(", ")
            )));
        }
    }
    Ok(())
}

fn validate_stack(stack: &StackSection) -> Result<()> {
    if stack.name.trim().is_empty() {
        return Err(ClusterdagError::ConfigError(
            "[stack].name must not be empty".to_string(),
        ));
    }
    if stack.service.is_empty() {
        return Err(ClusterdagError::ConfigError(
            "stack must contain at least one [stack.service.<name>] section".to_string(),
        ));
    }

    let mut service_keys: HashMap<String, &str> = HashMap::new();
    for service_name in stack.service.keys() {
        if let Some(previous) = service_keys.insert(service_name.to_lowercase(), service_name) {
            return Err(ClusterdagError::ConfigError(format!(
                "services '{previous}' and '{service_name}' differ only in case"
            )));
        }
    }

    let mut owner: HashMap<String, &str> = HashMap::new();
    for (service_name, service) in &stack.service {
        if service.user.trim().is_empty() {
            return Err(ClusterdagError::ConfigError(format!(
                "service '{service_name}' has an empty user"
            )));
        }
        for required in &service.required_services {
            if required.eq_ignore_ascii_case(service_name) {
                return Err(ClusterdagError::ConfigError(format!(
                    "service '{service_name}' cannot require itself"
                )));
            }
            if !service_keys.contains_key(&required.to_lowercase()) {
                return Err(ClusterdagError::ConfigError(format!(
                    "service '{service_name}' requires unknown service '{required}'"
                )));
            }
        }
        for component_name in service.component.keys() {
            let key = component_name.to_lowercase();
            if let Some(previous) = owner.insert(key, service_name.as_str()) {
                return Err(ClusterdagError::ConfigError(format!(
                    "component '{component_name}' is declared by both '{previous}' and '{service_name}'"
                )));
            }
        }
    }
    Ok(())
}

/// Parse `[[stack.dependency]]` into graph entries and build the graph.
///
/// Every key must be `<component>-<COMMAND>` with a declared component and a
/// known verb; the resulting graph must be acyclic.
pub fn build_dependency_graph(stack: &StackSection) -> Result<DependencyGraph> {
    let declared: HashSet<String> = stack
        .service
        .values()
        .flat_map(|s| s.component.keys().map(|c| c.to_lowercase()))
        .collect();

    let key_re = compile(COMPONENT_COMMAND_PATTERN)?;
    let mut entries = Vec::with_capacity(stack.dependency.len());
    for dep in &stack.dependency {
        let blocked = parse_component_command(&key_re, &dep.command, &declared)?;
        let mut blockers = Vec::with_capacity(dep.blocked_by.len());
        for b in &dep.blocked_by {
            let blocker = parse_component_command(&key_re, b, &declared)?;
            if blocker == blocked {
                return Err(ClusterdagError::ConfigError(format!(
                    "dependency '{}' cannot be blocked by itself",
                    dep.command
                )));
            }
            blockers.push(blocker);
        }
        entries.push((blocked, blockers));
    }

    DependencyGraph::from_entries(entries)
}

pub(crate) fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| ClusterdagError::ConfigError(format!("invalid pattern '{pattern}': {e}")))
}

fn parse_component_command(
    key_re: &Regex,
    key: &str,
    declared: &HashSet<String>,
) -> Result<ComponentCommand> {
    let caps = key_re.captures(key.trim()).ok_or_else(|| {
        ClusterdagError::ConfigError(format!(
            "dependency key '{key}' is not of the form <component>-<COMMAND>"
        ))
    })?;

    let component = caps["component"].to_lowercase();
    if !declared.contains(&component) {
        return Err(ClusterdagError::ConfigError(format!(
            "dependency key '{key}' references unknown component '{component}'"
        )));
    }

    let command = caps["command"]
        .parse::<Command>()
        .map_err(|e| ClusterdagError::ConfigError(format!("dependency key '{key}': {e}")))?;

    Ok(ComponentCommand::new(component, command))
}
