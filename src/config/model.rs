// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::ComponentCategory;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// rpc_timeout_secs = 600
/// max_concurrent_jobs = 8
///
/// [agent]
/// command = "ssh {host} /opt/agent/run {component} {command}"
///
/// [stack]
/// name = "bigtop"
/// version = "3.3.0"
///
/// [stack.service.zookeeper]
/// user = "zookeeper"
///
/// [stack.service.zookeeper.component.zookeeper_server]
/// category = "master"
///
/// [[stack.dependency]]
/// command = "KAFKA_BROKER-START"
/// blocked_by = ["ZOOKEEPER_SERVER-START"]
/// ```
///
/// Only `[stack]` is required; the other sections have defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub agent: AgentSection,

    pub stack: StackSection,
}

/// Validated configuration. Obtain one through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub agent: AgentSection,
    pub stack: StackSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        agent: AgentSection,
        stack: StackSection,
    ) -> Self {
        Self {
            config,
            agent,
            stack,
        }
    }
}

/// `[config]` section: runtime limits.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Deadline for one agent call. A task whose call exceeds it fails.
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,

    /// How many jobs may execute at the same time.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Lines kept in memory per running task for late log subscribers.
    #[serde(default = "default_log_buffer_lines")]
    pub log_buffer_lines: usize,
}

fn default_rpc_timeout_secs() -> u64 {
    600
}

fn default_max_concurrent_jobs() -> usize {
    8
}

fn default_log_buffer_lines() -> usize {
    2000
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            rpc_timeout_secs: default_rpc_timeout_secs(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            log_buffer_lines: default_log_buffer_lines(),
        }
    }
}

/// `[agent]` section: how the process-backed agent reaches a host.
///
/// `command` is a template; `{host}`, `{service}`, `{component}`,
/// `{command}` and `{task_id}` are substituted before it is handed to
/// `shell -c`.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_agent_command")]
    pub command: String,

    #[serde(default = "default_shell")]
    pub shell: String,
}

fn default_agent_command() -> String {
    "echo {command} {component} on {host}".to_string()
}

fn default_shell() -> String {
    "sh".to_string()
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            command: default_agent_command(),
            shell: default_shell(),
        }
    }
}

/// `[stack]` section: service/component definitions and dependencies.
#[derive(Debug, Clone, Deserialize)]
pub struct StackSection {
    pub name: String,

    pub version: String,

    #[serde(default = "default_user_group")]
    pub user_group: String,

    #[serde(default = "default_root_dir")]
    pub root_dir: String,

    /// Keyed by service name.
    #[serde(default)]
    pub service: BTreeMap<String, ServiceConfig>,

    /// Dependency declarations, kept in file order.
    #[serde(default)]
    pub dependency: Vec<DependencyConfig>,
}

fn default_user_group() -> String {
    "hadoop".to_string()
}

fn default_root_dir() -> String {
    "/opt".to_string()
}

/// `[stack.service.<name>]`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// OS user the service's scripts run as.
    pub user: String,

    #[serde(default)]
    pub display_name: Option<String>,

    /// Services that must be installed before this one can be added.
    #[serde(default)]
    pub required_services: Vec<String>,

    #[serde(default)]
    pub component: BTreeMap<String, ComponentConfig>,
}

/// `[stack.service.<name>.component.<name>]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComponentConfig {
    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub category: ComponentCategory,

    /// Script reference passed to the agent.
    #[serde(default)]
    pub script: Option<String>,

    /// Non-standard actions this component accepts as `CUSTOM` commands.
    #[serde(default)]
    pub custom_commands: Vec<String>,
}

/// `[[stack.dependency]]`: `command` waits for everything in `blocked_by`.
#[derive(Debug, Clone, Deserialize)]
pub struct DependencyConfig {
    pub command: String,

    #[serde(default)]
    pub blocked_by: Vec<String>,
}
