// src/model/command.rs

//! Request-side structures: what the user asked for, plus the contexts that
//! carry it down into stages and tasks.
//!
//! None of these are stored as entities of their own. A job keeps its
//! `CommandContext` as JSON so it can be inspected or replayed, and each
//! stage and task keeps its own context the same way.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::ClusterId;
use crate::types::{Command, CommandLevel};

/// One user-issued command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandContext {
    #[serde(default)]
    pub cluster_id: Option<ClusterId>,

    pub command_level: CommandLevel,

    pub command: Command,

    /// Action name when `command` is `CUSTOM`.
    #[serde(default)]
    pub custom_command: Option<String>,

    #[serde(default)]
    pub service_commands: Vec<ServiceCommand>,

    /// Component-level targets (`COMPONENT` commands).
    #[serde(default)]
    pub component_commands: Vec<ComponentHosts>,

    #[serde(default)]
    pub host_commands: Vec<HostCommand>,

    #[serde(default)]
    pub cluster_command: Option<ClusterCommand>,
}

impl CommandContext {
    pub fn new(command_level: CommandLevel, command: Command) -> Self {
        Self {
            cluster_id: None,
            command_level,
            command,
            custom_command: None,
            service_commands: Vec::new(),
            component_commands: Vec::new(),
            host_commands: Vec::new(),
            cluster_command: None,
        }
    }

    /// Every component named by the command, with its hosts, in order.
    ///
    /// Service commands come first, then component commands.
    pub fn component_hosts(&self) -> impl Iterator<Item = &ComponentHosts> {
        self.service_commands
            .iter()
            .flat_map(|s| s.component_hosts.iter())
            .chain(self.component_commands.iter())
    }

    /// Copy with service and component names lowercased, the form stack
    /// metadata is keyed by.
    pub fn with_normalized_names(&self) -> Self {
        let mut out = self.clone();
        for sc in &mut out.service_commands {
            sc.service_name = sc.service_name.to_lowercase();
            for ch in &mut sc.component_hosts {
                ch.component_name = ch.component_name.to_lowercase();
            }
        }
        for ch in &mut out.component_commands {
            ch.component_name = ch.component_name.to_lowercase();
        }
        out
    }

    /// Hostnames named by `host_commands`, deduplicated in order.
    pub fn hostnames(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for h in &self.host_commands {
            if !out.contains(&h.hostname) {
                out.push(h.hostname.clone());
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCommand {
    pub service_name: String,

    #[serde(default)]
    pub component_hosts: Vec<ComponentHosts>,

    /// Free-form configuration handed to configure tasks.
    #[serde(default)]
    pub configs: BTreeMap<String, serde_json::Value>,

    /// Set when the service is already installed and only new components
    /// are being added.
    #[serde(default)]
    pub installed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentHosts {
    pub component_name: String,

    #[serde(default)]
    pub hostnames: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCommand {
    pub hostname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterCommand {
    pub name: String,

    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub user_group: Option<String>,

    #[serde(default)]
    pub root_dir: Option<String>,

    #[serde(default)]
    pub hosts: Vec<HostCommand>,
}

/// Parameters for one stage: a component-command over a host list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageContext {
    pub cluster_id: Option<ClusterId>,
    pub service_name: Option<String>,
    pub component_name: Option<String>,
    pub command: Command,
    pub custom_command: Option<String>,
    pub hostnames: Vec<String>,
}

/// Everything the agent needs to run one task on one host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    pub cluster_id: Option<ClusterId>,
    pub cluster_name: Option<String>,
    pub hostname: String,
    pub service_name: String,
    pub service_user: String,
    pub user_group: String,
    pub root_dir: String,
    pub component_name: String,
    pub component_display_name: String,
    pub command: Command,
    pub custom_command: Option<String>,
    pub stack_name: String,
    pub stack_version: String,
    pub script: Option<String>,
    #[serde(default)]
    pub configs: BTreeMap<String, serde_json::Value>,
}
