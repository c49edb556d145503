// src/types.rs

//! Small enums shared by every layer: states, command levels, verbs and
//! component categories.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Life-cycle state of a job, stage or task.
///
/// Jobs only ever use `Pending`, `Processing`, `Successful` and `Failed`.
/// `Canceled` is reserved for stages and tasks that were never dispatched
/// because an earlier stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    Pending,
    Processing,
    Successful,
    Failed,
    Canceled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Successful | JobState::Failed | JobState::Canceled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Processing => "PROCESSING",
            JobState::Successful => "SUCCESSFUL",
            JobState::Failed => "FAILED",
            JobState::Canceled => "CANCELED",
        }
    }
}

impl Default for JobState {
    fn default() -> Self {
        JobState::Pending
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(JobState::Pending),
            "PROCESSING" => Ok(JobState::Processing),
            "SUCCESSFUL" => Ok(JobState::Successful),
            "FAILED" => Ok(JobState::Failed),
            "CANCELED" => Ok(JobState::Canceled),
            other => Err(format!("invalid job state: {other}")),
        }
    }
}

/// Scope a command applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandLevel {
    Cluster,
    Host,
    Service,
    Component,
}

impl fmt::Display for CommandLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandLevel::Cluster => "CLUSTER",
            CommandLevel::Host => "HOST",
            CommandLevel::Service => "SERVICE",
            CommandLevel::Component => "COMPONENT",
        };
        f.write_str(s)
    }
}

/// Command verb.
///
/// `Custom` carries its real action name separately (see
/// [`crate::model::CommandContext::custom_command`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Command {
    Add,
    Start,
    Stop,
    Restart,
    Check,
    Configure,
    Init,
    Prepare,
    Custom,
}

impl Command {
    pub const ALL: [Command; 9] = [
        Command::Add,
        Command::Start,
        Command::Stop,
        Command::Restart,
        Command::Check,
        Command::Configure,
        Command::Init,
        Command::Prepare,
        Command::Custom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Command::Add => "ADD",
            Command::Start => "START",
            Command::Stop => "STOP",
            Command::Restart => "RESTART",
            Command::Check => "CHECK",
            Command::Configure => "CONFIGURE",
            Command::Init => "INIT",
            Command::Prepare => "PREPARE",
            Command::Custom => "CUSTOM",
        }
    }

    /// Verb as used in stage and task names ("Start", "Configure", ...).
    pub fn display_verb(self) -> &'static str {
        match self {
            Command::Add => "Add",
            Command::Start => "Start",
            Command::Stop => "Stop",
            Command::Restart => "Restart",
            Command::Check => "Check",
            Command::Configure => "Configure",
            Command::Init => "Init",
            Command::Prepare => "Prepare",
            Command::Custom => "Run",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        Command::ALL
            .into_iter()
            .find(|c| c.as_str() == upper)
            .ok_or_else(|| format!("invalid command: {s}"))
    }
}

/// Component classification from stack metadata.
///
/// Clients have no running process and are skipped by start, stop, check
/// and prepare stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentCategory {
    Master,
    Slave,
    Client,
}

impl Default for ComponentCategory {
    fn default() -> Self {
        ComponentCategory::Master
    }
}

/// Last known running state of a component or service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

impl Default for HealthStatus {
    fn default() -> Self {
        HealthStatus::Unknown
    }
}
