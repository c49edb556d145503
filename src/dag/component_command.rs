// src/dag/component_command.rs

use std::fmt;
use std::str::FromStr;

use crate::types::Command;

/// A `(component, command)` pair, the node key of the dependency graph.
///
/// Component names are stored lowercase. The textual form used in stack
/// metadata is `COMPONENT-COMMAND`, e.g. `ZOOKEEPER_SERVER-START`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentCommand {
    pub component: String,
    pub command: Command,
}

impl ComponentCommand {
    pub fn new(component: impl AsRef<str>, command: Command) -> Self {
        Self {
            component: component.as_ref().to_lowercase(),
            command,
        }
    }

    /// Same component, different verb.
    pub fn with_command(&self, command: Command) -> Self {
        Self {
            component: self.component.clone(),
            command,
        }
    }
}

impl fmt::Display for ComponentCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.component.to_uppercase(), self.command)
    }
}

impl FromStr for ComponentCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (component, command) = s
            .trim()
            .rsplit_once('-')
            .ok_or_else(|| format!("'{s}' is not of the form <component>-<COMMAND>"))?;
        if component.is_empty() {
            return Err(format!("'{s}' has an empty component name"));
        }
        let command = command.parse::<Command>()?;
        Ok(ComponentCommand::new(component, command))
    }
}
