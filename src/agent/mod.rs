// src/agent/mod.rs

//! Agent RPC boundary.
//!
//! The engine talks to an [`AgentClient`] rather than to a transport
//! directly. Production uses [`ShellAgent`], which runs a configured command
//! template per task; tests provide scripted fakes.
//!
//! Output produced while a task runs is pushed into a [`TaskLogSink`] so
//! log viewers can follow it through the [`TaskLogHub`].

use std::future::Future;
use std::pin::Pin;

use crate::errors::Result;
use crate::model::{TaskContext, TaskId};
use crate::types::Command;

pub mod log;
pub mod shell;

pub use log::{TaskLogHub, TaskLogSink, TaskLogStream};
pub use shell::ShellAgent;

/// One component-command invocation on one host.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRequest {
    pub task_id: TaskId,
    pub hostname: String,
    pub service_name: String,
    pub component_name: String,
    pub command: Command,
    pub custom_command: Option<String>,
    pub context: TaskContext,
}

impl AgentRequest {
    /// The action the agent should perform: the custom command when set,
    /// otherwise the verb in lowercase.
    pub fn action(&self) -> String {
        match &self.custom_command {
            Some(custom) => custom.clone(),
            None => self.command.as_str().to_lowercase(),
        }
    }
}

/// Result reported by the agent once the command finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply {
    pub exit_status: i32,
    pub message: String,
}

impl AgentReply {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_status: 0,
            message: message.into(),
        }
    }

    pub fn failure(exit_status: i32, message: impl Into<String>) -> Self {
        Self {
            exit_status,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Executes tasks on remote hosts.
///
/// `Ok` means the agent answered; a non-zero `exit_status` is a failed
/// command. `Err` means the call itself failed (connection refused, process
/// could not be spawned, ...). The engine treats both failures the same.
pub trait AgentClient: Send + Sync {
    fn execute(
        &self,
        request: AgentRequest,
        log: TaskLogSink,
    ) -> Pin<Box<dyn Future<Output = Result<AgentReply>> + Send + '_>>;
}
