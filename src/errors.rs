// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::types::{Command, CommandLevel, JobState};

#[derive(Error, Debug)]
pub enum ClusterdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cycle detected in dependency graph: {}", nodes.join(" -> "))]
    DependencyCycle { nodes: Vec<String> },

    #[error("Unsupported command: {command} at level {level}")]
    UnsupportedCommand {
        level: CommandLevel,
        command: Command,
    },

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Task {task_id} failed on {hostname}: {reason}")]
    TaskExecution {
        task_id: u64,
        hostname: String,
        reason: String,
    },

    #[error("Job {job_id} is {state} and cannot be retried")]
    NotRetryable { job_id: u64, state: JobState },

    #[error("Job {job_id} is {state}; only PENDING jobs can be started")]
    JobNotPending { job_id: u64, state: JobState },

    #[error("Stage {stage_id} of job {job_id} is {state}; expected PENDING")]
    StageNotPending {
        job_id: u64,
        stage_id: u64,
        state: JobState,
    },

    #[error("Job not found: {0}")]
    JobNotFound(u64),

    #[error("Task not found: {0}")]
    TaskNotFound(u64),

    #[error("Job {0} is already running")]
    JobAlreadyRunning(u64),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ClusterdagError>;
