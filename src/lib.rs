// src/lib.rs

pub mod agent;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod model;
pub mod plan;
pub mod scheduler;
pub mod service;
pub mod stack;
pub mod store;
pub mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::agent::ShellAgent;
use crate::cli::CliArgs;
use crate::config::load_and_validate;
use crate::model::{ClusterId, CommandContext};
use crate::plan::{CommandIdentifier, JobPlan};
use crate::service::Orchestrator;
use crate::store::MemoryStore;
use crate::types::{Command, CommandLevel, JobState};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and stack metadata
/// - the in-memory store, the shell agent and the orchestrator
/// - sequential execution of the commands file, with retries
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading config from '{}'", args.config))?;
    let commands = load_commands(&args.command)?;
    info!(count = commands.len(), dry_run = args.dry_run, "commands loaded");

    let agent = ShellAgent::from_config(&cfg.agent).dry_run(args.dry_run);
    let orchestrator = Orchestrator::from_config(&cfg, Arc::new(MemoryStore::new()), Arc::new(agent))?;

    tokio::select! {
        res = run_commands(&orchestrator, commands, &args) => res,
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl+C")?;
            warn!("interrupted; in-flight agent processes are killed");
            bail!("interrupted")
        }
    }
}

/// Parse a commands file: one JSON command object or an array of them.
pub fn load_commands(path: impl AsRef<Path>) -> Result<Vec<CommandContext>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading commands from '{}'", path.display()))?;
    parse_commands(&text).with_context(|| format!("parsing commands in '{}'", path.display()))
}

pub fn parse_commands(text: &str) -> Result<Vec<CommandContext>> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let commands = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(commands)
}

async fn run_commands(
    orchestrator: &Orchestrator,
    commands: Vec<CommandContext>,
    args: &CliArgs,
) -> Result<()> {
    let mut last_cluster: Option<ClusterId> = None;
    let mut failed = 0usize;

    for (i, mut command) in commands.into_iter().enumerate() {
        let creates_cluster =
            command.command_level == CommandLevel::Cluster && command.command == Command::Add;
        if command.cluster_id.is_none() && !creates_cluster {
            command.cluster_id = last_cluster;
        }

        let plan = orchestrator
            .plan(&command)
            .with_context(|| format!("command #{} ({})", i + 1, CommandIdentifier::of(&command)))?;
        if args.dry_run {
            print_plan(&plan);
        }

        let submission = orchestrator.submit(&command)?;
        let job_id = submission.job_id;
        let mut state = submission.handle.wait().await?;

        let mut attempt = 0;
        while state == JobState::Failed && attempt < args.retries {
            attempt += 1;
            warn!(job_id, attempt, max = args.retries, "retrying failed job");
            state = orchestrator.retry(job_id)?.wait().await?;
        }

        let job = orchestrator.job(job_id)?;
        if let Some(cluster_id) = job.job.cluster_id {
            last_cluster = Some(cluster_id);
        }
        println!("job {job_id} [{}] {state}", job.job.name);

        if state != JobState::Successful {
            failed += 1;
            for stage in job.stages.iter().filter(|s| s.state == JobState::Failed) {
                println!("  failed stage {}: {}", stage.order, stage.name);
                for task in job.tasks_of(stage.id).filter(|t| t.state == JobState::Failed) {
                    println!("    failed task {}: {}", task.id, task.name);
                }
            }
            // Later commands usually depend on this one.
            break;
        }
    }

    if failed > 0 {
        bail!("{failed} job(s) did not succeed");
    }
    Ok(())
}

/// Dry-run output: the job's stages and tasks in execution order.
fn print_plan(plan: &JobPlan) {
    println!("clusterdag dry-run: {} ({:?})", plan.name, plan.kind);
    if plan.stages.is_empty() {
        println!("  (no stages)");
    }
    for (i, stage) in plan.stages.iter().enumerate() {
        println!(
            "  stage {}: {} [{}/{}]",
            i + 1,
            stage.name,
            stage.service_name.as_deref().unwrap_or("-"),
            stage.component_name.as_deref().unwrap_or("-"),
        );
        for task in &stage.tasks {
            println!("      - {}", task.name);
        }
    }
    println!();
}
