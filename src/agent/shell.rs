// src/agent/shell.rs

//! Process-backed agent.
//!
//! Each request renders the `[agent].command` template and runs it through
//! `shell -c`. The task context is exported as JSON in
//! `CLUSTERDAG_TASK_CONTEXT`. stdout and stderr are streamed line by line
//! into the task log; the exit status becomes the reply.
//!
//! In dry-run mode the rendered command is only logged and every request
//! succeeds.

use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::Context;
use shell_escape::unix::escape;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::agent::{AgentClient, AgentReply, AgentRequest, TaskLogSink};
use crate::config::AgentSection;
use crate::errors::Result;

#[derive(Debug, Clone)]
pub struct ShellAgent {
    template: String,
    shell: String,
    dry_run: bool,
}

impl ShellAgent {
    pub fn new(template: impl Into<String>, shell: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            shell: shell.into(),
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn from_config(agent: &AgentSection) -> Self {
        Self::new(agent.command.clone(), agent.shell.clone())
    }

    /// Substitute request fields into the command template.
    ///
    /// Every value is shell-quoted, so a substituted field is always a
    /// single word to `sh`.
    pub fn render(&self, request: &AgentRequest) -> String {
        let quote = |value: &str| escape(Cow::Borrowed(value)).into_owned();
        self.template
            .replace("{host}", &quote(&request.hostname))
            .replace("{service}", &quote(&request.service_name))
            .replace("{component}", &quote(&request.component_name))
            .replace("{command}", &quote(&request.action()))
            .replace("{task_id}", &request.task_id.to_string())
    }

    async fn run(&self, request: AgentRequest, log: TaskLogSink) -> anyhow::Result<AgentReply> {
        let rendered = self.render(&request);
        if self.dry_run {
            log.line(format!("dry-run: {rendered}"));
            return Ok(AgentReply::success("dry-run"));
        }

        let context_json =
            serde_json::to_string(&request.context).context("serializing task context")?;

        info!(
            task_id = request.task_id,
            hostname = %request.hostname,
            component = %request.component_name,
            command = %request.action(),
            cmd = %rendered,
            "starting agent process"
        );

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(&rendered)
            .env("CLUSTERDAG_TASK_CONTEXT", context_json)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning agent process for task {}", request.task_id))?;

        let stdout = child.stdout.take().map(|s| tokio::spawn(pump(s, log.clone())));
        let stderr = child.stderr.take().map(|s| tokio::spawn(pump(s, log.clone())));

        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for agent process of task {}", request.task_id))?;

        let mut last_line = None;
        if let Some(handle) = stdout {
            last_line = handle.await.context("joining stdout reader")?;
        }
        if let Some(handle) = stderr {
            let last_err = handle.await.context("joining stderr reader")?;
            if !status.success() && last_err.is_some() {
                last_line = last_err;
            }
        }

        let code = status.code().unwrap_or(-1);
        debug!(
            task_id = request.task_id,
            exit_code = code,
            success = status.success(),
            "agent process exited"
        );

        let message = last_line.unwrap_or_else(|| format!("exit status {code}"));
        Ok(if status.success() {
            AgentReply::success(message)
        } else {
            AgentReply::failure(code, message)
        })
    }
}

/// Forward every line of `reader` to the log; return the last one.
async fn pump<R>(reader: R, log: TaskLogSink) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut last = None;
    while let Ok(Some(line)) = lines.next_line().await {
        log.line(line.clone());
        last = Some(line);
    }
    last
}

impl AgentClient for ShellAgent {
    fn execute(
        &self,
        request: AgentRequest,
        log: TaskLogSink,
    ) -> Pin<Box<dyn Future<Output = Result<AgentReply>> + Send + '_>> {
        Box::pin(async move { Ok(self.run(request, log).await?) })
    }
}
