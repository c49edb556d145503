use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use clusterdag::agent::{AgentClient, AgentReply, AgentRequest, TaskLogSink};
use clusterdag::errors::Result;
use clusterdag::types::Command;

/// One request the agent received.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentCall {
    pub task_id: u64,
    pub hostname: String,
    pub component: String,
    pub command: Command,
    pub action: String,
}

impl AgentCall {
    /// `component:COMMAND@host`
    pub fn label(&self) -> String {
        format!("{}:{}@{}", self.component, self.command, self.hostname)
    }
}

#[derive(Debug, Clone)]
enum Behaviour {
    Fail(i32, String),
    Error(String),
    Hang,
}

#[derive(Debug, Clone)]
struct Rule {
    component: String,
    host: Option<String>,
    command: Option<Command>,
    behaviour: Behaviour,
    /// `None` applies forever.
    remaining: Option<usize>,
}

impl Rule {
    fn matches(&self, req: &AgentRequest) -> bool {
        self.component == req.component_name
            && self.host.as_ref().is_none_or(|h| *h == req.hostname)
            && self.command.is_none_or(|c| c == req.command)
            && self.remaining != Some(0)
    }
}

/// Pauses a component's task until the test releases it.
#[derive(Debug, Clone, Default)]
pub struct Gate {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

impl Gate {
    /// Wait until the gated task is running.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[derive(Debug, Default)]
struct Script {
    rules: Vec<Rule>,
    delays: HashMap<String, Duration>,
    host_delays: HashMap<(String, String), Duration>,
    lines: HashMap<String, Vec<String>>,
    gates: HashMap<String, Gate>,
    calls: Vec<AgentCall>,
    /// `start:<label>` and `finish:<label>` in the order they happened.
    events: Vec<String>,
}

/// Agent whose answers are scripted per component (and optionally host and
/// verb). Everything not scripted succeeds immediately.
///
/// Clones share the same script and call journal.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAgent {
    script: Arc<Mutex<Script>>,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self::default()
    }

    fn rule(&self, component: &str, host: Option<&str>, command: Option<Command>, behaviour: Behaviour, remaining: Option<usize>) {
        self.script.lock().unwrap().rules.push(Rule {
            component: component.to_string(),
            host: host.map(str::to_string),
            command,
            behaviour,
            remaining,
        });
    }

    /// Every task of `component` exits non-zero.
    pub fn fail(self, component: &str) -> Self {
        self.rule(component, None, None, Behaviour::Fail(1, format!("{component} failed")), None);
        self
    }

    pub fn fail_on(self, component: &str, host: &str) -> Self {
        self.rule(component, Some(host), None, Behaviour::Fail(1, format!("{component} failed on {host}")), None);
        self
    }

    pub fn fail_command(self, component: &str, command: Command) -> Self {
        self.rule(component, None, Some(command), Behaviour::Fail(2, format!("{component} {command} failed")), None);
        self
    }

    /// The first `times` tasks of `component` fail, later ones succeed.
    pub fn fail_times(self, component: &str, times: usize) -> Self {
        self.rule(component, None, None, Behaviour::Fail(1, format!("{component} flaked")), Some(times));
        self
    }

    /// The call itself errors, as if the agent was unreachable.
    pub fn unreachable(self, component: &str) -> Self {
        self.rule(component, None, None, Behaviour::Error(format!("connection refused for {component}")), None);
        self
    }

    /// Never answers.
    pub fn hang(self, component: &str) -> Self {
        self.rule(component, None, None, Behaviour::Hang, None);
        self
    }

    pub fn delay(self, component: &str, delay: Duration) -> Self {
        self.script
            .lock()
            .unwrap()
            .delays
            .insert(component.to_string(), delay);
        self
    }

    /// Like [`ScriptedAgent::delay`] but only on `host`; wins over the
    /// component-wide delay.
    pub fn delay_on(self, component: &str, host: &str, delay: Duration) -> Self {
        self.script
            .lock()
            .unwrap()
            .host_delays
            .insert((component.to_string(), host.to_string()), delay);
        self
    }

    /// Output written to the task log before answering.
    pub fn lines(self, component: &str, lines: &[&str]) -> Self {
        self.script
            .lock()
            .unwrap()
            .lines
            .insert(component.to_string(), lines.iter().map(|l| l.to_string()).collect());
        self
    }

    pub fn gate(&self, component: &str) -> Gate {
        let gate = Gate::default();
        self.script
            .lock()
            .unwrap()
            .gates
            .insert(component.to_string(), gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<AgentCall> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.calls().iter().map(AgentCall::label).collect()
    }

    /// Start and finish of every answered call. Hanging calls never finish.
    pub fn events(&self) -> Vec<String> {
        self.script.lock().unwrap().events.clone()
    }

    async fn answer(&self, request: AgentRequest, log: TaskLogSink) -> Result<AgentReply> {
        let call = AgentCall {
            task_id: request.task_id,
            hostname: request.hostname.clone(),
            component: request.component_name.clone(),
            command: request.command,
            action: request.action(),
        };
        let label = call.label();
        let (behaviour, delay, lines, gate) = {
            let mut script = self.script.lock().unwrap();
            script.events.push(format!("start:{label}"));
            script.calls.push(call);

            let behaviour = match script.rules.iter_mut().find(|r| r.matches(&request)) {
                Some(rule) => {
                    if let Some(n) = rule.remaining.as_mut() {
                        *n -= 1;
                    }
                    Some(rule.behaviour.clone())
                }
                None => None,
            };
            let component = &request.component_name;
            (
                behaviour,
                script
                    .host_delays
                    .get(&(component.clone(), request.hostname.clone()))
                    .or_else(|| script.delays.get(component))
                    .copied(),
                script.lines.get(component).cloned().unwrap_or_default(),
                script.gates.get(component).cloned(),
            )
        };

        for line in lines {
            log.line(line);
        }
        if let Some(gate) = gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let reply = match behaviour {
            None => Ok(AgentReply::success(format!("{} ok", request.action()))),
            Some(Behaviour::Fail(code, message)) => Ok(AgentReply::failure(code, message)),
            Some(Behaviour::Error(message)) => Err(anyhow::anyhow!(message).into()),
            Some(Behaviour::Hang) => std::future::pending().await,
        };
        self.script.lock().unwrap().events.push(format!("finish:{label}"));
        reply
    }
}

impl AgentClient for ScriptedAgent {
    fn execute(
        &self,
        request: AgentRequest,
        log: TaskLogSink,
    ) -> Pin<Box<dyn Future<Output = Result<AgentReply>> + Send + '_>> {
        Box::pin(self.answer(request, log))
    }
}
