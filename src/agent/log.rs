// src/agent/log.rs

//! In-memory task log streaming.
//!
//! While a task runs, its output lines are appended to a bounded buffer and
//! fanned out to every live subscriber. A subscriber that arrives late first
//! receives the buffered backlog. Closing a task drops its buffer and its
//! senders, which ends every subscriber stream.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::trace;

use crate::model::TaskId;

#[derive(Debug, Default)]
struct LogEntry {
    lines: VecDeque<String>,
    subscribers: Vec<mpsc::UnboundedSender<String>>,
}

/// Shared registry of running task logs. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TaskLogHub {
    entries: Arc<Mutex<HashMap<TaskId, LogEntry>>>,
    capacity: usize,
}

impl TaskLogHub {
    /// `capacity` bounds the backlog kept per task.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, LogEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Start collecting output for `task_id`. Reopening clears the backlog.
    pub fn open(&self, task_id: TaskId) -> TaskLogSink {
        self.lock().insert(task_id, LogEntry::default());
        TaskLogSink {
            hub: self.clone(),
            task_id,
        }
    }

    /// Append a line; ignored if the task is not open.
    pub fn append(&self, task_id: TaskId, line: impl Into<String>) {
        let line = line.into();
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(&task_id) else {
            trace!(task_id, "log line for closed task dropped");
            return;
        };

        entry.subscribers.retain(|tx| tx.send(line.clone()).is_ok());
        entry.lines.push_back(line);
        while entry.lines.len() > self.capacity {
            entry.lines.pop_front();
        }
    }

    /// Follow a running task: backlog first, then live lines until close.
    pub fn subscribe(&self, task_id: TaskId) -> Option<TaskLogStream> {
        let mut entries = self.lock();
        let entry = entries.get_mut(&task_id)?;
        let (tx, rx) = mpsc::unbounded_channel();
        entry.subscribers.push(tx);
        Some(TaskLogStream {
            backlog: entry.lines.iter().cloned().collect(),
            rx,
        })
    }

    /// Stop streaming `task_id` and free its buffer.
    pub fn close(&self, task_id: TaskId) {
        self.lock().remove(&task_id);
    }

    pub fn is_open(&self, task_id: TaskId) -> bool {
        self.lock().contains_key(&task_id)
    }

    /// Number of tasks currently streaming.
    pub fn open_count(&self) -> usize {
        self.lock().len()
    }
}

/// Write handle for one task's log.
#[derive(Debug, Clone)]
pub struct TaskLogSink {
    hub: TaskLogHub,
    task_id: TaskId,
}

impl TaskLogSink {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn line(&self, line: impl Into<String>) {
        self.hub.append(self.task_id, line);
    }
}

/// Read side returned by [`TaskLogHub::subscribe`].
#[derive(Debug)]
pub struct TaskLogStream {
    backlog: VecDeque<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl TaskLogStream {
    /// Next line, or `None` once the task closed and everything was read.
    pub async fn next_line(&mut self) -> Option<String> {
        if let Some(line) = self.backlog.pop_front() {
            return Some(line);
        }
        self.rx.recv().await
    }

    /// Read until the stream ends.
    pub async fn collect(mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(line) = self.next_line().await {
            out.push(line);
        }
        out
    }
}
