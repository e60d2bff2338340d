use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Severity decides whether a result is shown by print_result
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

/// TaskResult is the outcome of one task (or subtask) on one host
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub host: String,
    pub name: String,
    pub changed: bool,
    pub failed: bool,
    pub severity: Severity,
    pub result: Option<String>,
    pub diff: Option<String>,
    pub exception: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn new(host: &str, name: &str) -> Self {
        Self {
            host: host.to_string(),
            name: name.to_string(),
            changed: false,
            failed: false,
            severity: Severity::Info,
            result: None,
            diff: None,
            exception: None,
            finished_at: Utc::now(),
        }
    }

    /// Build a failed result from an error. Severity is raised to ERROR.
    pub fn failure(host: &str, name: &str, err: &anyhow::Error) -> Self {
        Self {
            failed: true,
            severity: Severity::Error,
            exception: Some(format!("{:#}", err)),
            ..Self::new(host, name)
        }
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    /// Attach pending changes. Only a commit marks a result changed.
    pub fn with_diff(mut self, diff: Option<String>) -> Self {
        self.diff = diff;
        self
    }

    pub fn with_changed(mut self, changed: bool) -> Self {
        self.changed = changed;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        // A failure is always reported
        if !self.failed {
            self.severity = severity;
        }
        self
    }

    /// A result is truthy when the task did not fail
    pub fn is_ok(&self) -> bool {
        !self.failed
    }
}

/// MultiResult holds every result produced for one host by a task:
/// the task's own result first, then its subtasks in execution order.
#[derive(Debug, Clone)]
pub struct MultiResult {
    pub name: String,
    pub started_at: DateTime<Utc>,
    results: Vec<TaskResult>,
}

impl MultiResult {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            started_at: Utc::now(),
            results: Vec::new(),
        }
    }

    pub fn push(&mut self, result: TaskResult) {
        self.results.push(result);
    }

    /// Place the parent task's result ahead of its subtasks
    pub fn set_parent(&mut self, result: TaskResult) {
        self.results.insert(0, result);
    }

    pub fn failed(&self) -> bool {
        self.results.iter().any(|r| r.failed)
    }

    pub fn changed(&self) -> bool {
        self.results.iter().any(|r| r.changed)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskResult> {
        self.results.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Time from creation to the latest finished result
    pub fn elapsed(&self) -> chrono::Duration {
        self.results
            .iter()
            .map(|r| r.finished_at)
            .max()
            .map(|end| end - self.started_at)
            .unwrap_or_else(chrono::Duration::zero)
    }
}

/// AggregatedResult collects per-host results for one task run
#[derive(Debug, Clone)]
pub struct AggregatedResult {
    pub name: String,
    hosts: BTreeMap<String, MultiResult>,
}

impl AggregatedResult {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hosts: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, host: &str, result: MultiResult) {
        self.hosts.insert(host.to_string(), result);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MultiResult)> {
        self.hosts.iter()
    }

    pub fn failed_hosts(&self) -> Vec<&str> {
        self.hosts
            .iter()
            .filter(|(_, r)| r.failed())
            .map(|(h, _)| h.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}
