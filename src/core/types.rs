use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// State of a workflow or step record.
///
/// The compiler only ever emits `Pending` or `Skipped`; the remaining
/// states belong to the executor that consumes the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    #[default]
    Pending,
    Running,
    Success,
    Failure,
    Skipped,
}

/// Forge event that triggered the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    #[default]
    Push,
    PullRequest,
    Tag,
    Deployment,
    Cron,
    Manual,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull_request",
            EventKind::Tag => "tag",
            EventKind::Deployment => "deployment",
            EventKind::Cron => "cron",
            EventKind::Manual => "manual",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(EventKind::Push),
            "pull_request" => Ok(EventKind::PullRequest),
            "tag" => Ok(EventKind::Tag),
            "deployment" => Ok(EventKind::Deployment),
            "cron" => Ok(EventKind::Cron),
            "manual" => Ok(EventKind::Manual),
            other => Err(format!("unknown event kind: {}", other)),
        }
    }
}

/// Cooperative cancellation flag checked at component boundaries.
///
/// Compilations are synchronous; the surrounding orchestrator sets the
/// flag from another thread and the builder aborts at the next boundary.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
