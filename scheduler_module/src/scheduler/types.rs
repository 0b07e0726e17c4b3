use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A scheduled message task owned by one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub session_id: String,
    pub trigger: Trigger,
    /// Message body. A task with empty content stays registered but never fires.
    #[serde(default)]
    pub content: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_fired_at: Option<DateTime<Utc>>,
    /// Delivery handle passed to the dispatch adapter.
    pub target: String,
}

/// When a task fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Every `minutes` minutes, measured from the last firing
    /// (or from creation before the first one).
    Interval { minutes: f64 },
    /// Once, `delay_minutes` minutes after creation, then the task is removed.
    Once { delay_minutes: f64 },
    /// Every day when the configured wall clock reads `hour:minute`.
    Fixed { hour: u32, minute: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Active,
    Paused,
}

/// Trigger discriminant used when registering from textual commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Interval,
    Once,
    Fixed,
}

impl TriggerKind {
    pub fn label(&self) -> &'static str {
        match self {
            TriggerKind::Interval => "interval",
            TriggerKind::Once => "once",
            TriggerKind::Fixed => "fixed",
        }
    }
}

impl FromStr for TriggerKind {
    type Err = SchedulerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "interval" => Ok(TriggerKind::Interval),
            "once" => Ok(TriggerKind::Once),
            "fixed" => Ok(TriggerKind::Fixed),
            other => Err(SchedulerError::UnknownKind(other.to_string())),
        }
    }
}

/// Dedupe key recording that a fixed task already fired in a given
/// wall-clock minute of a given day.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FireMarker {
    pub session_id: String,
    pub task_id: u64,
    pub day: NaiveDate,
    pub hour: u32,
    pub minute: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid {kind} time parameter: {value}")]
    InvalidTimeParam { kind: &'static str, value: String },
    #[error("unknown trigger kind: {0}")]
    UnknownKind(String),
    #[error("task {id} not found in session {session}")]
    NotFound { session: String, id: u64 },
    #[error("storage error: {0}")]
    Storage(String),
    #[error("dispatch failed: {0}")]
    Dispatch(String),
    #[error("config error: {0}")]
    Config(String),
}
