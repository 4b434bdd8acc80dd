use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::features::activity_log::{LogEntry, LogOutcome};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Form fields posted by the start page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartTaskForm {
    #[serde(default, alias = "accessKey")]
    pub access_key: String,
    #[serde(default, alias = "appState", alias = "appstate")]
    pub app_state: String,
    #[serde(default, alias = "groupUid", alias = "groupId", alias = "thread_id")]
    pub target_id: String,
    #[serde(default, alias = "groupName", alias = "name")]
    pub target_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    #[serde(default, alias = "groupId", alias = "target_id")]
    pub group_id: Option<String>,
    #[serde(default)]
    pub lines: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Initializing,
    Running,
    Stopping,
    Stopped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Initializing => "initializing",
            TaskStatus::Running => "running",
            TaskStatus::Stopping => "stopping",
            TaskStatus::Stopped => "stopped",
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, TaskStatus::Stopped)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a task, safe to hand to the web layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub target_id: String,
    pub target_name: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub last_message: Option<String>,
    pub rounds: u64,
    pub successes: u64,
    pub log_file: String,
    /// Oldest first, bounded by the configured recent cap.
    pub recent: Vec<LogEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    /// Submitted, but the name was not found on any verification page.
    Unconfirmed,
    Failure,
}

impl From<AttemptOutcome> for LogOutcome {
    fn from(outcome: AttemptOutcome) -> Self {
        match outcome {
            AttemptOutcome::Success => LogOutcome::Success,
            AttemptOutcome::Unconfirmed => LogOutcome::Unconfirmed,
            AttemptOutcome::Failure => LogOutcome::Failure,
        }
    }
}

/// Result of one rename round across all candidate URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptReport {
    pub outcome: AttemptOutcome,
    /// Candidate page that produced this report, when one was reached.
    pub url: Option<String>,
    pub message: String,
}

impl AttemptReport {
    pub fn success(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            outcome: AttemptOutcome::Success,
            url: Some(url.into()),
            message: message.into(),
        }
    }

    pub fn unconfirmed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            outcome: AttemptOutcome::Unconfirmed,
            url: Some(url.into()),
            message: message.into(),
        }
    }

    pub fn failure(url: Option<String>, message: impl Into<String>) -> Self {
        Self {
            outcome: AttemptOutcome::Failure,
            url,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == AttemptOutcome::Success
    }
}
