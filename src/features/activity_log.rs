//! Per-task activity log: one append-only NDJSON file per task.
//!
//! Files live under the configured logs directory as `log_<task_id>.jsonl`
//! and outlive the process; the in-memory tail (see [`super::recent`]) does
//! not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    Start,
    Lock,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOutcome {
    Success,
    /// The POST went through but the new name could not be confirmed.
    Unconfirmed,
    Failure,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub task_id: String,
    pub target_id: String,
    pub target_name: String,
    pub action: LogAction,
    pub outcome: LogOutcome,
    pub message: String,
}

pub fn log_path(logs_dir: &Path, task_id: &str) -> PathBuf {
    logs_dir.join(format!("log_{}.jsonl", task_id))
}

/// Append one entry as a single JSON line, creating the file on first write.
pub async fn append(path: &Path, entry: &LogEntry) -> anyhow::Result<()> {
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Last `n` lines of a log file. A missing file reads as empty.
pub async fn tail(path: &Path, n: usize) -> std::io::Result<Vec<String>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    let skip = lines.len().saturating_sub(n);
    Ok(lines[skip..].iter().map(|l| l.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(i: usize) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            task_id: "t1".into(),
            target_id: "42".into(),
            target_name: "Locked".into(),
            action: LogAction::Lock,
            outcome: LogOutcome::Failure,
            message: format!("round {i}"),
        }
    }

    #[tokio::test]
    async fn appends_ndjson_and_tails_last_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = log_path(dir.path(), "t1");
        for i in 0..5 {
            append(&path, &entry(i)).await.unwrap();
        }

        let lines = tail(&path, 2).await.unwrap();
        assert_eq!(lines.len(), 2);
        let last: LogEntry = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(last.message, "round 4");
        assert_eq!(last.outcome, LogOutcome::Failure);
        assert!(lines[0].contains("\"action\":\"lock\""));
    }

    #[tokio::test]
    async fn missing_file_tails_empty() {
        let dir = tempfile::tempdir().unwrap();
        let lines = tail(&dir.path().join("nope.jsonl"), 10).await.unwrap();
        assert!(lines.is_empty());
    }
}
