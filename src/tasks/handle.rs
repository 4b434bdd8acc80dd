use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::warn;

use crate::features::activity_log::{self, LogAction, LogEntry, LogOutcome};
use crate::features::recent::RecentLog;
use crate::types::{AttemptReport, TaskSnapshot, TaskStatus};

/// Cooperative cancellation token shared by the registry and one poller.
///
/// Cancelling is idempotent and never blocks; the poller observes it between
/// rounds and while waiting out the interval.
#[derive(Clone, Debug)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    last_message: Option<String>,
    rounds: u64,
    successes: u64,
    recent: RecentLog<LogEntry>,
}

/// One lock task: immutable identity plus state mutated only by its poller
/// and by stop requests.
#[derive(Debug)]
pub struct TaskHandle {
    pub id: String,
    pub target_id: String,
    pub target_name: String,
    pub created_at: DateTime<Utc>,
    pub log_file: PathBuf,
    stop: StopSignal,
    state: Mutex<TaskState>,
}

impl TaskHandle {
    pub fn new(
        id: String,
        target_id: String,
        target_name: String,
        log_file: PathBuf,
        recent_cap: usize,
    ) -> Self {
        Self {
            id,
            target_id,
            target_name,
            created_at: Utc::now(),
            log_file,
            stop: StopSignal::new(),
            state: Mutex::new(TaskState {
                status: TaskStatus::Initializing,
                last_message: None,
                rounds: 0,
                successes: 0,
                recent: RecentLog::new(recent_cap),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    pub fn status(&self) -> TaskStatus {
        self.state().status
    }

    /// `initializing -> running`; a stop that raced ahead of the poller wins.
    pub fn mark_running(&self) -> bool {
        let mut state = self.state();
        if state.status == TaskStatus::Initializing && !self.stop.is_cancelled() {
            state.status = TaskStatus::Running;
            true
        } else {
            false
        }
    }

    /// Signals the poller. Returns `false` if the task had already stopped.
    pub fn request_stop(&self) -> bool {
        let mut state = self.state();
        if state.status == TaskStatus::Stopped {
            return false;
        }
        state.status = TaskStatus::Stopping;
        drop(state);
        self.stop.cancel();
        true
    }

    pub fn mark_stopped(&self) {
        self.state().status = TaskStatus::Stopped;
    }

    pub fn record_round(&self, report: &AttemptReport) {
        let mut state = self.state();
        state.rounds += 1;
        if report.is_success() {
            state.successes += 1;
        }
        state.last_message = Some(report.message.clone());
    }

    /// Push to the in-memory tail and append to the task's log file.
    /// File errors are logged, never propagated.
    pub async fn log(&self, action: LogAction, outcome: LogOutcome, message: impl Into<String>) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            task_id: self.id.clone(),
            target_id: self.target_id.clone(),
            target_name: self.target_name.clone(),
            action,
            outcome,
            message: message.into(),
        };
        self.state().recent.push(entry.clone());
        if let Err(e) = activity_log::append(&self.log_file, &entry).await {
            warn!("task {}: failed to write {}: {}", self.id, self.log_file.display(), e);
        }
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let state = self.state();
        TaskSnapshot {
            id: self.id.clone(),
            target_id: self.target_id.clone(),
            target_name: self.target_name.clone(),
            status: state.status,
            created_at: self.created_at,
            last_message: state.last_message.clone(),
            rounds: state.rounds,
            successes: state.successes,
            log_file: self.log_file.to_string_lossy().to_string(),
            recent: state.recent.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn handle(cap: usize) -> TaskHandle {
        let dir = std::env::temp_dir().join("name-lock-handle-tests");
        TaskHandle::new("t".into(), "42".into(), "Name".into(), dir.join("log_t.jsonl"), cap)
    }

    #[tokio::test]
    async fn cancelled_resolves_after_cancel() {
        let signal = StopSignal::new();
        let waiter = signal.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        signal.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("cancelled() should resolve")
            .unwrap();
        assert!(signal.is_cancelled());
    }

    #[test]
    fn stop_before_start_keeps_task_from_running() {
        let h = handle(5);
        assert!(h.request_stop());
        assert!(!h.mark_running());
        assert_eq!(h.status(), TaskStatus::Stopping);
        h.mark_stopped();
        assert!(!h.request_stop());
        assert_eq!(h.status(), TaskStatus::Stopped);
    }

    #[test]
    fn record_round_counts_successes() {
        let h = handle(5);
        h.record_round(&AttemptReport::failure(None, "nope"));
        h.record_round(&AttemptReport::success("u", "ok"));
        let snap = h.snapshot();
        assert_eq!(snap.rounds, 2);
        assert_eq!(snap.successes, 1);
        assert_eq!(snap.last_message.as_deref(), Some("ok"));
    }
}
