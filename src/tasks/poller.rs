//! Background re-lock loop, one per task.
//!
//! Each round runs a [`RenameAttempt`], records the outcome, then waits out
//! the interval.  Both the round and the wait race the task's stop signal, so
//! a stop lands within one interval at worst.  The task reaches `stopped` on
//! every exit path, including a panic inside the loop.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use super::handle::TaskHandle;
use crate::features::activity_log::{LogAction, LogOutcome};
use crate::scraping::RenameAttempt;
use crate::types::AttemptReport;

struct StoppedGuard(Arc<TaskHandle>);

impl Drop for StoppedGuard {
    fn drop(&mut self) {
        self.0.mark_stopped();
    }
}

pub async fn run(handle: Arc<TaskHandle>, renamer: Arc<dyn RenameAttempt>, interval: Duration) {
    let _guard = StoppedGuard(handle.clone());
    let stop = handle.stop_signal().clone();

    if handle.mark_running() {
        info!(
            "task {} running: locking '{}' on {} every {:?}",
            handle.id, handle.target_name, handle.target_id, interval
        );
        handle
            .log(
                LogAction::Start,
                LogOutcome::Info,
                format!("Lock started for '{}' every {}s", handle.target_name, interval.as_secs_f64()),
            )
            .await;
    }

    while !stop.is_cancelled() {
        let round = AssertUnwindSafe(renamer.attempt(&handle.target_id, &handle.target_name))
            .catch_unwind();

        let report = tokio::select! {
            _ = stop.cancelled() => break,
            result = round => result.unwrap_or_else(|_| {
                error!("task {}: rename attempt panicked", handle.id);
                AttemptReport::failure(None, "rename attempt panicked")
            }),
        };

        handle.record_round(&report);
        handle
            .log(LogAction::Lock, report.outcome.into(), report.message.clone())
            .await;

        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!("task {} stopping", handle.id);
    handle
        .log(LogAction::Stop, LogOutcome::Info, "Lock stopped")
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        calls: AtomicUsize,
        panic_on_call: Option<usize>,
    }

    #[async_trait]
    impl RenameAttempt for Scripted {
        async fn attempt(&self, _target: &str, _name: &str) -> AttemptReport {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panic_on_call == Some(n) {
                panic!("scripted panic");
            }
            AttemptReport::failure(None, format!("round {n} failed"))
        }
    }

    /// Never completes, standing in for a request stuck on the network.
    struct Hanging;

    #[async_trait]
    impl RenameAttempt for Hanging {
        async fn attempt(&self, _target: &str, _name: &str) -> AttemptReport {
            futures::future::pending::<()>().await;
            unreachable!()
        }
    }

    fn handle(dir: &tempfile::TempDir, cap: usize) -> Arc<TaskHandle> {
        Arc::new(TaskHandle::new(
            "task-1".into(),
            "42".into(),
            "Locked".into(),
            dir.path().join("log_task-1.jsonl"),
            cap,
        ))
    }

    async fn wait_for_status(handle: &TaskHandle, want: TaskStatus, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        while tokio::time::Instant::now() < deadline {
            if handle.status() == want {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.status() == want
    }

    #[tokio::test]
    async fn runs_then_stops_within_one_interval() {
        let dir = tempfile::tempdir().unwrap();
        let h = handle(&dir, 50);
        assert_eq!(h.status(), TaskStatus::Initializing);

        let renamer = Arc::new(Scripted { calls: AtomicUsize::new(0), panic_on_call: None });
        let interval = Duration::from_millis(200);
        tokio::spawn(run(h.clone(), renamer.clone(), interval));

        assert!(wait_for_status(&h, TaskStatus::Running, Duration::from_secs(1)).await);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(h.request_stop());
        assert!(wait_for_status(&h, TaskStatus::Stopped, interval).await);

        let snap = h.snapshot();
        assert!(snap.rounds >= 1);
        assert_eq!(snap.recent.first().map(|e| e.action), Some(LogAction::Start));
        assert_eq!(snap.recent.last().map(|e| e.action), Some(LogAction::Stop));
        assert!(snap
            .recent
            .iter()
            .any(|e| e.action == LogAction::Lock && e.outcome == LogOutcome::Failure));
    }

    #[tokio::test]
    async fn panicking_round_is_logged_and_loop_continues() {
        let dir = tempfile::tempdir().unwrap();
        let h = handle(&dir, 50);
        let renamer = Arc::new(Scripted { calls: AtomicUsize::new(0), panic_on_call: Some(0) });
        tokio::spawn(run(h.clone(), renamer.clone(), Duration::from_millis(10)));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while renamer.calls.load(Ordering::SeqCst) < 3 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        h.request_stop();
        assert!(wait_for_status(&h, TaskStatus::Stopped, Duration::from_secs(1)).await);

        let snap = h.snapshot();
        assert!(snap.recent.iter().any(|e| e.message.contains("panicked")));
        assert!(renamer.calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn stop_interrupts_a_hanging_round() {
        let dir = tempfile::tempdir().unwrap();
        let h = handle(&dir, 50);
        tokio::spawn(run(h.clone(), Arc::new(Hanging), Duration::from_secs(60)));

        assert!(wait_for_status(&h, TaskStatus::Running, Duration::from_secs(1)).await);
        h.request_stop();
        assert!(wait_for_status(&h, TaskStatus::Stopped, Duration::from_millis(500)).await);
        assert_eq!(h.snapshot().rounds, 0);
    }

    #[tokio::test]
    async fn recent_buffer_respects_cap_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let h = handle(&dir, 4);
        let renamer = Arc::new(Scripted { calls: AtomicUsize::new(0), panic_on_call: None });
        tokio::spawn(run(h.clone(), renamer.clone(), Duration::from_millis(1)));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while renamer.calls.load(Ordering::SeqCst) < 10 && tokio::time::Instant::now() < deadline {
            assert!(h.snapshot().recent.len() <= 4);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        h.request_stop();
        assert!(wait_for_status(&h, TaskStatus::Stopped, Duration::from_secs(1)).await);

        let snap = h.snapshot();
        assert_eq!(snap.recent.len(), 4);
        assert_eq!(snap.recent.last().map(|e| e.action), Some(LogAction::Stop));
        // Oldest entries (the start line) were evicted first.
        assert!(snap.recent.iter().all(|e| e.action != LogAction::Start));
    }
}
