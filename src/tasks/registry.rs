//! In-memory task registry.
//!
//! Tasks are never evicted; a stopped task stays visible through `get` and
//! its log file stays on disk.  Everything is lost on restart except the log
//! files.
//!
//! ## Locking
//!
//! The map sits behind a `std::sync::RwLock` that is never held across an
//! `.await`.  The duplicate-target check and the insert happen under one write
//! lock, so two concurrent starts for the same target cannot both win.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use super::handle::TaskHandle;
use super::poller;
use crate::features::activity_log;
use crate::scraping::RenameAttempt;
use crate::types::TaskSnapshot;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("target {target_id} is already locked by task {task_id}")]
    TargetActive { target_id: String, task_id: String },
    #[error("cannot prepare log directory: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub recent_cap: usize,
    pub logs_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub target_id: String,
    pub target_name: String,
}

#[derive(Debug)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, Arc<TaskHandle>>>,
    settings: PollSettings,
}

impl TaskRegistry {
    pub fn new(settings: PollSettings) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<TaskHandle>>> {
        self.tasks.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<TaskHandle>>> {
        self.tasks.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a task and spawn its poller. Must be called inside a tokio runtime.
    pub async fn start(
        &self,
        spec: TaskSpec,
        renamer: Arc<dyn RenameAttempt>,
    ) -> Result<TaskSnapshot, RegistryError> {
        tokio::fs::create_dir_all(&self.settings.logs_dir).await?;

        let id = uuid::Uuid::new_v4().to_string();
        let handle = Arc::new(TaskHandle::new(
            id.clone(),
            spec.target_id.clone(),
            spec.target_name.clone(),
            activity_log::log_path(&self.settings.logs_dir, &id),
            self.settings.recent_cap,
        ));

        {
            let mut tasks = self.write();
            if let Some(existing) = tasks
                .values()
                .find(|t| t.target_id == spec.target_id && t.status().is_active())
            {
                return Err(RegistryError::TargetActive {
                    target_id: spec.target_id,
                    task_id: existing.id.clone(),
                });
            }
            tasks.insert(id.clone(), handle.clone());
        }

        info!(
            "task {} created for target {} ('{}')",
            id, handle.target_id, handle.target_name
        );
        let snapshot = handle.snapshot();
        tokio::spawn(poller::run(handle, renamer, self.settings.interval));
        Ok(snapshot)
    }

    /// Signal a task to stop without waiting for it. `None` if the id is unknown.
    pub fn stop(&self, id: &str) -> Option<TaskSnapshot> {
        let handle = self.read().get(id).cloned()?;
        if handle.request_stop() {
            info!("task {} stop requested", id);
        }
        Some(handle.snapshot())
    }

    pub fn get(&self, id: &str) -> Option<TaskSnapshot> {
        self.read().get(id).map(|h| h.snapshot())
    }

    pub fn log_file(&self, id: &str) -> Option<PathBuf> {
        self.read().get(id).map(|h| h.log_file.clone())
    }

    /// Newest first.
    pub fn list_all(&self) -> Vec<TaskSnapshot> {
        let mut all: Vec<TaskSnapshot> = self.read().values().map(|h| h.snapshot()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    /// Tasks that have not reached `stopped`, newest first.
    pub fn list_active(&self) -> Vec<TaskSnapshot> {
        self.list_all()
            .into_iter()
            .filter(|t| t.status.is_active())
            .collect()
    }

    /// Most recently created task for a target, active or not.
    pub fn latest_for_target(&self, target_id: &str) -> Option<TaskSnapshot> {
        self.list_all().into_iter().find(|t| t.target_id == target_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AttemptReport, TaskStatus};
    use async_trait::async_trait;

    struct AlwaysOk;

    #[async_trait]
    impl RenameAttempt for AlwaysOk {
        async fn attempt(&self, target: &str, name: &str) -> AttemptReport {
            AttemptReport::success(format!("mock://{target}"), format!("Locked '{name}'"))
        }
    }

    fn registry(dir: &tempfile::TempDir) -> TaskRegistry {
        TaskRegistry::new(PollSettings {
            interval: Duration::from_millis(20),
            recent_cap: 10,
            logs_dir: dir.path().join("logs"),
        })
    }

    fn spec(target: &str) -> TaskSpec {
        TaskSpec {
            target_id: target.into(),
            target_name: "Locked".into(),
        }
    }

    async fn until_stopped(reg: &TaskRegistry, id: &str) -> TaskSnapshot {
        for _ in 0..200 {
            let snap = reg.get(id).unwrap();
            if snap.status == TaskStatus::Stopped {
                return snap;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {id} never stopped");
    }

    #[tokio::test]
    async fn start_stop_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(&dir);

        let snap = reg.start(spec("42"), Arc::new(AlwaysOk)).await.unwrap();
        assert_eq!(snap.target_id, "42");
        assert_eq!(reg.list_active().len(), 1);
        assert!(reg.get(&snap.id).is_some());
        assert!(reg.log_file(&snap.id).unwrap().starts_with(dir.path().join("logs")));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let stopped = reg.stop(&snap.id).unwrap();
        assert!(matches!(stopped.status, TaskStatus::Stopping | TaskStatus::Stopped));

        let done = until_stopped(&reg, &snap.id).await;
        assert!(done.successes >= 1);
        assert!(reg.list_active().is_empty());
        assert_eq!(reg.list_all().len(), 1);
        assert_eq!(reg.latest_for_target("42").map(|t| t.id), Some(snap.id.clone()));
    }

    #[tokio::test]
    async fn rejects_second_active_task_for_same_target() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(&dir);

        let first = reg.start(spec("42"), Arc::new(AlwaysOk)).await.unwrap();
        let err = reg.start(spec("42"), Arc::new(AlwaysOk)).await.unwrap_err();
        assert!(matches!(err, RegistryError::TargetActive { ref task_id, .. } if *task_id == first.id));

        reg.start(spec("43"), Arc::new(AlwaysOk)).await.unwrap();
        assert_eq!(reg.list_active().len(), 2);

        reg.stop(&first.id);
        until_stopped(&reg, &first.id).await;
        assert!(reg.start(spec("42"), Arc::new(AlwaysOk)).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_ids_are_none() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(&dir);
        assert!(reg.stop("missing").is_none());
        assert!(reg.get("missing").is_none());
        assert!(reg.latest_for_target("42").is_none());
    }
}
