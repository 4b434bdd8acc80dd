use std::sync::Arc;

use crate::core::config::LockConfig;
use crate::scraping::RenamerSettings;
use crate::tasks::TaskRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TaskRegistry>,
    /// Template for each task's renamer; cookies are added per task.
    pub renamer_settings: Arc<RenamerSettings>,
    /// Shared secret required to start a task.
    access_key: Arc<str>,
    pub pages: Arc<crate::web::page::Pages>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("tasks", &self.registry.list_all().len())
            .field("candidate_urls", &self.renamer_settings.candidate_urls)
            .finish()
    }
}

impl AppState {
    pub fn new(config: &LockConfig, access_key: impl Into<Arc<str>>) -> anyhow::Result<Self> {
        Ok(Self {
            registry: Arc::new(TaskRegistry::new(config.poll_settings())),
            renamer_settings: Arc::new(config.renamer_settings()),
            access_key: access_key.into(),
            pages: Arc::new(crate::web::page::Pages::new()?),
        })
    }

    /// Constant-time comparison so response timing does not leak the key.
    pub fn access_key_matches(&self, candidate: &str) -> bool {
        let expected = self.access_key.as_bytes();
        let candidate = candidate.as_bytes();
        if expected.len() != candidate.len() {
            return false;
        }
        expected
            .iter()
            .zip(candidate)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}
