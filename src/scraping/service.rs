use crate::types::AttemptReport;
use async_trait::async_trait;

/// One rename round against the remote site.
///
/// Implementations must not panic or bubble errors: every failure is folded
/// into the returned report so the poller can log it and keep going.
#[async_trait]
pub trait RenameAttempt: Send + Sync {
    async fn attempt(&self, target_id: &str, desired_name: &str) -> AttemptReport;
}
