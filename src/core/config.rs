use std::path::PathBuf;
use std::time::Duration;

use crate::scraping::form::{FieldPolicy, DEFAULT_RENAME_FIELDS, DEFAULT_TOKEN_FIELDS};
use crate::scraping::RenamerSettings;
use crate::tasks::PollSettings;

// ---------------------------------------------------------------------------
// LockConfig — file-based config loader (name-lock.json) with env-var fallback
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "NAME_LOCK_CONFIG";
pub const ENV_ACCESS_KEY: &str = "NAME_LOCK_ACCESS_KEY";
pub const ENV_INTERVAL_SECS: &str = "NAME_LOCK_INTERVAL_SECS";
pub const ENV_RECENT_CAP: &str = "NAME_LOCK_RECENT_CAP";
pub const ENV_LOGS_DIR: &str = "NAME_LOCK_LOGS_DIR";
pub const ENV_CANDIDATE_URLS: &str = "NAME_LOCK_CANDIDATE_URLS";
pub const ENV_VERIFY_URLS: &str = "NAME_LOCK_VERIFY_URLS";

pub const DEFAULT_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_RECENT_CAP: usize = 50;

/// Where the rename form usually lives. `{target}` is the thread/group id.
pub const DEFAULT_CANDIDATE_URLS: &[&str] = &[
    "https://mbasic.facebook.com/messages/edit/thread/name/?tid={target}",
    "https://mbasic.facebook.com/messages/read/?tid={target}",
];

/// Pages that render the thread's current name.
pub const DEFAULT_VERIFY_URLS: &[&str] = &[
    "https://mbasic.facebook.com/messages/read/?tid={target}",
    "https://m.facebook.com/messages/read/?tid={target}",
];

/// Top-level config loaded from `name-lock.json`.
///
/// Every field is optional; `resolve_*` applies JSON field → env var → default.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct LockConfig {
    /// Seconds between re-lock rounds. Default: 5, clamped to 1..=3600.
    pub poll_interval_secs: Option<u64>,
    /// In-memory activity entries kept per task. Default: 50.
    pub recent_cap: Option<usize>,
    /// Directory for per-task NDJSON logs. Default: `logs`.
    pub logs_dir: Option<String>,
    /// Rename-form page templates, tried in order.
    pub candidate_urls: Option<Vec<String>>,
    /// Verification page templates.
    pub verify_urls: Option<Vec<String>>,
    /// Rename-field names, highest priority first.
    pub rename_fields: Option<Vec<String>>,
    /// Anti-forgery token field names.
    pub token_fields: Option<Vec<String>>,
    pub http_timeout_secs: Option<u64>,
    pub http_connect_timeout_secs: Option<u64>,
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_nonempty(key).and_then(|v| v.parse().ok())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    let list: Vec<String> = env_nonempty(key)?
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    (!list.is_empty()).then_some(list)
}

fn non_empty(list: &Option<Vec<String>>) -> Option<Vec<String>> {
    list.as_ref().filter(|l| !l.is_empty()).cloned()
}

fn owned(defaults: &[&str]) -> Vec<String> {
    defaults.iter().map(|s| s.to_string()).collect()
}

impl LockConfig {
    /// Interval: JSON field → `NAME_LOCK_INTERVAL_SECS` → 5s.
    pub fn resolve_interval(&self) -> Duration {
        let secs = self
            .poll_interval_secs
            .or_else(|| env_parse(ENV_INTERVAL_SECS))
            .unwrap_or(DEFAULT_INTERVAL_SECS)
            .clamp(1, 3600);
        Duration::from_secs(secs)
    }

    /// Recent cap: JSON field → `NAME_LOCK_RECENT_CAP` → 50.
    pub fn resolve_recent_cap(&self) -> usize {
        self.recent_cap
            .or_else(|| env_parse(ENV_RECENT_CAP))
            .unwrap_or(DEFAULT_RECENT_CAP)
            .max(1)
    }

    /// Logs dir: JSON field → `NAME_LOCK_LOGS_DIR` → `./logs`.
    pub fn resolve_logs_dir(&self) -> PathBuf {
        self.logs_dir
            .as_ref()
            .filter(|d| !d.trim().is_empty())
            .cloned()
            .or_else(|| env_nonempty(ENV_LOGS_DIR))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("logs"))
    }

    /// Candidates: JSON list → `NAME_LOCK_CANDIDATE_URLS` (comma-separated) → built-in list.
    pub fn resolve_candidate_urls(&self) -> Vec<String> {
        non_empty(&self.candidate_urls)
            .or_else(|| env_list(ENV_CANDIDATE_URLS))
            .unwrap_or_else(|| owned(DEFAULT_CANDIDATE_URLS))
    }

    /// Verify pages: JSON list → `NAME_LOCK_VERIFY_URLS` → built-in list.
    pub fn resolve_verify_urls(&self) -> Vec<String> {
        non_empty(&self.verify_urls)
            .or_else(|| env_list(ENV_VERIFY_URLS))
            .unwrap_or_else(|| owned(DEFAULT_VERIFY_URLS))
    }

    pub fn resolve_field_policy(&self) -> FieldPolicy {
        FieldPolicy {
            rename_fields: non_empty(&self.rename_fields)
                .unwrap_or_else(|| owned(DEFAULT_RENAME_FIELDS)),
            token_fields: non_empty(&self.token_fields)
                .unwrap_or_else(|| owned(DEFAULT_TOKEN_FIELDS)),
        }
    }

    /// HTTP timeout: JSON field → `HTTP_TIMEOUT_SECS` → 30s.
    pub fn resolve_http_timeout(&self) -> Duration {
        Duration::from_secs(
            self.http_timeout_secs
                .or_else(|| env_parse("HTTP_TIMEOUT_SECS"))
                .unwrap_or(30),
        )
    }

    /// Connect timeout: JSON field → `HTTP_CONNECT_TIMEOUT_SECS` → 10s.
    pub fn resolve_connect_timeout(&self) -> Duration {
        Duration::from_secs(
            self.http_connect_timeout_secs
                .or_else(|| env_parse("HTTP_CONNECT_TIMEOUT_SECS"))
                .unwrap_or(10),
        )
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: self.resolve_interval(),
            recent_cap: self.resolve_recent_cap(),
            logs_dir: self.resolve_logs_dir(),
        }
    }

    pub fn renamer_settings(&self) -> RenamerSettings {
        RenamerSettings {
            candidate_urls: self.resolve_candidate_urls(),
            verify_urls: self.resolve_verify_urls(),
            policy: self.resolve_field_policy(),
            timeout: self.resolve_http_timeout(),
            connect_timeout: self.resolve_connect_timeout(),
        }
    }
}

/// Load `name-lock.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `NAME_LOCK_CONFIG` env var path
/// 2. `./name-lock.json`
/// 3. `../name-lock.json`
///
/// Missing file → `LockConfig::default()` (all env-var fallbacks apply).
/// Parse error → log a warning, return `LockConfig::default()`.
pub fn load_lock_config() -> LockConfig {
    let mut candidates = vec![
        PathBuf::from("name-lock.json"),
        PathBuf::from("../name-lock.json"),
    ];
    if let Some(env_path) = env_nonempty(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(env_path));
    }

    for path in &candidates {
        let Ok(contents) = std::fs::read_to_string(path) else {
            continue;
        };
        return match serde_json::from_str::<LockConfig>(&contents) {
            Ok(cfg) => {
                tracing::info!("name-lock.json loaded from {}", path.display());
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    "name-lock.json parse error at {}: {} — using defaults",
                    path.display(),
                    e
                );
                LockConfig::default()
            }
        };
    }

    LockConfig::default()
}

/// Shared secret for the start form. There is deliberately no built-in
/// fallback: an unset or blank key means the server must not start.
pub fn access_key() -> Option<String> {
    env_nonempty(ENV_ACCESS_KEY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fields_take_precedence_and_are_clamped() {
        let cfg: LockConfig = serde_json::from_str(
            r#"{
                "poll_interval_secs": 0,
                "recent_cap": 7,
                "logs_dir": "/tmp/nl-logs",
                "candidate_urls": ["http://127.0.0.1:1/form/{target}"],
                "rename_fields": ["title"]
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.resolve_interval(), Duration::from_secs(1));
        assert_eq!(cfg.resolve_recent_cap(), 7);
        assert_eq!(cfg.resolve_logs_dir(), PathBuf::from("/tmp/nl-logs"));
        assert_eq!(cfg.resolve_candidate_urls(), vec!["http://127.0.0.1:1/form/{target}"]);
        let policy = cfg.resolve_field_policy();
        assert_eq!(policy.rename_fields, vec!["title"]);
        assert_eq!(policy.token_fields, owned(DEFAULT_TOKEN_FIELDS));
    }

    #[test]
    fn empty_lists_fall_back_to_defaults() {
        let cfg = LockConfig {
            verify_urls: Some(vec![]),
            ..Default::default()
        };
        assert!(!cfg.resolve_verify_urls().is_empty());
        assert!(cfg
            .resolve_candidate_urls()
            .iter()
            .all(|u| u.contains("{target}")));
    }

    #[test]
    fn unknown_json_shape_is_rejected() {
        assert!(serde_json::from_str::<LockConfig>(r#"{"poll_interval_secs":"soon"}"#).is_err());
    }
}
