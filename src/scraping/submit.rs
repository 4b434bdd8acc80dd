//! Form replay: fetch the rename page, POST it back with the desired name,
//! then check whether the name stuck.

use async_trait::async_trait;
use reqwest::header::REFERER;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::browser;
use super::form::{scrape_form, FieldPolicy, ScrapeError};
use super::service::RenameAttempt;
use crate::features::credentials::CredentialSet;
use crate::types::{AttemptOutcome, AttemptReport};

pub const TARGET_PLACEHOLDER: &str = "{target}";

#[derive(Debug, Error)]
pub enum LockError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error(transparent)]
    Scrape(#[from] ScrapeError),
    #[error("server rejected the rename with HTTP {0}")]
    Rejected(StatusCode),
    #[error("invalid URL '{0}'")]
    BadUrl(String),
    #[error("client setup failed: {0}")]
    Setup(String),
}

/// Outcome of the post-submit check.
///
/// This is a heuristic, not an authority: the desired name is searched as a
/// case-insensitive substring of fetched pages.  A name that was applied but
/// is rendered differently reads as `Unconfirmed` (false negative), and a name
/// that already appears elsewhere on the page reads as confirmed (false
/// positive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    ConfirmedOnPage(String),
    ConfirmedInResponse,
    Unconfirmed,
}

impl Verification {
    pub fn is_confirmed(&self) -> bool {
        !matches!(self, Verification::Unconfirmed)
    }
}

#[derive(Debug, Clone)]
pub struct RenamerSettings {
    /// Pages that may host the rename form, tried in order. `{target}` is replaced
    /// with the target id.
    pub candidate_urls: Vec<String>,
    /// Pages that display the current name, used for verification.
    pub verify_urls: Vec<String>,
    pub policy: FieldPolicy,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

pub fn expand_template(template: &str, target_id: &str) -> String {
    template.replace(TARGET_PLACEHOLDER, target_id)
}

pub fn contains_name(body: &str, name: &str) -> bool {
    let needle = name.trim().to_lowercase();
    !needle.is_empty() && body.to_lowercase().contains(&needle)
}

pub struct FormRenamer {
    client: Client,
    settings: RenamerSettings,
}

impl FormRenamer {
    /// Builds a dedicated client carrying this task's cookies and a fixed UA.
    pub fn new(credentials: &CredentialSet, settings: RenamerSettings) -> Result<Self, LockError> {
        let headers = browser::session_headers(credentials, browser::pick_user_agent())
            .map_err(|e| LockError::Setup(e.to_string()))?;
        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .build()?;
        Ok(Self { client, settings })
    }

    async fn try_candidate(
        &self,
        page_url: Url,
        target_id: &str,
        desired_name: &str,
    ) -> Result<Verification, LockError> {
        let resp = self.client.get(page_url).send().await?.error_for_status()?;
        let page_url = resp.url().clone();
        let html = resp.text().await?;

        let form = scrape_form(&html, &page_url, &self.settings.policy)?;
        debug!(
            "rename form at {} -> {} (field '{}', {} fields)",
            page_url,
            form.action,
            form.rename_field,
            form.fields.len()
        );

        let resp = self
            .client
            .post(form.action.clone())
            .header(REFERER, page_url.as_str())
            .form(&form.with_name(desired_name))
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(LockError::Rejected(status));
        }

        Ok(self.verify(target_id, desired_name, &body).await)
    }

    /// Best-effort confirmation; see [`Verification`].
    pub async fn verify(&self, target_id: &str, desired_name: &str, post_body: &str) -> Verification {
        for template in &self.settings.verify_urls {
            let url = expand_template(template, target_id);
            let body = match self.client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
                Ok(resp) => {
                    debug!("verify page {} returned HTTP {}", url, resp.status());
                    continue;
                }
                Err(e) => {
                    debug!("verify page {} failed: {}", url, e);
                    continue;
                }
            };
            if contains_name(&body, desired_name) {
                return Verification::ConfirmedOnPage(url);
            }
        }

        if contains_name(post_body, desired_name) {
            Verification::ConfirmedInResponse
        } else {
            Verification::Unconfirmed
        }
    }
}

#[async_trait]
impl RenameAttempt for FormRenamer {
    async fn attempt(&self, target_id: &str, desired_name: &str) -> AttemptReport {
        let mut best: Option<AttemptReport> = None;

        for template in &self.settings.candidate_urls {
            let raw = expand_template(template, target_id);
            let result = match Url::parse(&raw) {
                Ok(url) => self.try_candidate(url, target_id, desired_name).await,
                Err(_) => Err(LockError::BadUrl(raw.clone())),
            };

            let report = match result {
                Ok(Verification::ConfirmedOnPage(page)) => {
                    info!("name '{}' confirmed for {} on {}", desired_name, target_id, page);
                    return AttemptReport::success(raw, format!("Locked '{}' (confirmed on {})", desired_name, page));
                }
                Ok(Verification::ConfirmedInResponse) => {
                    info!("name '{}' confirmed for {} in submit response", desired_name, target_id);
                    return AttemptReport::success(raw, format!("Locked '{}' (confirmed in response)", desired_name));
                }
                Ok(Verification::Unconfirmed) => AttemptReport::unconfirmed(
                    raw,
                    format!("Submitted '{}' but could not confirm the new name", desired_name),
                ),
                Err(e) => {
                    warn!("rename via {} failed: {}", raw, e);
                    AttemptReport::failure(Some(raw), e.to_string())
                }
            };

            // An unconfirmed submit is more informative than a later failure.
            let keep_previous = matches!(
                (&best, report.outcome),
                (Some(prev), AttemptOutcome::Failure) if prev.outcome == AttemptOutcome::Unconfirmed
            );
            if !keep_previous {
                best = Some(report);
            }
        }

        best.unwrap_or_else(|| AttemptReport::failure(None, "no candidate URLs configured"))
    }
}
