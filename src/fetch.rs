//! HTTP session handle.
//!
//! One `Session` per pass, owned by the orchestrator, dropped when the pass
//! ends. The handle carries no page state, so the detail pass can share one
//! behind an `Arc` across its workers.

use std::time::Duration;

use scraper::{Html, Selector};
use tracing::warn;

use crate::error::HarvestError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const USER_AGENT: &str = concat!("ufc_scraper/", env!("CARGO_PKG_VERSION"));

pub struct Session {
    client: reqwest::Client,
}

impl Session {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Session { client })
    }

    /// Fetch `url` and verify the template's anchor selector matches at
    /// least one element. Rate-limit and server errors are retried with
    /// exponential backoff before giving up; timeouts and a missing anchor
    /// are reported to the caller as ordinary per-record failures.
    pub async fn load(&self, url: &str, anchor: &'static str) -> Result<String, HarvestError> {
        let mut attempt = 0;
        loop {
            match self.get_once(url).await {
                Ok(body) => {
                    if !has_anchor(&body, anchor) {
                        return Err(HarvestError::StructuralMismatch(anchor));
                    }
                    return Ok(body);
                }
                Err(e) if retryable(&e) && attempt < MAX_RETRIES => {
                    let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                    attempt += 1;
                    warn!(
                        url,
                        attempt,
                        backoff_s = backoff.as_secs_f64(),
                        "remote busy, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once(&self, url: &str) -> Result<String, HarvestError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::FetchUnavailable {
                url: url.to_string(),
                reason: format!("status {}", status),
            });
        }

        response.text().await.map_err(|e| classify(url, e))
    }
}

fn classify(url: &str, e: reqwest::Error) -> HarvestError {
    if e.is_timeout() {
        HarvestError::FetchTimeout {
            url: url.to_string(),
        }
    } else {
        HarvestError::FetchUnavailable {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

fn retryable(e: &HarvestError) -> bool {
    match e {
        HarvestError::FetchUnavailable { reason, .. } => {
            reason.contains("429") || reason.contains("500") || reason.contains("502")
                || reason.contains("503")
        }
        _ => false,
    }
}

fn has_anchor(body: &str, anchor: &str) -> bool {
    let selector = Selector::parse(anchor).unwrap();
    let doc = Html::parse_document(body);
    doc.select(&selector).next().is_some()
}
