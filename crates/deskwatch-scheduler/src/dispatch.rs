//! Notification dispatch: posts message text to a Slack incoming webhook.
//!
//! Sends go through a retrying middleware client with exponential backoff:
//! retry `n` (1-based) waits `retry_base_delay * 2^(n-1)`. Any non-2xx status
//! or transient transport failure is retried; the last failure is returned
//! once attempts run out.

use std::time::Duration;

use async_trait::async_trait;
use deskwatch_core::config::SlackConfig;
use deskwatch_core::error::{DeskWatchError, Result};
use deskwatch_core::traits::Transport;
use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{
    Jitter, RetryTransientMiddleware, Retryable, RetryableStrategy, default_on_request_failure,
    policies::ExponentialBackoff,
};
use tracing::Instrument;

/// Text posted by `--check-connections`.
pub const TEST_MESSAGE: &str = "🔧 DeskWatch test message - connection successful!";

/// Slack answers anything but 2xx when a post did not land, so every
/// non-success status is worth another try.
struct NonSuccessIsTransient;

impl RetryableStrategy for NonSuccessIsTransient {
    fn handle(&self, res: &reqwest_middleware::Result<reqwest::Response>) -> Option<Retryable> {
        match res {
            Ok(resp) => classify_status(resp.status()),
            Err(e) => default_on_request_failure(e),
        }
    }
}

fn classify_status(status: StatusCode) -> Option<Retryable> {
    if status.is_success() { None } else { Some(Retryable::Transient) }
}

/// Backoff policy for `attempts` total tries starting at `base`.
fn retry_policy(base: Duration, attempts: u32) -> ExponentialBackoff {
    let retries = attempts.saturating_sub(1);
    let longest = base.saturating_mul(2u32.saturating_pow(retries));
    ExponentialBackoff::builder()
        .jitter(Jitter::None)
        .base(2)
        .retry_bounds(base, longest)
        .build_with_max_retries(retries)
}

/// Slack incoming-webhook client.
pub struct SlackClient {
    client: ClientWithMiddleware,
    webhook_url: String,
    span: tracing::Span,
}

impl SlackClient {
    pub fn new(config: &SlackConfig, span: tracing::Span) -> Result<Self> {
        let base_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DeskWatchError::transport(format!("http client: {e}")))?;

        let policy = retry_policy(config.retry_base_delay, config.retry_attempts.max(1));
        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy_and_strategy(
                policy,
                NonSuccessIsTransient,
            ))
            .build();

        Ok(Self { client, webhook_url: config.webhook_url.clone(), span })
    }

    /// Post a fixed test message through the normal retry path.
    pub async fn send_test_message(&self) -> Result<()> {
        self.send(TEST_MESSAGE).await
    }
}

#[async_trait]
impl Transport for SlackClient {
    fn name(&self) -> &str {
        "slack"
    }

    async fn send(&self, text: &str) -> Result<()> {
        if self.webhook_url.trim().is_empty() {
            return Err(DeskWatchError::transport("slack webhook URL is not configured"));
        }

        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .instrument(self.span.clone())
            .await
            .map_err(|e| DeskWatchError::transport(format!("slack send failed: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        self.span.in_scope(|| tracing::warn!("⚠️ Slack gave up after retries: {status}"));
        Err(DeskWatchError::transport(format!("slack returned {status}: {body}")))
    }
}
