//! Start-of-day flush: delivers notifications that were queued outside
//! business hours, oldest first, with a pause between sends.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use deskwatch_core::error::Result;
use deskwatch_core::traits::Transport;
use deskwatch_core::types::Ticket;
use tracing::Instrument;

use crate::notify::format_message;
use crate::persistence::{NotificationDb, QueuedNotification};

/// Result of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Notifications delivered and marked sent.
    pub sent: usize,
    /// Items skipped because of a parse, send or update failure.
    pub errors: usize,
}

/// Drains the off-hours queue through a transport.
pub struct QueueFlusher {
    db: Arc<NotificationDb>,
    transport: Arc<dyn Transport>,
    base_url: String,
    max_per_run: usize,
    delay: Duration,
    dry_run: bool,
    span: tracing::Span,
}

impl QueueFlusher {
    pub fn new(
        db: Arc<NotificationDb>,
        transport: Arc<dyn Transport>,
        base_url: impl Into<String>,
        max_per_run: usize,
        delay: Duration,
        dry_run: bool,
        span: tracing::Span,
    ) -> Self {
        Self {
            db,
            transport,
            base_url: base_url.into(),
            max_per_run,
            delay,
            dry_run,
            span,
        }
    }

    /// Send up to `max_per_run` queued notifications. Failed items stay
    /// queued for the next window. Only a failure to read the queue is
    /// returned as an error.
    pub async fn flush(&self, now: DateTime<Utc>) -> Result<FlushOutcome> {
        self.flush_inner(now).instrument(self.span.clone()).await
    }

    async fn flush_inner(&self, now: DateTime<Utc>) -> Result<FlushOutcome> {
        let started = Instant::now();
        let queued = self.db.drain_queued(self.max_per_run)?;
        if queued.is_empty() {
            tracing::debug!("queue empty, nothing to flush");
            return Ok(FlushOutcome::default());
        }

        tracing::info!("📬 Flushing {} queued notification(s)", queued.len());

        let mut outcome = FlushOutcome::default();
        for (i, item) in queued.iter().enumerate() {
            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let at = now + TimeDelta::from_std(started.elapsed()).unwrap_or_default();
            match self.deliver(item, at).await {
                Ok(true) => outcome.sent += 1,
                Ok(false) => {
                    tracing::debug!(ticket_id = item.ticket_id, kind = %item.kind, "no longer queued, skipped");
                }
                Err(e) => {
                    tracing::warn!("⚠️ Queued notification for ticket {} ({}) failed: {e}", item.ticket_id, item.kind);
                    outcome.errors += 1;
                }
            }
        }

        if outcome.sent > 0 {
            if let Err(e) = self.db.log_burst(outcome.sent, now) {
                tracing::warn!("⚠️ Failed to record burst: {e}");
            }
        }

        tracing::info!(
            sent = outcome.sent,
            errors = outcome.errors,
            "✅ Queue flush finished"
        );
        Ok(outcome)
    }

    async fn deliver(&self, item: &QueuedNotification, at: DateTime<Utc>) -> Result<bool> {
        let ticket: Ticket = serde_json::from_str(&item.ticket_data)?;

        if self.dry_run {
            tracing::info!("🧪 [dry-run] would send queued ticket #{} ({})", ticket.number, item.kind);
        } else {
            self.transport.send(&format_message(&ticket, &self.base_url)).await?;
        }

        self.db.mark_sent(item.ticket_id, item.kind, at)
    }
}
