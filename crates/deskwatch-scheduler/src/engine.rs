//! Decision engine: one evaluation pass over the help desk.
//!
//! A pass flushes the off-hours queue when it lands in the start-of-day
//! window, then fetches candidates and decides per ticket: skip (cooldown or
//! already queued), send now (business time) or queue (off hours).

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use deskwatch_core::config::{DeskWatchConfig, whole_minutes};
use deskwatch_core::error::Result;
use deskwatch_core::traits::{TicketSource, Transport};
use deskwatch_core::types::{NotificationKind, NotificationStatus, RunStats, Ticket};
use tracing::Instrument;

use crate::business_hours::BusinessHours;
use crate::flush::QueueFlusher;
use crate::notify::format_message;
use crate::persistence::NotificationDb;

/// Engine knobs, lifted out of the full config.
#[derive(Debug, Clone)]
pub struct NotifierSettings {
    pub open_threshold: Duration,
    pub pending_threshold: Duration,
    pub cooldown: Duration,
    pub max_per_run: usize,
    pub flush_delay: Duration,
    pub dry_run: bool,
    /// Help desk base URL for ticket links.
    pub base_url: String,
}

impl NotifierSettings {
    pub fn from_config(config: &DeskWatchConfig) -> Self {
        Self {
            open_threshold: config.rules.open_threshold,
            pending_threshold: config.rules.pending_threshold,
            cooldown: config.rules.cooldown_period,
            max_per_run: config.rules.max_notifications_per_run,
            flush_delay: config.rules.flush_delay,
            dry_run: config.dry_run,
            base_url: config.freescout.url.clone(),
        }
    }

    /// Threshold that made a ticket of this kind eligible, in whole minutes.
    pub fn threshold_minutes(&self, kind: NotificationKind) -> i64 {
        let threshold = match kind {
            NotificationKind::OpenNoAgentResponse => self.open_threshold,
            NotificationKind::PendingNoCustomerResponse => self.pending_threshold,
        };
        whole_minutes(threshold)
    }
}

/// What happened to a single candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Skipped,
    Sent,
    Queued,
}

/// The notifier: owns the collaborators for one process.
pub struct Notifier {
    source: Arc<dyn TicketSource>,
    transport: Arc<dyn Transport>,
    db: Arc<NotificationDb>,
    hours: BusinessHours,
    flusher: QueueFlusher,
    settings: NotifierSettings,
    span: tracing::Span,
}

impl Notifier {
    pub fn new(
        source: Arc<dyn TicketSource>,
        transport: Arc<dyn Transport>,
        db: Arc<NotificationDb>,
        hours: BusinessHours,
        settings: NotifierSettings,
        span: tracing::Span,
    ) -> Self {
        let flusher = QueueFlusher::new(
            db.clone(),
            transport.clone(),
            settings.base_url.clone(),
            settings.max_per_run,
            settings.flush_delay,
            settings.dry_run,
            span.clone(),
        );
        Self {
            source,
            transport,
            db,
            hours,
            flusher,
            settings,
            span,
        }
    }

    /// Run one pass against the wall clock.
    pub async fn run(&self) -> Result<RunStats> {
        self.run_at(Utc::now()).await
    }

    /// Run one pass as if it were `now`.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RunStats> {
        self.run_inner(now).instrument(self.span.clone()).await
    }

    async fn run_inner(&self, now: DateTime<Utc>) -> Result<RunStats> {
        let started = Instant::now();
        let mut stats = RunStats::default();

        let business = self.hours.is_business_time(now);
        let start_of_day = self.hours.is_start_of_day_window(now);
        tracing::debug!(%now, business, start_of_day, dry_run = self.settings.dry_run, "pass started");

        if start_of_day {
            match self.flusher.flush(now).await {
                Ok(outcome) => {
                    stats.notifications_sent += outcome.sent;
                    stats.errors += outcome.errors;
                }
                Err(e) => {
                    tracing::error!("❌ Queue flush failed: {e}");
                    stats.errors += 1;
                }
            }
        }

        let open = self
            .source
            .open_tickets_needing_attention(self.settings.open_threshold)
            .await
            .inspect_err(|e| tracing::error!("❌ Fetching open tickets failed: {e}"))?;
        stats.tickets_checked += open.len();

        let pending = self
            .source
            .pending_tickets_needing_attention(self.settings.pending_threshold)
            .await
            .inspect_err(|e| tracing::error!("❌ Fetching pending tickets failed: {e}"))?;
        stats.tickets_checked += pending.len();

        tracing::debug!(open = open.len(), pending = pending.len(), "candidates fetched");

        for ticket in open.iter().chain(pending.iter()) {
            match self.process_ticket(ticket, business, now).await {
                Ok(Decision::Sent) => stats.notifications_sent += 1,
                Ok(Decision::Queued) => stats.notifications_queued += 1,
                Ok(Decision::Skipped) => {}
                Err(e) => {
                    tracing::warn!("⚠️ Ticket {} ({}): {e}", ticket.id, ticket.kind);
                    stats.errors += 1;
                }
            }
        }

        stats.duration = started.elapsed();
        tracing::info!(
            checked = stats.tickets_checked,
            sent = stats.notifications_sent,
            queued = stats.notifications_queued,
            errors = stats.errors,
            "✅ Pass finished"
        );
        Ok(stats)
    }

    async fn process_ticket(&self, ticket: &Ticket, business: bool, now: DateTime<Utc>) -> Result<Decision> {
        let cooldown = self.settings.cooldown;
        if self.db.should_skip(ticket.id, ticket.kind, now, cooldown)? {
            tracing::debug!(ticket_id = ticket.id, kind = %ticket.kind, "skipped (cooldown or queued)");
            return Ok(Decision::Skipped);
        }

        let threshold = self.settings.threshold_minutes(ticket.kind);

        if business {
            if self.settings.dry_run {
                tracing::info!("🧪 [dry-run] would notify ticket #{} ({})", ticket.number, ticket.kind);
            } else {
                self.transport.send(&format_message(ticket, &self.settings.base_url)).await?;
                tracing::info!("📢 Notified ticket #{} via {}", ticket.number, self.transport.name());
            }
            if !self.db.record_decision(ticket, NotificationStatus::Sent, threshold, now, cooldown)? {
                tracing::debug!(ticket_id = ticket.id, "a recent send already exists, record kept");
            }
            Ok(Decision::Sent)
        } else {
            if !self.db.record_decision(ticket, NotificationStatus::Queued, threshold, now, cooldown)? {
                tracing::debug!(ticket_id = ticket.id, "a recent send already exists, not queued");
                return Ok(Decision::Skipped);
            }
            tracing::info!("🕐 Queued ticket #{} ({}) for business hours", ticket.number, ticket.kind);
            Ok(Decision::Queued)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_minutes() {
        let settings = NotifierSettings::from_config(&DeskWatchConfig::default());
        assert_eq!(settings.threshold_minutes(NotificationKind::OpenNoAgentResponse), 120);
        assert_eq!(settings.threshold_minutes(NotificationKind::PendingNoCustomerResponse), 1440);
        assert_eq!(settings.cooldown, Duration::from_secs(4 * 3600));
        assert_eq!(settings.max_per_run, 50);
    }
}
