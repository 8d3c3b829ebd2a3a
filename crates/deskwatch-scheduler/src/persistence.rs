//! SQLite notification history: cooldown dedup, the off-hours queue and
//! the burst log.
//!
//! One row per `(ticket_id, notification_type)`. Timestamps are stored as
//! fixed-width RFC 3339 UTC strings (`2026-03-04T15:00:00.000Z`) so SQL
//! string comparison matches chronological order. "Now" always comes from
//! the caller; SQLite's own clock is never consulted.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use deskwatch_core::error::{DeskWatchError, Result};
use deskwatch_core::types::{
    NotificationKind, NotificationStats, NotificationStatus, ResponseTimeStats, Ticket,
};
use rusqlite::{Connection, OptionalExtension, params};

/// Retention used when the configured value is not positive.
pub const DEFAULT_RETENTION_DAYS: i64 = 90;

/// A queued notification waiting for the start-of-day flush.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedNotification {
    pub ticket_id: i64,
    pub kind: NotificationKind,
    /// JSON ticket snapshot taken when the notification was queued.
    pub ticket_data: String,
}

/// Full notification row.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRecord {
    pub id: i64,
    pub ticket_id: i64,
    pub kind: NotificationKind,
    pub status: NotificationStatus,
    pub first_eligible_at: DateTime<Utc>,
    pub queued_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub ticket_subject: String,
    pub customer_name: String,
    pub assigned_user: String,
    pub minutes_waiting: i64,
    pub threshold_minutes: i64,
    pub ticket_data: Option<String>,
}

/// Rows removed by a retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub notifications_deleted: usize,
    pub log_entries_deleted: usize,
}

/// SQLite-backed notification store.
pub struct NotificationDb {
    conn: Mutex<Connection>,
    span: tracing::Span,
}

impl NotificationDb {
    /// Open or create the notification database, applying pragmas and schema.
    pub fn open(path: &Path, span: tracing::Span) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| DeskWatchError::database(format!("open {}: {e}", path.display())))?;
        Self::init(conn, span)
    }

    /// In-memory database, used by tests and dry checks.
    pub fn open_in_memory(span: tracing::Span) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DeskWatchError::database(format!("open in-memory: {e}")))?;
        Self::init(conn, span)
    }

    fn init(conn: Connection, span: tracing::Span) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;
             PRAGMA foreign_keys=ON;",
        )
        .map_err(|e| DeskWatchError::database(format!("pragmas: {e}")))?;

        let db = Self {
            conn: Mutex::new(conn),
            span,
        };
        db.migrate()?;
        Ok(db)
    }

    /// Create tables and indexes. Safe to run repeatedly.
    pub fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticket_id INTEGER NOT NULL,
                notification_type TEXT NOT NULL,  -- 'open_no_agent_response', 'pending_no_customer_response'
                notification_status TEXT NOT NULL DEFAULT 'pending',  -- 'pending', 'queued', 'sent'
                first_eligible_at TEXT NOT NULL,
                queued_at TEXT,
                sent_at TEXT,
                ticket_subject TEXT NOT NULL DEFAULT '',
                customer_name TEXT NOT NULL DEFAULT '',
                assigned_user TEXT NOT NULL DEFAULT '',
                minutes_waiting INTEGER NOT NULL DEFAULT 0,
                threshold_minutes INTEGER NOT NULL DEFAULT 0,
                ticket_data TEXT,                 -- JSON snapshot at decision time
                UNIQUE(ticket_id, notification_type)
            );

            CREATE INDEX IF NOT EXISTS idx_notification_queue
                ON notifications(notification_status, queued_at);
            CREATE INDEX IF NOT EXISTS idx_notification_sent
                ON notifications(sent_at);

            CREATE TABLE IF NOT EXISTS business_hours_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_type TEXT NOT NULL,         -- 'burst_sent'
                event_time TEXT NOT NULL,
                notifications_sent INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_business_hours_log_time
                ON business_hours_log(event_type, event_time);
            ",
            )
            .map_err(|e| DeskWatchError::database(format!("migration: {e}")))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DeskWatchError::database("connection mutex poisoned"))
    }

    // ── Cooldown dedup ──────────────────────────────────────

    /// Whether the engine should leave this ticket alone on this pass:
    /// it is already queued, or it was sent within the cooldown.
    pub fn should_skip(
        &self,
        ticket_id: i64,
        kind: NotificationKind,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let row: Option<(String, Option<String>)> = conn
            .query_row(
                "SELECT notification_status, sent_at FROM notifications
                 WHERE ticket_id = ?1 AND notification_type = ?2
                 ORDER BY COALESCE(sent_at, queued_at, first_eligible_at) DESC
                 LIMIT 1",
                params![ticket_id, kind.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| {
                DeskWatchError::database(format!("cooldown lookup for ticket {ticket_id} ({kind}): {e}"))
            })?;

        let Some((status, sent_at)) = row else {
            return Ok(false);
        };

        if status.parse::<NotificationStatus>()? == NotificationStatus::Queued {
            return Ok(true);
        }

        match sent_at {
            Some(sent) => {
                let sent = parse_ts(&sent)?;
                let expires = sent
                    .checked_add_signed(to_delta(cooldown))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                Ok(now < expires)
            }
            None => Ok(false),
        }
    }

    /// Insert or update the decision for a ticket, unless a send inside the
    /// cooldown already exists. The check and write are one statement, so
    /// concurrent writers cannot both pass the guard.
    ///
    /// Returns `false` when the guard kept the existing row.
    pub fn record_decision(
        &self,
        ticket: &Ticket,
        status: NotificationStatus,
        threshold_minutes: i64,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<bool> {
        let now_ts = ts(now);
        let cutoff = ts(now
            .checked_sub_signed(to_delta(cooldown))
            .unwrap_or(DateTime::UNIX_EPOCH));

        let (queued_at, sent_at) = match status {
            NotificationStatus::Queued => (Some(now_ts.clone()), None),
            NotificationStatus::Sent => (None, Some(now_ts.clone())),
            NotificationStatus::Pending => (None, None),
        };
        let ticket_data = serde_json::to_string(ticket)?;

        let conn = self.conn()?;
        let changed = conn
            .execute(
                "INSERT INTO notifications (
                    ticket_id, notification_type, notification_status, first_eligible_at,
                    queued_at, sent_at, ticket_subject, customer_name, assigned_user,
                    minutes_waiting, threshold_minutes, ticket_data
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(ticket_id, notification_type) DO UPDATE SET
                    notification_status = excluded.notification_status,
                    queued_at = COALESCE(excluded.queued_at, notifications.queued_at),
                    sent_at = COALESCE(excluded.sent_at, notifications.sent_at),
                    ticket_subject = excluded.ticket_subject,
                    customer_name = excluded.customer_name,
                    assigned_user = excluded.assigned_user,
                    minutes_waiting = excluded.minutes_waiting,
                    threshold_minutes = excluded.threshold_minutes,
                    ticket_data = excluded.ticket_data
                 WHERE notifications.sent_at IS NULL OR notifications.sent_at <= ?13",
                params![
                    ticket.id,
                    ticket.kind.as_str(),
                    status.as_str(),
                    now_ts,
                    queued_at,
                    sent_at,
                    ticket.subject,
                    ticket.customer_name,
                    ticket.assigned_user_name,
                    ticket.minutes_since_reply,
                    threshold_minutes,
                    ticket_data,
                    cutoff,
                ],
            )
            .map_err(|e| {
                DeskWatchError::database(format!(
                    "record decision ({status}) for ticket {} ({}): {e}",
                    ticket.id, ticket.kind
                ))
            })?;

        Ok(changed > 0)
    }

    // ── Queue ───────────────────────────────────────────────

    /// Oldest-first queued notifications, at most `limit`.
    pub fn drain_queued(&self, limit: usize) -> Result<Vec<QueuedNotification>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT ticket_id, notification_type, ticket_data FROM notifications
                 WHERE notification_status = 'queued'
                 ORDER BY queued_at ASC, id ASC
                 LIMIT ?1",
            )
            .map_err(|e| DeskWatchError::database(format!("prepare queue read: {e}")))?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })
            .map_err(|e| DeskWatchError::database(format!("queue read: {e}")))?;

        let mut queued = Vec::new();
        for row in rows {
            let (ticket_id, kind, ticket_data) =
                row.map_err(|e| DeskWatchError::database(format!("queue row: {e}")))?;
            match kind.parse::<NotificationKind>() {
                Ok(kind) => queued.push(QueuedNotification {
                    ticket_id,
                    kind,
                    ticket_data: ticket_data.unwrap_or_default(),
                }),
                Err(e) => {
                    let _enter = self.span.enter();
                    tracing::warn!("⚠️ Skipping queued ticket {ticket_id}: {e}");
                }
            }
        }
        Ok(queued)
    }

    /// Move a queued record to sent. Returns `false` when the record was
    /// no longer queued.
    pub fn mark_sent(&self, ticket_id: i64, kind: NotificationKind, now: DateTime<Utc>) -> Result<bool> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE notifications SET notification_status = 'sent', sent_at = ?1
                 WHERE ticket_id = ?2 AND notification_type = ?3 AND notification_status = 'queued'",
                params![ts(now), ticket_id, kind.as_str()],
            )
            .map_err(|e| {
                DeskWatchError::database(format!("mark sent for ticket {ticket_id} ({kind}): {e}"))
            })?;
        Ok(changed > 0)
    }

    /// Record that a start-of-day flush delivered `count` notifications.
    pub fn log_burst(&self, count: usize, now: DateTime<Utc>) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO business_hours_log (event_type, event_time, notifications_sent)
                 VALUES ('burst_sent', ?1, ?2)",
                params![ts(now), i64::try_from(count).unwrap_or(i64::MAX)],
            )
            .map_err(|e| DeskWatchError::database(format!("burst log: {e}")))?;
        Ok(())
    }

    /// Look up a single record.
    pub fn find(&self, ticket_id: i64, kind: NotificationKind) -> Result<Option<NotificationRecord>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                "SELECT id, ticket_id, notification_type, notification_status, first_eligible_at,
                        queued_at, sent_at, ticket_subject, customer_name, assigned_user,
                        minutes_waiting, threshold_minutes, ticket_data
                 FROM notifications WHERE ticket_id = ?1 AND notification_type = ?2",
                params![ticket_id, kind.as_str()],
                |row| {
                    Ok(RawRecord {
                        id: row.get(0)?,
                        ticket_id: row.get(1)?,
                        kind: row.get(2)?,
                        status: row.get(3)?,
                        first_eligible_at: row.get(4)?,
                        queued_at: row.get(5)?,
                        sent_at: row.get(6)?,
                        ticket_subject: row.get(7)?,
                        customer_name: row.get(8)?,
                        assigned_user: row.get(9)?,
                        minutes_waiting: row.get(10)?,
                        threshold_minutes: row.get(11)?,
                        ticket_data: row.get(12)?,
                    })
                },
            )
            .optional()
            .map_err(|e| DeskWatchError::database(format!("find ticket {ticket_id} ({kind}): {e}")))?;

        raw.map(RawRecord::into_record).transpose()
    }

    // ── Statistics ──────────────────────────────────────────

    /// Summary of the notification history as of `now`.
    pub fn stats(&self, now: DateTime<Utc>) -> Result<NotificationStats> {
        let conn = self.conn()?;
        let day_ago = ts(now - TimeDelta::hours(24));
        let week_ago = ts(now - TimeDelta::days(7));
        let db_err = |what: &str, e: rusqlite::Error| DeskWatchError::database(format!("stats {what}: {e}"));

        let mut stats = NotificationStats {
            total_notifications: count(&conn, "SELECT COUNT(*) FROM notifications", params![])
                .map_err(|e| db_err("total", e))?,
            ..Default::default()
        };

        stats.by_status = group_counts(
            &conn,
            "SELECT notification_status, COUNT(*) FROM notifications GROUP BY notification_status",
        )
        .map_err(|e| db_err("by status", e))?;

        stats.by_type = group_counts(
            &conn,
            "SELECT notification_type, COUNT(*) FROM notifications GROUP BY notification_type",
        )
        .map_err(|e| db_err("by type", e))?;

        stats.sent_last_24h = count(
            &conn,
            "SELECT COUNT(*) FROM notifications WHERE notification_status = 'sent' AND sent_at > ?1",
            params![day_ago],
        )
        .map_err(|e| db_err("sent 24h", e))?;

        stats.current_queue_size = count(
            &conn,
            "SELECT COUNT(*) FROM notifications WHERE notification_status = 'queued'",
            params![],
        )
        .map_err(|e| db_err("queue size", e))?;

        let (events, delivered): (i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(notifications_sent), 0) FROM business_hours_log
                 WHERE event_type = 'burst_sent' AND event_time > ?1",
                params![week_ago],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| db_err("bursts", e))?;
        stats.burst_events_7d = u64::try_from(events).unwrap_or_default();
        stats.burst_notifications_7d = u64::try_from(delivered).unwrap_or_default();

        stats.response_times_7d = conn
            .query_row(
                "SELECT CAST(AVG(minutes_waiting) AS REAL),
                        CAST(MIN(minutes_waiting) AS REAL),
                        CAST(MAX(minutes_waiting) AS REAL)
                 FROM notifications WHERE notification_status = 'sent' AND sent_at > ?1",
                params![week_ago],
                |row| {
                    Ok(ResponseTimeStats {
                        average_minutes: row.get(0)?,
                        minimum_minutes: row.get(1)?,
                        maximum_minutes: row.get(2)?,
                    })
                },
            )
            .map_err(|e| db_err("response times", e))?;

        Ok(stats)
    }

    // ── Maintenance ─────────────────────────────────────────

    /// Delete history older than the retention window.
    pub fn cleanup_older_than(&self, retention_days: i64, now: DateTime<Utc>) -> Result<CleanupReport> {
        let days = if retention_days > 0 { retention_days } else { DEFAULT_RETENTION_DAYS };
        let cutoff = ts(now
            .checked_sub_signed(TimeDelta::days(days))
            .unwrap_or(DateTime::UNIX_EPOCH));

        let conn = self.conn()?;
        let notifications_deleted = conn
            .execute(
                "DELETE FROM notifications
                 WHERE notification_status != 'queued'
                   AND COALESCE(sent_at, first_eligible_at) < ?1",
                params![cutoff],
            )
            .map_err(|e| DeskWatchError::database(format!("cleanup notifications: {e}")))?;
        let log_entries_deleted = conn
            .execute("DELETE FROM business_hours_log WHERE event_time < ?1", params![cutoff])
            .map_err(|e| DeskWatchError::database(format!("cleanup burst log: {e}")))?;

        let _enter = self.span.enter();
        tracing::info!(
            notifications_deleted,
            log_entries_deleted,
            retention_days = days,
            "🧹 History cleanup finished"
        );

        Ok(CleanupReport {
            notifications_deleted,
            log_entries_deleted,
        })
    }

    /// Reclaim free pages.
    pub fn vacuum(&self) -> Result<()> {
        self.conn()?
            .execute_batch("VACUUM;")
            .map_err(|e| DeskWatchError::database(format!("vacuum: {e}")))
    }
}

/// Column values before enum and timestamp parsing.
struct RawRecord {
    id: i64,
    ticket_id: i64,
    kind: String,
    status: String,
    first_eligible_at: String,
    queued_at: Option<String>,
    sent_at: Option<String>,
    ticket_subject: String,
    customer_name: String,
    assigned_user: String,
    minutes_waiting: i64,
    threshold_minutes: i64,
    ticket_data: Option<String>,
}

impl RawRecord {
    fn into_record(self) -> Result<NotificationRecord> {
        Ok(NotificationRecord {
            id: self.id,
            ticket_id: self.ticket_id,
            kind: self.kind.parse()?,
            status: self.status.parse()?,
            first_eligible_at: parse_ts(&self.first_eligible_at)?,
            queued_at: self.queued_at.as_deref().map(parse_ts).transpose()?,
            sent_at: self.sent_at.as_deref().map(parse_ts).transpose()?,
            ticket_subject: self.ticket_subject,
            customer_name: self.customer_name,
            assigned_user: self.assigned_user,
            minutes_waiting: self.minutes_waiting,
            threshold_minutes: self.threshold_minutes,
            ticket_data: self.ticket_data,
        })
    }
}

fn count(conn: &Connection, sql: &str, params: &[&dyn rusqlite::ToSql]) -> rusqlite::Result<u64> {
    let n: i64 = conn.query_row(sql, params, |row| row.get(0))?;
    Ok(u64::try_from(n).unwrap_or_default())
}

fn group_counts(
    conn: &Connection,
    sql: &str,
) -> rusqlite::Result<std::collections::BTreeMap<String, u64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
    rows.map(|r| r.map(|(k, n)| (k, u64::try_from(n).unwrap_or_default())))
        .collect()
}

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DeskWatchError::database(format!("bad timestamp '{s}': {e}")))
}

/// Capped at a century so derived cutoffs stay formattable.
fn to_delta(d: Duration) -> TimeDelta {
    let cap = TimeDelta::days(36_500);
    TimeDelta::from_std(d).map_or(cap, |delta| delta.min(cap))
}
