//! # DeskWatch Scheduler
//!
//! Decides which help desk tickets deserve a Slack nudge, and when.
//!
//! ## Design Principles
//! - One pass per process invocation: cron or a systemd timer drives it
//! - SQLite persistence: cooldowns and the off-hours queue survive restarts
//! - Cooldown guard lives inside the upsert, so overlapping runs stay safe
//! - Off-hours alerts are held back and delivered at the start of the day
//!
//! ## Architecture
//! ```text
//! Notifier::run_at(now)
//!   ├── BusinessHours: is_business_time / is_start_of_day_window
//!   ├── start of day → QueueFlusher → drain_queued → Transport → mark_sent
//!   ├── TicketSource: open + pending candidates
//!   └── per ticket → NotificationDb::should_skip
//!                      ├── business time → Transport (Slack) → record sent
//!                      └── off hours     → record queued (with snapshot)
//! ```

pub mod business_hours;
pub mod dispatch;
pub mod engine;
pub mod flush;
pub mod notify;
pub mod persistence;

pub use business_hours::BusinessHours;
pub use dispatch::SlackClient;
pub use engine::{Notifier, NotifierSettings};
pub use flush::{FlushOutcome, QueueFlusher};
pub use persistence::{CleanupReport, NotificationDb, NotificationRecord, QueuedNotification};
