//! # DeskWatch Core
//!
//! Shared building blocks for the DeskWatch crates: configuration, the
//! error type, the ticket/notification model and the trait seams the
//! decision engine talks through.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::DeskWatchConfig;
pub use error::{DeskWatchError, Result};
pub use traits::{TicketSource, Transport};
pub use types::{NotificationKind, NotificationStats, NotificationStatus, RunStats, Ticket};
