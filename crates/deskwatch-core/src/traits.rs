//! Seams between the decision engine and the outside world.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Ticket;

/// Read-only access to the help desk's tickets.
///
/// Each query returns tickets already tagged with the notification kind
/// that the query stands for.
#[async_trait]
pub trait TicketSource: Send + Sync {
    /// Open tickets where the customer replied last, longer ago than `threshold`.
    async fn open_tickets_needing_attention(&self, threshold: Duration) -> Result<Vec<Ticket>>;

    /// Pending tickets where an agent replied last, longer ago than `threshold`.
    async fn pending_tickets_needing_attention(&self, threshold: Duration) -> Result<Vec<Ticket>>;

    /// Round-trip to the source to prove the connection works.
    async fn ping(&self) -> Result<()>;
}

/// Outbound chat delivery. Implementations own their retry policy.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, text: &str) -> Result<()>;
}
