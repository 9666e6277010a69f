//! Realtime notifications emitted by the raffle core.
//!
//! The core names and emits events; fan-out to UI listeners belongs to an
//! external pub/sub layer behind [`EventPublisher`].
//!
//! Events are published after the store has committed, so a failed publish
//! never rolls back a reservation or payment. Publish errors are logged and
//! dropped.
//!
//! # Event names
//!
//! | Event | Emitted by |
//! |-------|------------|
//! | `reservation.created` | reservation ledger |
//! | `purchase.confirmed` | reconciler (on-time or late) |
//! | `purchase.cancelled` | sweeper, admin cancellation |
//! | `raffle.activated` | reconciler |

use crate::types::{CancelReason, PurchaseId, PurchaseStatus, RaffleId, TicketNumber};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// A domain event, serialized as `{"event": "<name>", ...}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum DomainEvent {
    /// Numbers were held for a new purchase
    #[serde(rename = "reservation.created")]
    ReservationCreated {
        /// Raffle
        raffle_id: RaffleId,
        /// New purchase
        purchase_id: PurchaseId,
        /// Held numbers
        numbers: Vec<TicketNumber>,
        /// When the holds expire
        expires_at: DateTime<Utc>,
    },
    /// Payment for a purchase was confirmed
    #[serde(rename = "purchase.confirmed")]
    PurchaseConfirmed {
        /// Raffle
        raffle_id: RaffleId,
        /// Purchase
        purchase_id: PurchaseId,
        /// `confirmed` or `paid_delayed`
        status: PurchaseStatus,
        /// Numbers now held as paid
        numbers: Vec<TicketNumber>,
    },
    /// A purchase was cancelled and its numbers released
    #[serde(rename = "purchase.cancelled")]
    PurchaseCancelled {
        /// Raffle
        raffle_id: RaffleId,
        /// Purchase
        purchase_id: PurchaseId,
        /// Expiry or admin action
        reason: CancelReason,
    },
    /// A raffle's activation fee was paid
    #[serde(rename = "raffle.activated")]
    RaffleActivated {
        /// Raffle
        raffle_id: RaffleId,
    },
}

impl DomainEvent {
    /// Wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ReservationCreated { .. } => "reservation.created",
            Self::PurchaseConfirmed { .. } => "purchase.confirmed",
            Self::PurchaseCancelled { .. } => "purchase.cancelled",
            Self::RaffleActivated { .. } => "raffle.activated",
        }
    }

    /// Raffle the event belongs to, used as the fan-out channel.
    #[must_use]
    pub const fn raffle_id(&self) -> RaffleId {
        match self {
            Self::ReservationCreated { raffle_id, .. }
            | Self::PurchaseConfirmed { raffle_id, .. }
            | Self::PurchaseCancelled { raffle_id, .. }
            | Self::RaffleActivated { raffle_id } => *raffle_id,
        }
    }
}

/// Failure to hand an event to the notification layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to publish {event}: {reason}")]
pub struct PublishError {
    /// Event name
    pub event: &'static str,
    /// Transport reason
    pub reason: String,
}

/// Sink for domain events.
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so it can be held as
/// `Arc<dyn EventPublisher>` in the environment.
pub trait EventPublisher: Send + Sync {
    /// Publishes one event.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if the transport rejects the event.
    fn publish(
        &self,
        event: DomainEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + '_>>;
}

/// Publisher that only logs events. Used when no realtime layer is wired.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventPublisher;

impl EventPublisher for TracingEventPublisher {
    fn publish(
        &self,
        event: DomainEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + '_>> {
        Box::pin(async move {
            tracing::info!(
                event = event.name(),
                raffle_id = %event.raffle_id(),
                "Domain event"
            );
            Ok(())
        })
    }
}

/// Publishes an event, logging instead of propagating failures.
pub(crate) async fn emit(publisher: &dyn EventPublisher, event: DomainEvent) {
    let name = event.name();
    if let Err(e) = publisher.publish(event).await {
        tracing::warn!(event = name, error = %e, "Event publish failed");
    }
}
