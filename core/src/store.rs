//! Storage abstraction for raffles, purchases and holds.
//!
//! Number exclusivity and single application of payments are enforced by the
//! store, not by in-process locks: several stateless instances may run against
//! the same database. Each method is one short transaction (or, for the
//! sweep cascade, one transaction per purchase).
//!
//! # Implementations
//!
//! - `PostgresRaffleStore` in `rifa-postgres` for production
//! - `InMemoryRaffleStore` in `rifa-testing` for tests

use crate::error::StoreError;
use crate::lifecycle::Transition;
use crate::types::{
    Customer, CustomerContact, Hold, Money, OrganizerId, Purchase, PurchaseId, PurchaseStatus,
    Raffle, RaffleId, RaffleStatus, TicketNumber,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`RaffleStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Everything needed to create a purchase and its holds in one step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReservationRequest {
    /// Id for the new purchase
    pub purchase_id: PurchaseId,
    /// Raffle to reserve in
    pub raffle_id: RaffleId,
    /// Buyer, upserted by phone in the same transaction
    pub customer: CustomerContact,
    /// Distinct, in-range numbers, in request order
    pub numbers: Vec<TicketNumber>,
    /// Priced total
    pub total: Money,
    /// Coupon that was applied, if any
    pub coupon_code: Option<String>,
    /// Server time of the request
    pub now: DateTime<Utc>,
    /// Expiry of every new hold
    pub expires_at: DateTime<Utc>,
}

/// A committed reservation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reservation {
    /// The new pending purchase
    pub purchase: Purchase,
    /// The upserted customer
    pub customer: Customer,
}

/// Result of releasing expired holds in one raffle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Held rows deleted
    pub released: usize,
    /// Purchases cancelled because no hold remained
    pub cancelled: Vec<Purchase>,
}

/// Result of applying a payment confirmation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Confirmation {
    /// Status transition (`Unchanged` on redelivery)
    pub transition: Transition<PurchaseStatus>,
    /// Purchase after the transition
    pub purchase: Purchase,
    /// Numbers another buyer took before the late payment arrived; moved
    /// from `purchase.numbers` to `purchase.forfeited_numbers`
    pub unavailable: Vec<TicketNumber>,
}

/// Result of an organizer cancellation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cancellation {
    /// Status transition (`Unchanged` if already cancelled)
    pub transition: Transition<PurchaseStatus>,
    /// Purchase after the transition
    pub purchase: Purchase,
    /// Hold rows deleted, paid ones included
    pub released: usize,
}

/// A processed webhook, keyed by provider and the provider's event id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WebhookReceipt {
    /// Provider name
    pub provider: String,
    /// Provider event id (or a digest of the payload)
    pub event_key: String,
    /// Recorded reconciliation outcome
    pub outcome: serde_json::Value,
    /// When the webhook was first processed
    pub received_at: DateTime<Utc>,
}

/// Transactional store behind the raffle services.
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the store can live in the
/// environment as `Arc<dyn RaffleStore>`.
pub trait RaffleStore: Send + Sync {
    /// Loads a raffle by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn raffle(&self, id: RaffleId) -> StoreFuture<'_, Option<Raffle>>;

    /// Loads a raffle by its public slug.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn raffle_by_slug<'a>(&'a self, slug: &'a str) -> StoreFuture<'a, Option<Raffle>>;

    /// Raffles still in `pending_activation`, newest first, optionally
    /// restricted to one organizer.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn pending_activation_raffles(
        &self,
        organizer: Option<OrganizerId>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<Raffle>>;

    /// Moves a raffle to `active`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown raffle and
    /// [`StoreError::InvalidState`] for a drawn or closed one.
    fn activate_raffle(&self, id: RaffleId) -> StoreFuture<'_, Transition<RaffleStatus>>;

    /// Loads a purchase by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn purchase(&self, id: PurchaseId) -> StoreFuture<'_, Option<Purchase>>;

    /// Creates a pending purchase plus one `held` hold per number, atomically.
    ///
    /// A number is occupied if it has a `paid` hold or a `held` hold with
    /// `expires_at >= now`. Expired holds count as free whether or not they
    /// were swept. If any number is occupied nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] listing every occupied number, or
    /// [`StoreError::NotFound`] for an unknown raffle.
    fn reserve(&self, request: ReservationRequest) -> StoreFuture<'_, Reservation>;

    /// Holds still occupying their number at `now`, ordered by number.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn active_holds(&self, raffle_id: RaffleId, now: DateTime<Utc>) -> StoreFuture<'_, Vec<Hold>>;

    /// Deletes `held` holds with `expires_at < now`, then cancels each pending
    /// purchase of the raffle left without holds, one purchase per
    /// transaction, with [`CancelReason::Expired`](crate::types::CancelReason).
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn release_expired(&self, raffle_id: RaffleId, now: DateTime<Utc>)
    -> StoreFuture<'_, SweepReport>;

    /// Applies a payment to a purchase, with the transition of
    /// [`Purchase::confirm_at`].
    ///
    /// Payment is late when `now > purchase.expires_at`. Numbers still held
    /// by the purchase become `paid` and released numbers that are still free
    /// are re-inserted as `paid`. In the same transaction, numbers another
    /// live purchase took are removed from `purchase.numbers`, stored in
    /// `purchase.forfeited_numbers` and reported in
    /// [`Confirmation::unavailable`], so claimed numbers never overlap.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown purchase.
    fn confirm_purchase(&self, id: PurchaseId, now: DateTime<Utc>)
    -> StoreFuture<'_, Confirmation>;

    /// Cancels a purchase with [`CancelReason::Admin`](crate::types::CancelReason)
    /// and deletes all its holds, paid ones included.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown purchase.
    fn cancel_purchase(&self, id: PurchaseId, now: DateTime<Utc>)
    -> StoreFuture<'_, Cancellation>;

    /// Looks up a processed webhook.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn find_receipt<'a>(
        &'a self,
        provider: &'a str,
        event_key: &'a str,
    ) -> StoreFuture<'a, Option<WebhookReceipt>>;

    /// Records a processed webhook. Keeps the first receipt if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn record_receipt(&self, receipt: WebhookReceipt) -> StoreFuture<'_, ()>;

    /// Checks the store is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if it is not.
    fn ping(&self) -> StoreFuture<'_, ()>;
}
