//! Reservation ledger: the at-most-one-holder-per-number rule.
//!
//! Input checks happen here, before the store is touched. The occupancy
//! check and the insertion of all holds happen inside the store as one
//! transaction, so a conflict on any number leaves no hold behind.

use crate::environment::RaffleEnvironment;
use crate::error::{RaffleError, Result};
use crate::events::{DomainEvent, emit};
use crate::metrics;
use crate::store::{Reservation, ReservationRequest};
use crate::types::{CustomerContact, Money, PurchaseId, Raffle, TicketNumber};
use chrono::Duration;
use std::collections::HashSet;

/// A purchase ready to be reserved: validated numbers and a priced total.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReservationDraft {
    /// Id for the new purchase
    pub purchase_id: PurchaseId,
    /// Buyer contact
    pub customer: CustomerContact,
    /// Numbers to hold
    pub numbers: Vec<TicketNumber>,
    /// Amount due
    pub total: Money,
    /// Coupon that priced the total
    pub coupon_code: Option<String>,
}

/// Checks a requested number list against a raffle.
///
/// The list must be non-empty, at most `max` long, free of duplicates, and
/// every number must lie in `1..=total_tickets`. Request order is kept.
///
/// # Errors
///
/// Returns [`RaffleError::Validation`] describing the first failed rule.
pub fn validate_numbers(raffle: &Raffle, numbers: &[u32], max: usize) -> Result<Vec<TicketNumber>> {
    if numbers.is_empty() {
        return Err(RaffleError::Validation("at least one number is required".into()));
    }
    if numbers.len() > max {
        return Err(RaffleError::Validation(format!(
            "at most {max} numbers per purchase, got {}",
            numbers.len()
        )));
    }

    let mut seen = HashSet::with_capacity(numbers.len());
    let duplicates: Vec<u32> = numbers.iter().copied().filter(|n| !seen.insert(*n)).collect();
    if !duplicates.is_empty() {
        return Err(RaffleError::Validation(format!("duplicate numbers: {duplicates:?}")));
    }

    let numbers: Vec<TicketNumber> = numbers.iter().copied().map(TicketNumber::new).collect();
    let out_of_range: Vec<u32> = numbers
        .iter()
        .filter(|n| !raffle.contains(**n))
        .map(|n| n.value())
        .collect();
    if !out_of_range.is_empty() {
        return Err(RaffleError::Validation(format!(
            "numbers out of range 1..={}: {out_of_range:?}",
            raffle.total_tickets
        )));
    }

    Ok(numbers)
}

/// Places holds through the store and announces them.
#[derive(Clone, Debug)]
pub struct ReservationLedger {
    env: RaffleEnvironment,
}

impl ReservationLedger {
    /// Creates a ledger over the environment's store.
    #[must_use]
    pub const fn new(env: RaffleEnvironment) -> Self {
        Self { env }
    }

    /// Holds every number of `draft` for `ttl`, or none of them.
    ///
    /// Holds past their expiry count as free even if no sweep has removed
    /// them yet.
    ///
    /// # Errors
    ///
    /// Returns [`RaffleError::Conflict`] with every occupied number, or a
    /// storage error.
    #[tracing::instrument(skip(self, raffle, draft), fields(raffle_id = %raffle.id, purchase_id = %draft.purchase_id, count = draft.numbers.len()))]
    pub async fn try_reserve(
        &self,
        raffle: &Raffle,
        draft: ReservationDraft,
        ttl: Duration,
    ) -> Result<Reservation> {
        let now = self.env.now();
        let expires_at = now + ttl;
        let request = ReservationRequest {
            purchase_id: draft.purchase_id,
            raffle_id: raffle.id,
            customer: draft.customer,
            numbers: draft.numbers,
            total: draft.total,
            coupon_code: draft.coupon_code,
            now,
            expires_at,
        };

        let reservation = match self.env.store.reserve(request).await {
            Ok(reservation) => reservation,
            Err(e) => {
                let err = RaffleError::from(e);
                if let RaffleError::Conflict { numbers } = &err {
                    metrics::record_reservation_conflict();
                    tracing::info!(conflicting = ?numbers, "Reservation conflict");
                }
                return Err(err);
            }
        };

        let purchase = &reservation.purchase;
        metrics::record_reservation_created(purchase.numbers.len());
        tracing::info!(
            customer_id = %purchase.customer_id,
            total = purchase.total.cents(),
            expires_at = %purchase.expires_at,
            "Numbers reserved"
        );

        emit(
            self.env.events.as_ref(),
            DomainEvent::ReservationCreated {
                raffle_id: purchase.raffle_id,
                purchase_id: purchase.id,
                numbers: purchase.numbers.clone(),
                expires_at: purchase.expires_at,
            },
        )
        .await;

        Ok(reservation)
    }
}
