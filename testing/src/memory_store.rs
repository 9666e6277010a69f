//! In-memory `RaffleStore`.
//!
//! A single mutex stands in for the database transaction: every method runs
//! to completion under the lock, which gives the same all-or-nothing
//! behaviour the PostgreSQL store gets from row locks.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use chrono::{DateTime, Utc};
use rifa_core::error::StoreError;
use rifa_core::lifecycle::Transition;
use rifa_core::store::{
    Cancellation, Confirmation, RaffleStore, Reservation, ReservationRequest, StoreFuture,
    SweepReport, WebhookReceipt,
};
use rifa_core::types::{
    CancelReason, Customer, CustomerId, Hold, HoldStatus, OrganizerId, Purchase, PurchaseId, PurchaseStatus,
    Raffle, RaffleId, RaffleStatus, TicketNumber,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct State {
    raffles: HashMap<RaffleId, Raffle>,
    customers: HashMap<String, Customer>,
    purchases: HashMap<PurchaseId, Purchase>,
    holds: BTreeMap<(RaffleId, TicketNumber), Hold>,
    receipts: HashMap<(String, String), WebhookReceipt>,
    failure: Option<StoreError>,
}

impl State {
    fn check(&self) -> Result<(), StoreError> {
        self.failure.clone().map_or(Ok(()), Err)
    }

    fn raffle_holds(&self, raffle_id: RaffleId) -> impl Iterator<Item = &Hold> {
        self.holds
            .range((raffle_id, TicketNumber::new(0))..=(raffle_id, TicketNumber::new(u32::MAX)))
            .map(|(_, hold)| hold)
    }

    fn holds_of(&self, purchase: &Purchase) -> usize {
        self.raffle_holds(purchase.raffle_id)
            .filter(|h| h.purchase_id == purchase.id)
            .count()
    }

    fn purchase_mut(&mut self, id: PurchaseId) -> Result<&mut Purchase, StoreError> {
        self.purchases.get_mut(&id).ok_or_else(|| StoreError::NotFound {
            resource: "purchase",
            id: id.to_string(),
        })
    }
}

/// In-memory raffle store for fast, deterministic tests.
///
/// Clones share state.
#[derive(Clone, Debug, Default)]
pub struct InMemoryRaffleStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryRaffleStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a raffle (organizer configuration is outside the core)
    pub fn insert_raffle(&self, raffle: Raffle) -> Raffle {
        self.state
            .lock()
            .unwrap()
            .raffles
            .insert(raffle.id, raffle.clone());
        raffle
    }

    /// Makes every call fail with `error` until cleared with `None`
    pub fn fail_with(&self, error: Option<StoreError>) {
        self.state.lock().unwrap().failure = error;
    }

    /// Every stored hold of a raffle, expired ones included
    #[must_use]
    pub fn stored_holds(&self, raffle_id: RaffleId) -> Vec<Hold> {
        self.state
            .lock()
            .unwrap()
            .raffle_holds(raffle_id)
            .cloned()
            .collect()
    }

    /// Customer by normalised phone
    #[must_use]
    pub fn customer_by_phone(&self, phone: &str) -> Option<Customer> {
        self.state.lock().unwrap().customers.get(phone).cloned()
    }

    /// Number of stored receipts
    #[must_use]
    pub fn receipt_count(&self) -> usize {
        self.state.lock().unwrap().receipts.len()
    }
}

impl RaffleStore for InMemoryRaffleStore {
    fn raffle(&self, id: RaffleId) -> StoreFuture<'_, Option<Raffle>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            state.check()?;
            Ok(state.raffles.get(&id).cloned())
        })
    }

    fn raffle_by_slug<'a>(&'a self, slug: &'a str) -> StoreFuture<'a, Option<Raffle>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            state.check()?;
            Ok(state.raffles.values().find(|r| r.slug == slug).cloned())
        })
    }

    fn pending_activation_raffles(
        &self,
        organizer: Option<OrganizerId>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<Raffle>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            state.check()?;
            let mut pending: Vec<Raffle> = state
                .raffles
                .values()
                .filter(|r| r.status == RaffleStatus::PendingActivation)
                .filter(|r| organizer.is_none_or(|o| r.organizer_id == o))
                .cloned()
                .collect();
            pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            pending.truncate(limit);
            Ok(pending)
        })
    }

    fn activate_raffle(&self, id: RaffleId) -> StoreFuture<'_, Transition<RaffleStatus>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.check()?;
            let raffle = state.raffles.get_mut(&id).ok_or_else(|| StoreError::NotFound {
                resource: "raffle",
                id: id.to_string(),
            })?;
            let transition = raffle.status.activate()?;
            raffle.status = transition.state();
            Ok(transition)
        })
    }

    fn purchase(&self, id: PurchaseId) -> StoreFuture<'_, Option<Purchase>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            state.check()?;
            Ok(state.purchases.get(&id).cloned())
        })
    }

    fn reserve(&self, request: ReservationRequest) -> StoreFuture<'_, Reservation> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.check()?;
            if !state.raffles.contains_key(&request.raffle_id) {
                return Err(StoreError::NotFound {
                    resource: "raffle",
                    id: request.raffle_id.to_string(),
                });
            }

            let conflicts: BTreeSet<TicketNumber> = request
                .numbers
                .iter()
                .copied()
                .filter(|n| {
                    state
                        .holds
                        .get(&(request.raffle_id, *n))
                        .is_some_and(|h| h.is_active(request.now))
                })
                .collect();
            if !conflicts.is_empty() {
                return Err(StoreError::Conflict {
                    numbers: conflicts.into_iter().collect(),
                });
            }

            let customer = {
                let entry = state
                    .customers
                    .entry(request.customer.phone.clone())
                    .or_insert_with(|| Customer {
                        id: CustomerId::new(),
                        phone: request.customer.phone.clone(),
                        name: request.customer.name.clone(),
                        created_at: request.now,
                    });
                entry.name.clone_from(&request.customer.name);
                entry.clone()
            };

            let purchase = Purchase {
                id: request.purchase_id,
                raffle_id: request.raffle_id,
                customer_id: customer.id,
                numbers: request.numbers.clone(),
                forfeited_numbers: Vec::new(),
                total: request.total,
                status: PurchaseStatus::Pending,
                coupon_code: request.coupon_code.clone(),
                created_at: request.now,
                expires_at: request.expires_at,
                paid_at: None,
                cancelled_at: None,
                cancel_reason: None,
            };

            // replaces any expired hold still stored for the number
            for number in &request.numbers {
                state.holds.insert(
                    (request.raffle_id, *number),
                    Hold {
                        raffle_id: request.raffle_id,
                        number: *number,
                        purchase_id: purchase.id,
                        status: HoldStatus::Held,
                        expires_at: request.expires_at,
                    },
                );
            }
            state.purchases.insert(purchase.id, purchase.clone());

            Ok(Reservation { purchase, customer })
        })
    }

    fn active_holds(&self, raffle_id: RaffleId, now: DateTime<Utc>) -> StoreFuture<'_, Vec<Hold>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            state.check()?;
            Ok(state
                .raffle_holds(raffle_id)
                .filter(|h| h.is_active(now))
                .cloned()
                .collect())
        })
    }

    fn release_expired(
        &self,
        raffle_id: RaffleId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, SweepReport> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.check()?;

            let expired: Vec<(RaffleId, TicketNumber)> = state
                .raffle_holds(raffle_id)
                .filter(|h| h.status == HoldStatus::Held && h.expires_at < now)
                .map(|h| (h.raffle_id, h.number))
                .collect();
            let mut candidates = BTreeSet::new();
            for key in &expired {
                if let Some(hold) = state.holds.remove(key) {
                    candidates.insert(hold.purchase_id);
                }
            }
            // purchases whose expired holds were already replaced by a newer reservation
            candidates.extend(
                state
                    .purchases
                    .values()
                    .filter(|p| {
                        p.raffle_id == raffle_id
                            && p.status == PurchaseStatus::Pending
                            && p.expires_at < now
                    })
                    .map(|p| p.id),
            );

            let mut cancelled = Vec::new();
            for id in candidates {
                let Some(purchase) = state.purchases.get(&id).cloned() else {
                    continue;
                };
                if state.holds_of(&purchase) > 0 {
                    continue;
                }
                let transition = purchase.status.expire();
                if transition.is_applied() {
                    let stored = state.purchase_mut(id)?;
                    stored.status = transition.state();
                    stored.cancelled_at = Some(now);
                    stored.cancel_reason = Some(CancelReason::Expired);
                    cancelled.push(stored.clone());
                }
            }

            Ok(SweepReport {
                released: expired.len(),
                cancelled,
            })
        })
    }

    fn confirm_purchase(
        &self,
        id: PurchaseId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Confirmation> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.check()?;
            let purchase = state.purchase_mut(id)?.clone();

            let transition = purchase.confirm_at(now);
            if !transition.is_applied() {
                return Ok(Confirmation {
                    transition,
                    purchase,
                    unavailable: Vec::new(),
                });
            }

            let mut kept = Vec::with_capacity(purchase.numbers.len());
            let mut unavailable = Vec::new();
            for number in &purchase.numbers {
                let key = (purchase.raffle_id, *number);
                let current = state.holds.get(&key).map(|h| (h.purchase_id, h.is_active(now)));
                match current {
                    Some((owner, _)) if owner == id => {
                        if let Some(hold) = state.holds.get_mut(&key) {
                            hold.status = HoldStatus::Paid;
                        }
                        kept.push(*number);
                    }
                    Some((_, true)) => unavailable.push(*number),
                    _ => {
                        kept.push(*number);
                        state.holds.insert(
                            key,
                            Hold {
                                raffle_id: purchase.raffle_id,
                                number: *number,
                                purchase_id: id,
                                status: HoldStatus::Paid,
                                expires_at: purchase.expires_at,
                            },
                        );
                    }
                }
            }
            unavailable.sort_unstable();

            let stored = state.purchase_mut(id)?;
            stored.status = transition.state();
            stored.paid_at = Some(now);
            stored.numbers = kept;
            stored.forfeited_numbers.extend(unavailable.iter().copied());
            stored.cancelled_at = None;
            stored.cancel_reason = None;
            Ok(Confirmation {
                transition,
                purchase: stored.clone(),
                unavailable,
            })
        })
    }

    fn cancel_purchase(
        &self,
        id: PurchaseId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Cancellation> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.check()?;
            let purchase = state.purchase_mut(id)?.clone();

            let transition = purchase.status.cancel();
            if !transition.is_applied() {
                return Ok(Cancellation {
                    transition,
                    purchase,
                    released: 0,
                });
            }

            let before = state.holds.len();
            state.holds.retain(|_, h| h.purchase_id != id);
            let released = before - state.holds.len();

            let stored = state.purchase_mut(id)?;
            stored.status = transition.state();
            stored.cancelled_at = Some(now);
            stored.cancel_reason = Some(CancelReason::Admin);
            Ok(Cancellation {
                transition,
                purchase: stored.clone(),
                released,
            })
        })
    }

    fn find_receipt<'a>(
        &'a self,
        provider: &'a str,
        event_key: &'a str,
    ) -> StoreFuture<'a, Option<WebhookReceipt>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            state.check()?;
            Ok(state
                .receipts
                .get(&(provider.to_string(), event_key.to_string()))
                .cloned())
        })
    }

    fn record_receipt(&self, receipt: WebhookReceipt) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.check()?;
            state
                .receipts
                .entry((receipt.provider.clone(), receipt.event_key.clone()))
                .or_insert(receipt);
            Ok(())
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.state.lock().unwrap().check() })
    }
}
