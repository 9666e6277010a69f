//! Builders for test data and a ready-wired environment.

use crate::memory_store::InMemoryRaffleStore;
use crate::mocks::{ManualClock, RecordingEventPublisher};
use chrono::{DateTime, Duration, Utc};
use rifa_core::environment::{Clock, RaffleEnvironment};
use rifa_core::orchestrator::{PurchaseLimits, PurchaseOrchestrator, PurchaseRequest, RaffleRef};
use rifa_core::raffles::RaffleService;
use rifa_core::reconciler::{FallbackPolicy, PaymentReconciler, ProviderRegistry};
use rifa_core::reservation::ReservationLedger;
use rifa_core::settings::{PixSettings, PromotionRule, RaffleSettings};
use rifa_core::sweeper::ExpirySweeper;
use rifa_core::types::{Money, OrganizerId, Raffle, RaffleId, RaffleStatus};
use std::sync::Arc;

/// Builder for [`Raffle`] with test defaults: 100 tickets at R$ 10,00,
/// active, no promotions.
#[derive(Clone, Debug)]
pub struct RaffleBuilder {
    raffle: Raffle,
}

impl RaffleBuilder {
    /// Defaults, with a unique slug
    #[must_use]
    pub fn new() -> Self {
        let id = RaffleId::new();
        Self {
            raffle: Raffle {
                id,
                organizer_id: OrganizerId::new(),
                slug: format!("raffle-{}", id.as_uuid().simple()),
                title: "Test raffle".to_string(),
                total_tickets: 100,
                unit_price: Money::from_cents(1_000),
                status: RaffleStatus::Active,
                draw_at: None,
                settings: RaffleSettings::default(),
                created_at: crate::test_clock().now(),
            },
        }
    }

    /// Sets the slug
    #[must_use]
    pub fn slug(mut self, slug: &str) -> Self {
        slug.clone_into(&mut self.raffle.slug);
        self
    }

    /// Sets the ticket count
    #[must_use]
    pub const fn total_tickets(mut self, total: u32) -> Self {
        self.raffle.total_tickets = total;
        self
    }

    /// Sets the unit price in centavos
    #[must_use]
    pub const fn unit_price_cents(mut self, cents: u64) -> Self {
        self.raffle.unit_price = Money::from_cents(cents);
        self
    }

    /// Sets the status
    #[must_use]
    pub const fn status(mut self, status: RaffleStatus) -> Self {
        self.raffle.status = status;
        self
    }

    /// Sets the organizer
    #[must_use]
    pub const fn organizer(mut self, organizer: OrganizerId) -> Self {
        self.raffle.organizer_id = organizer;
        self
    }

    /// Sets the creation time
    #[must_use]
    pub const fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.raffle.created_at = at;
        self
    }

    /// Adds a promotion rule
    #[must_use]
    pub fn promotion(mut self, rule: PromotionRule) -> Self {
        self.raffle.settings.promotions.push(rule);
        self
    }

    /// Overrides the hold TTL
    #[must_use]
    pub const fn ttl_seconds(mut self, seconds: u64) -> Self {
        self.raffle.settings.reservation_ttl_seconds = Some(seconds);
        self
    }

    /// Adds PIX receiving details
    #[must_use]
    pub fn pix(mut self, key: &str, merchant_name: &str, merchant_city: &str) -> Self {
        self.raffle.settings.pix = Some(PixSettings {
            key: key.to_string(),
            merchant_name: merchant_name.to_string(),
            merchant_city: merchant_city.to_string(),
        });
        self
    }

    /// Finishes the raffle
    #[must_use]
    pub fn build(self) -> Raffle {
        self.raffle
    }
}

impl Default for RaffleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory store, manual clock and recording publisher wired into a
/// [`RaffleEnvironment`].
#[derive(Clone, Debug)]
pub struct TestHarness {
    /// Shared store
    pub store: InMemoryRaffleStore,
    /// Shared clock, starting at 2025-01-01
    pub clock: ManualClock,
    /// Recorded events
    pub events: RecordingEventPublisher,
}

impl TestHarness {
    /// Fresh harness
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: InMemoryRaffleStore::new(),
            clock: ManualClock::default(),
            events: RecordingEventPublisher::new(),
        }
    }

    /// Environment over the harness collaborators
    #[must_use]
    pub fn env(&self) -> RaffleEnvironment {
        RaffleEnvironment::new(
            Arc::new(self.store.clone()),
            Arc::new(self.clock.clone()),
            Arc::new(self.events.clone()),
        )
    }

    /// Orchestrator with default limits
    #[must_use]
    pub fn orchestrator(&self) -> PurchaseOrchestrator {
        PurchaseOrchestrator::new(self.env(), PurchaseLimits::default())
    }

    /// Reconciler with the built-in providers and `policy`
    #[must_use]
    pub fn reconciler(&self, policy: FallbackPolicy) -> PaymentReconciler {
        PaymentReconciler::new(self.env(), ProviderRegistry::builtin(), policy)
    }

    /// Ledger
    #[must_use]
    pub fn ledger(&self) -> ReservationLedger {
        ReservationLedger::new(self.env())
    }

    /// Sweeper
    #[must_use]
    pub fn sweeper(&self) -> ExpirySweeper {
        ExpirySweeper::new(self.env())
    }

    /// Read service
    #[must_use]
    pub fn raffles(&self) -> RaffleService {
        RaffleService::new(self.env())
    }

    /// Moves the clock forward
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A purchase request for `numbers` in `raffle` by a fixed test buyer.
#[must_use]
pub fn purchase_request(raffle: &Raffle, numbers: &[u32]) -> PurchaseRequest {
    PurchaseRequest {
        raffle: RaffleRef::Id(raffle.id),
        name: "Maria Silva".to_string(),
        phone: "(11) 99999-8888".to_string(),
        numbers: numbers.to_vec(),
        coupon_code: None,
    }
}
