//! # Rifa Core
//!
//! Ticket reservation and payment reconciliation for the Rifa raffle
//! platform.
//!
//! Organizers create a fixed pool of numbered tickets; buyers reserve some,
//! pay off-platform via PIX, and a webhook or the organizer confirms payment.
//! This crate owns the rules that make that safe:
//!
//! - **Reservation ledger** ([`reservation`]): no two buyers hold the same
//!   number at the same time
//! - **Expiry sweeper** ([`sweeper`]): unpaid holds are released after their
//!   TTL, exactly once, and abandoned purchases are cancelled
//! - **Payment reconciler** ([`reconciler`]): webhooks from several providers
//!   become idempotent raffle activations and purchase confirmations
//! - **Pricing engine** ([`pricing`]): package tiers and coupons
//! - **PIX codec** ([`pix`]): static BRCode payment strings
//! - **Purchase orchestrator** ([`orchestrator`]): the buyer-facing sequence
//!
//! ## Architecture
//!
//! Services are plain structs over a [`RaffleEnvironment`]: a
//! [`RaffleStore`](store::RaffleStore), a [`Clock`](environment::Clock) and an
//! [`EventPublisher`](events::EventPublisher). All correctness-critical
//! invariants live in the store's transactions, so any number of stateless
//! instances may share one database.
//!
//! ## Example
//!
//! ```ignore
//! use rifa_core::*;
//!
//! let env = RaffleEnvironment::new(store, Arc::new(SystemClock), Arc::new(TracingEventPublisher));
//! let orchestrator = PurchaseOrchestrator::new(env.clone(), PurchaseLimits::default());
//!
//! let receipt = orchestrator
//!     .purchase(PurchaseRequest {
//!         raffle: RaffleRef::Slug("moto-0km".into()),
//!         name: "Maria".into(),
//!         phone: "(11) 99999-8888".into(),
//!         numbers: vec![7, 13, 42],
//!         coupon_code: Some("VIP5".into()),
//!     })
//!     .await?;
//! ```

pub mod environment;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod metrics;
pub mod orchestrator;
pub mod pix;
pub mod pricing;
pub mod raffles;
pub mod reconciler;
pub mod reservation;
pub mod settings;
pub mod store;
pub mod sweeper;
pub mod types;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use environment::{Clock, RaffleEnvironment, SystemClock};
pub use error::{RaffleError, StoreError};
pub use events::{DomainEvent, EventPublisher, TracingEventPublisher};
pub use lifecycle::Transition;
pub use orchestrator::{PurchaseLimits, PurchaseOrchestrator, PurchaseReceipt, PurchaseRequest, RaffleRef};
pub use pricing::{PricingEngine, Quote};
pub use raffles::{RaffleService, RaffleSnapshot};
pub use reconciler::{
    FallbackPolicy, PaymentReconciler, ProviderRegistry, ReconcileAction, Reconciliation,
    WebhookScope,
};
pub use reservation::ReservationLedger;
pub use settings::{PromotionRule, RaffleSettings};
pub use store::RaffleStore;
pub use sweeper::ExpirySweeper;
pub use types::{
    CancelReason, Customer, CustomerId, Hold, HoldStatus, Money, OrganizerId, Purchase, PurchaseId,
    PurchaseStatus, Raffle, RaffleId, RaffleStatus, TicketNumber,
};
