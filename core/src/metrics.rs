//! Business metrics for the raffle core.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `rifa_reservations_total{status}` - Reservation attempts (`created`, `conflict`)
//! - `rifa_tickets_reserved_total` - Numbers held by new reservations
//! - `rifa_holds_released_total` - Expired holds released by the sweeper
//! - `rifa_purchases_total{status}` - Purchase transitions (`confirmed`, `paid_delayed`, `cancelled`)
//! - `rifa_webhooks_total{provider,action}` - Reconciled webhooks by outcome
//! - `rifa_reconciler_fallback_total` - Webhooks resolved by the identity-less fallback
//! - `rifa_revive_conflicts_total` - Numbers lost by late payments

use metrics::describe_counter;

/// Registers all metric descriptions.
///
/// Call once at startup, before any metric is recorded.
pub fn register_metrics() {
    describe_counter!(
        "rifa_reservations_total",
        "Reservation attempts by outcome (created, conflict)"
    );
    describe_counter!(
        "rifa_tickets_reserved_total",
        "Ticket numbers held by new reservations"
    );
    describe_counter!(
        "rifa_holds_released_total",
        "Expired holds released by the sweeper"
    );
    describe_counter!(
        "rifa_purchases_total",
        "Purchase status transitions (confirmed, paid_delayed, cancelled)"
    );
    describe_counter!(
        "rifa_webhooks_total",
        "Payment webhooks by provider and resulting action"
    );
    describe_counter!(
        "rifa_reconciler_fallback_total",
        "Webhooks resolved through the most-recent-pending-raffle fallback"
    );
    describe_counter!(
        "rifa_revive_conflicts_total",
        "Numbers of revived purchases already taken by another buyer"
    );

    tracing::info!("Raffle metrics registered");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record a successful reservation of `quantity` numbers.
pub fn record_reservation_created(quantity: usize) {
    metrics::counter!("rifa_reservations_total", "status" => "created").increment(1);
    metrics::counter!("rifa_tickets_reserved_total").increment(quantity as u64);
}

/// Record a reservation rejected because numbers were taken.
pub fn record_reservation_conflict() {
    metrics::counter!("rifa_reservations_total", "status" => "conflict").increment(1);
}

/// Record holds released by a sweep.
pub fn record_holds_released(released: usize) {
    if released > 0 {
        metrics::counter!("rifa_holds_released_total").increment(released as u64);
    }
}

/// Record a purchase reaching `status`.
pub fn record_purchase_transition(status: &'static str) {
    metrics::counter!("rifa_purchases_total", "status" => status).increment(1);
}

/// Record a reconciled webhook.
pub fn record_webhook(provider: &str, action: &'static str) {
    metrics::counter!(
        "rifa_webhooks_total",
        "provider" => provider.to_owned(),
        "action" => action
    )
    .increment(1);
}

/// Record a webhook resolved through the fallback strategy.
pub fn record_fallback() {
    metrics::counter!("rifa_reconciler_fallback_total").increment(1);
}

/// Record numbers a revived purchase could not get back.
pub fn record_revive_conflicts(count: usize) {
    if count > 0 {
        metrics::counter!("rifa_revive_conflicts_total").increment(count as u64);
    }
}
