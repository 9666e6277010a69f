//! Expiry sweeper.
//!
//! Pull-based: invoked before reads of raffle availability and before
//! reservation attempts, never on a timer. Correctness of reservations does
//! not depend on it having run; it only keeps the stored holds tidy and moves
//! abandoned purchases to `cancelled`.

use crate::environment::RaffleEnvironment;
use crate::error::Result;
use crate::events::{DomainEvent, emit};
use crate::metrics;
use crate::types::{CancelReason, RaffleId};

/// Releases expired holds and cancels the purchases they leave empty.
#[derive(Clone, Debug)]
pub struct ExpirySweeper {
    env: RaffleEnvironment,
}

impl ExpirySweeper {
    /// Creates a sweeper over the environment's store.
    #[must_use]
    pub const fn new(env: RaffleEnvironment) -> Self {
        Self { env }
    }

    /// Sweeps one raffle and returns the number of holds released.
    ///
    /// Safe to call concurrently and repeatedly; a clean raffle yields 0.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store fails.
    #[tracing::instrument(skip(self), fields(raffle_id = %raffle_id))]
    pub async fn sweep(&self, raffle_id: RaffleId) -> Result<usize> {
        let now = self.env.now();
        let report = self.env.store.release_expired(raffle_id, now).await?;

        metrics::record_holds_released(report.released);
        if report.released > 0 || !report.cancelled.is_empty() {
            tracing::info!(
                released = report.released,
                cancelled = report.cancelled.len(),
                "Expired holds released"
            );
        }

        for purchase in report.cancelled {
            metrics::record_purchase_transition("cancelled");
            emit(
                self.env.events.as_ref(),
                DomainEvent::PurchaseCancelled {
                    raffle_id: purchase.raffle_id,
                    purchase_id: purchase.id,
                    reason: CancelReason::Expired,
                },
            )
            .await;
        }

        Ok(report.released)
    }
}
