//! Read path for a raffle's public page.

use crate::environment::RaffleEnvironment;
use crate::error::{RaffleError, Result};
use crate::sweeper::ExpirySweeper;
use crate::types::{Hold, Raffle};
use serde::Serialize;

/// A raffle and the numbers currently taken.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RaffleSnapshot {
    /// The raffle
    pub raffle: Raffle,
    /// Active holds (unexpired `held` plus all `paid`), by number
    pub holds: Vec<Hold>,
    /// Numbers nobody holds
    pub available: u32,
}

/// Serves raffle state, sweeping before every read.
#[derive(Clone, Debug)]
pub struct RaffleService {
    env: RaffleEnvironment,
    sweeper: ExpirySweeper,
}

impl RaffleService {
    /// Creates the service.
    #[must_use]
    pub fn new(env: RaffleEnvironment) -> Self {
        Self {
            sweeper: ExpirySweeper::new(env.clone()),
            env,
        }
    }

    /// Loads a raffle by slug with its active holds.
    ///
    /// # Errors
    ///
    /// Returns [`RaffleError::NotFound`] for an unknown slug, or a storage
    /// error.
    #[tracing::instrument(skip(self))]
    pub async fn snapshot(&self, slug: &str) -> Result<RaffleSnapshot> {
        let raffle = self
            .env
            .store
            .raffle_by_slug(slug)
            .await?
            .ok_or_else(|| RaffleError::NotFound {
                resource: "raffle",
                id: slug.to_string(),
            })?;

        self.sweeper.sweep(raffle.id).await?;

        let holds = self.env.store.active_holds(raffle.id, self.env.now()).await?;
        let taken = u32::try_from(holds.len()).unwrap_or(u32::MAX);
        Ok(RaffleSnapshot {
            available: raffle.total_tickets.saturating_sub(taken),
            raffle,
            holds,
        })
    }
}
