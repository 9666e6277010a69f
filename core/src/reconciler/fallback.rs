//! Last-resort target for success webhooks that carry no identifier.
//!
//! Some providers send activation-fee payments without the reference the
//! organizer attached. The fallback picks a raffle still waiting for
//! activation. It is a heuristic: with two activations pending in the same
//! scope it can pick the wrong one, which is why every use is logged at
//! `warn` and counted, and why [`FallbackPolicy::Unique`] exists.

use crate::error::StoreError;
use crate::store::RaffleStore;
use crate::types::{OrganizerId, Raffle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which raffle an identity-less success event may activate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// The most recently created raffle in `pending_activation`
    #[default]
    MostRecent,
    /// Only when exactly one raffle is in `pending_activation`
    Unique,
    /// Never; such events are ignored
    Disabled,
}

impl FallbackPolicy {
    /// Config name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MostRecent => "most_recent",
            Self::Unique => "unique",
            Self::Disabled => "disabled",
        }
    }

    /// Picks the raffle to activate within `organizer` (or globally).
    ///
    /// # Errors
    ///
    /// Returns the store error if the lookup fails.
    pub async fn resolve(
        self,
        store: &dyn RaffleStore,
        organizer: Option<OrganizerId>,
    ) -> Result<Option<Raffle>, StoreError> {
        match self {
            Self::Disabled => Ok(None),
            Self::MostRecent => Ok(store
                .pending_activation_raffles(organizer, 1)
                .await?
                .into_iter()
                .next()),
            Self::Unique => {
                let mut candidates = store.pending_activation_raffles(organizer, 2).await?;
                if candidates.len() > 1 {
                    tracing::warn!(
                        organizer_id = ?organizer,
                        "Several raffles pending activation; refusing to guess"
                    );
                    return Ok(None);
                }
                Ok(candidates.pop())
            }
        }
    }
}

impl fmt::Display for FallbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FallbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "most_recent" | "most-recent" => Ok(Self::MostRecent),
            "unique" => Ok(Self::Unique),
            "disabled" | "off" | "none" => Ok(Self::Disabled),
            other => Err(format!("unknown fallback policy: {other}")),
        }
    }
}
