//! Raffle and purchase state machines.
//!
//! Transitions are pure. Re-applying a transition that has already happened
//! yields [`Transition::Unchanged`] instead of an error, which is what makes
//! webhook redelivery harmless.
//!
//! ```text
//! Raffle:    pending_activation --activate--> active
//!
//! Purchase:  pending   --confirm(on time)--> confirmed
//!            pending   --confirm(late)-----> paid_delayed
//!            pending   --expire------------> cancelled
//!            cancelled --confirm(late)-----> paid_delayed   (revive, expired only)
//!            any       --cancel (admin)----> cancelled
//! ```
//!
//! A purchase an organizer cancelled stays cancelled whatever payment
//! arrives later.

use crate::types::{CancelReason, Purchase, PurchaseStatus, RaffleStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of a state transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Transition<S> {
    /// State moved from `from` to `to`
    Applied {
        /// State before
        from: S,
        /// State after
        to: S,
    },
    /// Already in the target (or a later) state; nothing to do
    Unchanged {
        /// Current state
        state: S,
    },
}

impl<S: Copy> Transition<S> {
    /// Whether the transition changed anything.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// State after the transition.
    #[must_use]
    pub const fn state(&self) -> S {
        match self {
            Self::Applied { to, .. } => *to,
            Self::Unchanged { state } => *state,
        }
    }
}

/// A transition the state machine does not allow.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot {action} from state {from}")]
pub struct InvalidTransition {
    /// Attempted action
    pub action: &'static str,
    /// State the entity was in
    pub from: &'static str,
}

impl RaffleStatus {
    /// Activates a raffle once its fee is paid.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] for a drawn or closed raffle, which the
    /// activation path must never reopen.
    pub const fn activate(self) -> Result<Transition<Self>, InvalidTransition> {
        match self {
            Self::PendingActivation => Ok(Transition::Applied {
                from: self,
                to: Self::Active,
            }),
            Self::Active => Ok(Transition::Unchanged { state: self }),
            Self::Drawn | Self::Closed => Err(InvalidTransition {
                action: "activate",
                from: self.as_str(),
            }),
        }
    }
}

impl PurchaseStatus {
    /// Applies a payment confirmation to a live purchase.
    ///
    /// `late` is whether payment arrived after the hold window. A cancelled
    /// purchase is left alone; see [`PurchaseStatus::revive`].
    #[must_use]
    pub const fn confirm(self, late: bool) -> Transition<Self> {
        match self {
            Self::Pending if late => Transition::Applied {
                from: self,
                to: Self::PaidDelayed,
            },
            Self::Pending => Transition::Applied {
                from: self,
                to: Self::Confirmed,
            },
            Self::Confirmed | Self::PaidDelayed | Self::Cancelled => {
                Transition::Unchanged { state: self }
            }
        }
    }

    /// Revives an expired purchase whose payment turned up after the sweep.
    #[must_use]
    pub const fn revive(self) -> Transition<Self> {
        match self {
            Self::Cancelled => Transition::Applied {
                from: self,
                to: Self::PaidDelayed,
            },
            Self::Pending | Self::Confirmed | Self::PaidDelayed => {
                Transition::Unchanged { state: self }
            }
        }
    }

    /// Applies expiry after every hold of the purchase was released.
    ///
    /// Only pending purchases expire; paid ones keep their status.
    #[must_use]
    pub const fn expire(self) -> Transition<Self> {
        match self {
            Self::Pending => Transition::Applied {
                from: self,
                to: Self::Cancelled,
            },
            Self::Confirmed | Self::PaidDelayed | Self::Cancelled => {
                Transition::Unchanged { state: self }
            }
        }
    }

    /// Applies an explicit organizer cancellation.
    #[must_use]
    pub const fn cancel(self) -> Transition<Self> {
        match self {
            Self::Cancelled => Transition::Unchanged { state: self },
            Self::Pending | Self::Confirmed | Self::PaidDelayed => Transition::Applied {
                from: self,
                to: Self::Cancelled,
            },
        }
    }
}

impl Purchase {
    /// Transition for a payment confirmed at `now`.
    ///
    /// Revives the purchase only when the sweeper cancelled it.
    #[must_use]
    pub fn confirm_at(&self, now: DateTime<Utc>) -> Transition<PurchaseStatus> {
        match (self.status, self.cancel_reason) {
            (PurchaseStatus::Cancelled, Some(CancelReason::Expired)) => self.status.revive(),
            (status, _) => status.confirm(self.is_late(now)),
        }
    }
}
