//! Dependency injection for the raffle services.
//!
//! Every service takes its collaborators through [`RaffleEnvironment`], so
//! production wires PostgreSQL and the system clock while tests wire the
//! in-memory store and a fixed clock.

use crate::events::EventPublisher;
use crate::store::RaffleStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Clock trait - abstracts time operations for testability
///
/// "Now" is always server-authoritative: TTL and expiry decisions never use
/// client-supplied timestamps.
///
/// # Examples
///
/// ```
/// use rifa_core::environment::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let _now = clock.now();
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Collaborators shared by the raffle services.
#[derive(Clone)]
pub struct RaffleEnvironment {
    /// Transactional store enforcing number exclusivity
    pub store: Arc<dyn RaffleStore>,
    /// Source of "now"
    pub clock: Arc<dyn Clock>,
    /// Sink for realtime notifications
    pub events: Arc<dyn EventPublisher>,
}

impl RaffleEnvironment {
    /// Bundles the collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn RaffleStore>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            clock,
            events,
        }
    }

    /// Current server time.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl std::fmt::Debug for RaffleEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaffleEnvironment").finish_non_exhaustive()
    }
}
