//! # Rifa Testing
//!
//! Testing utilities for the Rifa raffle core.
//!
//! This crate provides:
//! - Clocks: [`FixedClock`], [`ManualClock`] and [`test_clock`]
//! - [`RecordingEventPublisher`]: captures emitted domain events
//! - [`InMemoryRaffleStore`]: a `RaffleStore` with the same transactional
//!   semantics as the PostgreSQL store, so every property of the core can be
//!   tested without a database
//! - Fixtures: [`RaffleBuilder`] and [`TestHarness`]
//!
//! ## Example
//!
//! ```ignore
//! use rifa_testing::{RaffleBuilder, TestHarness};
//!
//! #[tokio::test]
//! async fn reserves_numbers() {
//!     let harness = TestHarness::new();
//!     let raffle = harness.store.insert_raffle(RaffleBuilder::new().total_tickets(10).build());
//!     let orchestrator = harness.orchestrator();
//!     // ...
//! }
//! ```

mod fixtures;
mod memory_store;

pub use fixtures::{RaffleBuilder, TestHarness, purchase_request};
pub use memory_store::InMemoryRaffleStore;

use chrono::{DateTime, Utc};
use rifa_core::environment::Clock;

/// Mock implementations of environment traits
pub mod mocks {
    #![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

    use super::{Clock, DateTime, Utc};
    use rifa_core::events::{DomainEvent, EventPublisher, PublishError};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use rifa_testing::mocks::FixedClock;
    /// use rifa_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Clock that only moves when told to.
    ///
    /// Clones share the same time, so a test can keep one handle and give
    /// another to the environment.
    ///
    /// ```
    /// use rifa_testing::mocks::ManualClock;
    /// use rifa_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = ManualClock::new(Utc::now());
    /// let start = clock.now();
    /// clock.advance(Duration::seconds(2));
    /// assert_eq!(clock.now() - start, Duration::seconds(2));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Starts at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Moves time forward
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap();
            *time += by;
        }

        /// Jumps to `time`
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.lock().unwrap() = time;
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new(test_clock().now())
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap()
        }
    }

    /// Publisher that keeps every event for assertions.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingEventPublisher {
        events: Arc<Mutex<Vec<DomainEvent>>>,
    }

    impl RecordingEventPublisher {
        /// Empty recorder
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Events so far, in order
        #[must_use]
        pub fn events(&self) -> Vec<DomainEvent> {
            self.events.lock().unwrap().clone()
        }

        /// Event names so far, in order
        #[must_use]
        pub fn names(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().iter().map(DomainEvent::name).collect()
        }

        /// Forget recorded events
        pub fn clear(&self) {
            self.events.lock().unwrap().clear();
        }
    }

    impl EventPublisher for RecordingEventPublisher {
        fn publish(
            &self,
            event: DomainEvent,
        ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + '_>> {
            Box::pin(async move {
                self.events.lock().unwrap().push(event);
                Ok(())
            })
        }
    }
}

/// Installs a compact tracing subscriber for test output.
///
/// Safe to call from every test; only the first call installs it. Honours
/// `RUST_LOG`.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, RecordingEventPublisher, test_clock};
