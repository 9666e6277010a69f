//! Error types for the raffle core.

use crate::lifecycle::InvalidTransition;
use crate::settings::SettingsError;
use crate::types::TicketNumber;
use thiserror::Error;

/// Errors returned by a [`RaffleStore`](crate::store::RaffleStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// One or more requested numbers are held or paid by another purchase.
    ///
    /// Nothing was written.
    #[error("Numbers already taken: {numbers:?}")]
    Conflict {
        /// Every conflicting number, ascending
        numbers: Vec<TicketNumber>,
    },

    /// The referenced record does not exist
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Kind of record (`raffle`, `purchase`, ...)
        resource: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// The transition is not allowed from the record's current state
    #[error("Invalid state transition: {0}")]
    InvalidState(String),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// A stored value could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The store did not answer within the request deadline
    #[error("Store operation timed out")]
    Timeout,
}

impl From<InvalidTransition> for StoreError {
    fn from(err: InvalidTransition) -> Self {
        Self::InvalidState(err.to_string())
    }
}

/// Errors surfaced by the raffle services.
///
/// An already-applied transition is not an error: it is reported as
/// [`Transition::Unchanged`](crate::lifecycle::Transition::Unchanged).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RaffleError {
    /// Malformed input, rejected before any side effect
    #[error("Validation error: {0}")]
    Validation(String),

    /// Requested numbers are unavailable; the whole operation was aborted
    #[error("Numbers unavailable: {numbers:?}")]
    Conflict {
        /// Conflicting numbers
        numbers: Vec<TicketNumber>,
    },

    /// Unknown raffle, purchase or slug
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Kind of record
        resource: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// A webhook carried no usable identifier and the fallback found nothing
    #[error("No identifier could be extracted from {provider} payload")]
    IdentityExtraction {
        /// Provider that sent the payload
        provider: String,
    },

    /// No provider profile is registered under this name
    #[error("Unknown payment provider: {0}")]
    UnknownProvider(String),

    /// The state machine refused the transition
    #[error("Invalid state transition: {0}")]
    InvalidState(String),

    /// Underlying store failure
    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for RaffleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { numbers } => Self::Conflict { numbers },
            StoreError::NotFound { resource, id } => Self::NotFound { resource, id },
            StoreError::InvalidState(msg) => Self::InvalidState(msg),
            other => Self::Storage(other),
        }
    }
}

impl From<SettingsError> for RaffleError {
    fn from(err: SettingsError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<InvalidTransition> for RaffleError {
    fn from(err: InvalidTransition) -> Self {
        Self::InvalidState(err.to_string())
    }
}

/// Result alias for the raffle services.
pub type Result<T> = std::result::Result<T, RaffleError>;
