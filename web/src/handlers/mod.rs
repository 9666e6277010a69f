//! HTTP request handlers.
//!
//! This module contains all HTTP handlers organized by domain.

pub mod health;
pub mod purchases;
pub mod raffles;
pub mod webhooks;

pub use health::{health_check, metrics, readiness_check};
pub use purchases::{cancel_purchase, confirm_purchase, create_purchase};
pub use raffles::get_raffle;
pub use webhooks::receive_webhook;
