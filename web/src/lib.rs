//! HTTP surface for the Rifa raffle core.
//!
//! A thin Axum shell over the core services: handlers parse the request,
//! call one service and map the outcome or [`RaffleError`](rifa_core::RaffleError)
//! to a response. No business rule lives here.
//!
//! # Request Flow
//!
//! 1. **HTTP Request** arrives, gets an `x-request-id` and a tracing span
//! 2. **Extract data** from path, query and JSON body
//! 3. **Call** the orchestrator, reconciler or raffle service
//! 4. **Map result** to JSON, or [`AppError`] to a status and error body
//!
//! # Example
//!
//! ```ignore
//! use rifa_web::{AppState, Config, build_router};
//!
//! let config = Config::from_env()?;
//! let state = AppState::from_config(&env, &config);
//! let app = build_router(state, config.server.request_timeout);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod routes;
pub mod shutdown;
pub mod state;

pub use config::{Config, ConfigError, ServerConfig};
pub use error::AppError;
pub use events::BroadcastEventPublisher;
pub use routes::{REQUEST_ID_HEADER, build_router};
pub use shutdown::{serve_with_grace, shutdown_signal};
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
