//! Public raffle page.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use rifa_core::raffles::RaffleSnapshot;

/// Raffle with its currently taken numbers.
///
/// Expired holds are swept before reading, so a number shown as taken is
/// really taken.
///
/// # Endpoint
///
/// ```text
/// GET /raffle/{slug}
/// ```
///
/// # Errors
///
/// Unknown slug (404) or storage errors.
pub async fn get_raffle(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<RaffleSnapshot>, AppError> {
    Ok(Json(state.raffles.snapshot(&slug).await?))
}
