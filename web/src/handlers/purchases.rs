//! Buyer purchases and organizer-triggered payment transitions.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rifa_core::metrics;
use rifa_core::orchestrator::{PurchaseReceipt, PurchaseRequest, RaffleRef};
use rifa_core::reconciler::{MANUAL_PROVIDER, Reconciliation};
use rifa_core::types::{Purchase, PurchaseId, RaffleId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `POST /purchase`.
///
/// The raffle is named by `raffleId` or `slug`. Missing buyer fields
/// deserialize as empty and are rejected by the orchestrator's validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseBody {
    /// Raffle id
    pub raffle_id: Option<Uuid>,
    /// Raffle slug, used when no id is given
    pub slug: Option<String>,
    /// Buyer name
    #[serde(default)]
    pub name: String,
    /// Buyer phone
    #[serde(default)]
    pub phone: String,
    /// Requested numbers
    #[serde(default)]
    pub numbers: Vec<u32>,
    /// Optional coupon
    pub coupon_code: Option<String>,
}

impl TryFrom<PurchaseBody> for PurchaseRequest {
    type Error = AppError;

    fn try_from(body: PurchaseBody) -> Result<Self, Self::Error> {
        let raffle = match (body.raffle_id, body.slug) {
            (Some(id), _) => RaffleRef::Id(RaffleId::from_uuid(id)),
            (None, Some(slug)) if !slug.trim().is_empty() => RaffleRef::Slug(slug),
            _ => return Err(AppError::validation("raffleId or slug is required")),
        };
        Ok(Self {
            raffle,
            name: body.name,
            phone: body.phone,
            numbers: body.numbers,
            coupon_code: body.coupon_code,
        })
    }
}

/// Reserve numbers and open a pending purchase.
///
/// # Endpoint
///
/// ```text
/// POST /purchase
/// {"slug": "moto-0km", "name": "Maria", "phone": "11999998888", "numbers": [7, 13], "couponCode": "VIP5"}
/// ```
///
/// Answers 201 with the purchase, customer, price breakdown and PIX code.
/// Taken numbers answer 409 with `numbers` listing every conflict.
///
/// # Errors
///
/// Validation (422), unknown raffle (404), conflict or raffle not on sale
/// (409), store timeout (408).
pub async fn create_purchase(
    State(state): State<AppState>,
    Json(body): Json<PurchaseBody>,
) -> Result<(StatusCode, Json<PurchaseReceipt>), AppError> {
    let request = PurchaseRequest::try_from(body)?;
    let receipt = state.orchestrator.purchase(request).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Organizer confirms payment received outside any provider.
///
/// # Endpoint
///
/// ```text
/// POST /purchases/{id}/confirm
/// ```
///
/// # Errors
///
/// Unknown purchase (404) or storage errors.
pub async fn confirm_purchase(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Reconciliation>, AppError> {
    let outcome = state
        .reconciler
        .confirm_purchase(PurchaseId::from_uuid(id))
        .await?;
    metrics::record_webhook(MANUAL_PROVIDER, outcome.action.as_str());
    Ok(Json(outcome))
}

/// Result of an organizer cancellation.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    /// Purchase after the call
    pub purchase: Purchase,
    /// False when it was already cancelled
    pub applied: bool,
    /// Numbers released
    pub released: usize,
}

/// Organizer cancels a purchase, releasing its numbers even if paid.
///
/// # Endpoint
///
/// ```text
/// POST /purchases/{id}/cancel
/// ```
///
/// # Errors
///
/// Unknown purchase (404) or storage errors.
pub async fn cancel_purchase(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelResponse>, AppError> {
    let cancellation = state
        .reconciler
        .cancel_purchase(PurchaseId::from_uuid(id))
        .await?;
    Ok(Json(CancelResponse {
        applied: cancellation.transition.is_applied(),
        released: cancellation.released,
        purchase: cancellation.purchase,
    }))
}
