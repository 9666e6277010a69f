//! Payment provider webhooks.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
};
use rifa_core::reconciler::{Reconciliation, WebhookScope};
use rifa_core::types::OrganizerId;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

/// Query string of a webhook URL.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookQuery {
    /// Organizer the URL was issued to; narrows the fallback
    pub organizer: Option<Uuid>,
}

/// Receive a raw provider payload.
///
/// Anything the reconciler cannot act on is acknowledged with 200 and
/// `"action": "ignored"` so the provider stops redelivering it. Store
/// failures answer 5xx (or 408) so the provider retries later.
///
/// # Endpoint
///
/// ```text
/// POST /webhooks/{provider}?organizer={uuid}
/// ```
///
/// # Errors
///
/// Malformed JSON (400), unknown provider (404), storage errors.
#[tracing::instrument(skip_all, fields(provider = %provider))]
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<WebhookQuery>,
    body: Bytes,
) -> Result<Json<Reconciliation>, AppError> {
    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "Webhook body is not JSON");
        AppError::bad_request("Webhook body must be JSON")
    })?;
    let scope = WebhookScope {
        organizer: query.organizer.map(OrganizerId::from_uuid),
    };

    let outcome = state.reconciler.reconcile(&provider, &payload, scope).await?;
    Ok(Json(outcome))
}
