//! Payment reconciler.
//!
//! Turns webhooks from heterogeneous providers into one of two transitions:
//! activate a raffle (organizer paid the activation fee) or confirm a
//! purchase (buyer paid for numbers). Everything else is acknowledged as
//! ignored so providers stop retrying.
//!
//! # Flow
//!
//! ```text
//! payload ──► profile ──► status ──┬─ not success ──────────────► ignored
//!                                  │
//!                                  ▼
//!                             reference? ──no──► fallback ──► activate / ignored
//!                                  │
//!                  raffle:<id> ────┼──── purchase:<id> ──── <uuid>
//!                      │           │           │              │
//!                  activate        │        confirm      purchase? raffle?
//! ```
//!
//! Delivery is at least once. Exactly-once effect comes from the state
//! machines (re-applying a transition is a no-op) and from the receipt log,
//! which short-circuits redeliveries of an event already seen.

mod fallback;
pub mod providers;

pub use fallback::FallbackPolicy;
pub use providers::{Extractor, PaymentStatus, ProviderProfile, ProviderRegistry};

use crate::environment::RaffleEnvironment;
use crate::error::{RaffleError, Result};
use crate::events::{DomainEvent, emit};
use crate::lifecycle::Transition;
use crate::metrics;
use crate::store::{Cancellation, WebhookReceipt};
use crate::types::{
    CancelReason, OrganizerId, PurchaseId, PurchaseStatus, RaffleId, RaffleStatus, TicketNumber,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Name used for organizer-triggered confirmations.
pub const MANUAL_PROVIDER: &str = "manual";

/// What a reconciliation did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    /// Raffle moved (or already was) `active`
    ActivateRaffle,
    /// Purchase moved (or already was) paid
    ConfirmPurchase,
    /// Nothing applicable
    Ignored,
}

impl ReconcileAction {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ActivateRaffle => "activate_raffle",
            Self::ConfirmPurchase => "confirm_purchase",
            Self::Ignored => "ignored",
        }
    }
}

/// Outcome of one webhook.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Resulting action
    pub action: ReconcileAction,
    /// Raffle or purchase acted on
    pub target_id: Option<Uuid>,
    /// Whether state changed (false on redelivery)
    pub applied: bool,
    /// Normalised payment status
    pub status: PaymentStatus,
    /// Target found by the fallback strategy
    #[serde(default)]
    pub via_fallback: bool,
    /// Paid-for numbers another buyer took before a late payment arrived
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unavailable: Vec<TicketNumber>,
    /// Why the event was ignored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Answered from the receipt log
    #[serde(default)]
    pub duplicate: bool,
}

impl Reconciliation {
    fn ignored(status: PaymentStatus, target_id: Option<Uuid>, reason: impl Into<String>) -> Self {
        Self {
            action: ReconcileAction::Ignored,
            target_id,
            applied: false,
            status,
            via_fallback: false,
            unavailable: Vec::new(),
            reason: Some(reason.into()),
            duplicate: false,
        }
    }

    fn acted(action: ReconcileAction, target_id: Uuid, applied: bool, status: PaymentStatus) -> Self {
        Self {
            action,
            target_id: Some(target_id),
            applied,
            status,
            via_fallback: false,
            unavailable: Vec::new(),
            reason: None,
            duplicate: false,
        }
    }
}

/// Where a webhook arrived from; narrows the fallback strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WebhookScope {
    /// Organizer the webhook URL was issued to
    pub organizer: Option<OrganizerId>,
}

#[derive(Debug, PartialEq, Eq)]
enum Reference {
    Raffle(RaffleId),
    Purchase(PurchaseId),
    Bare(Uuid),
}

fn parse_reference(raw: &str) -> Option<Reference> {
    let raw = raw.trim();
    let (kind, id) = raw.split_once(':').unwrap_or(("", raw));
    let uuid = Uuid::parse_str(id.trim()).ok()?;
    match kind.trim().to_lowercase().as_str() {
        "raffle" | "rifa" => Some(Reference::Raffle(RaffleId::from_uuid(uuid))),
        "purchase" | "compra" => Some(Reference::Purchase(PurchaseId::from_uuid(uuid))),
        "" => Some(Reference::Bare(uuid)),
        _ => None,
    }
}

/// Applies payment events to raffles and purchases.
#[derive(Clone, Debug)]
pub struct PaymentReconciler {
    env: RaffleEnvironment,
    registry: ProviderRegistry,
    fallback: FallbackPolicy,
}

impl PaymentReconciler {
    /// Creates a reconciler.
    #[must_use]
    pub const fn new(
        env: RaffleEnvironment,
        registry: ProviderRegistry,
        fallback: FallbackPolicy,
    ) -> Self {
        Self {
            env,
            registry,
            fallback,
        }
    }

    /// Provider profiles in use.
    #[must_use]
    pub const fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Reconciles one webhook payload.
    ///
    /// Unknown references, non-success statuses and payloads with no usable
    /// identifier all come back as [`ReconcileAction::Ignored`] rather than
    /// errors, so the provider stops redelivering them.
    ///
    /// # Errors
    ///
    /// Returns [`RaffleError::UnknownProvider`] for an unregistered provider,
    /// or a storage error, in which case no receipt is recorded and a
    /// redelivery will be processed afresh.
    #[tracing::instrument(skip(self, payload, scope), fields(organizer_id = ?scope.organizer))]
    pub async fn reconcile(
        &self,
        provider: &str,
        payload: &Value,
        scope: WebhookScope,
    ) -> Result<Reconciliation> {
        let profile = self
            .registry
            .get(provider)
            .ok_or_else(|| RaffleError::UnknownProvider(provider.to_string()))?;
        let provider = profile.name.as_ref();

        let raw_status = profile.raw_status(payload);
        let status = profile.normalize(raw_status.as_deref());
        let event_key = profile.event_key(payload).map(|key| {
            format!("{key}:{}", raw_status.as_deref().unwrap_or_default().to_lowercase())
        });

        if let Some(key) = &event_key {
            if let Some(receipt) = self.env.store.find_receipt(provider, key).await? {
                match serde_json::from_value::<Reconciliation>(receipt.outcome) {
                    Ok(mut outcome) => {
                        tracing::debug!(event_key = %key, "Webhook already processed");
                        outcome.applied = false;
                        outcome.duplicate = true;
                        metrics::record_webhook(provider, outcome.action.as_str());
                        return Ok(outcome);
                    }
                    Err(e) => {
                        tracing::warn!(event_key = %key, error = %e, "Unreadable webhook receipt; reprocessing");
                    }
                }
            }
        }

        let outcome = match self.resolve(profile, payload, status, scope).await {
            Ok(outcome) => outcome,
            Err(RaffleError::IdentityExtraction { provider }) => {
                tracing::warn!(%provider, ?raw_status, "Webhook has no usable identifier; ignoring");
                Reconciliation::ignored(status, None, "no identifier in payload")
            }
            Err(e) => return Err(e),
        };

        if let Some(key) = event_key {
            self.record(provider, key, &outcome).await;
        }

        metrics::record_webhook(provider, outcome.action.as_str());
        tracing::info!(
            action = outcome.action.as_str(),
            target_id = ?outcome.target_id,
            applied = outcome.applied,
            status = status.as_str(),
            "Webhook reconciled"
        );
        Ok(outcome)
    }

    async fn resolve(
        &self,
        profile: &ProviderProfile,
        payload: &Value,
        status: PaymentStatus,
        scope: WebhookScope,
    ) -> Result<Reconciliation> {
        let reference = profile.reference(payload);

        if status != PaymentStatus::Success {
            let target = reference.as_deref().and_then(parse_reference).map(|r| match r {
                Reference::Raffle(id) => *id.as_uuid(),
                Reference::Purchase(id) => *id.as_uuid(),
                Reference::Bare(id) => id,
            });
            return Ok(Reconciliation::ignored(
                status,
                target,
                format!("payment status is {}", status.as_str()),
            ));
        }

        let Some(raw) = reference else {
            if !profile.allow_fallback {
                return Err(RaffleError::IdentityExtraction {
                    provider: profile.name.to_string(),
                });
            }
            return self.fallback(profile, status, scope).await;
        };

        match parse_reference(&raw) {
            Some(Reference::Raffle(id)) => self.activate(id, status).await,
            Some(Reference::Purchase(id)) => self.confirm(id, status).await,
            Some(Reference::Bare(uuid)) => {
                let purchase_id = PurchaseId::from_uuid(uuid);
                if self.env.store.purchase(purchase_id).await?.is_some() {
                    return self.confirm(purchase_id, status).await;
                }
                let raffle_id = RaffleId::from_uuid(uuid);
                if self.env.store.raffle(raffle_id).await?.is_some() {
                    return self.activate(raffle_id, status).await;
                }
                tracing::warn!(reference = %raw, "Webhook reference matches no raffle or purchase");
                Ok(Reconciliation::ignored(status, Some(uuid), "unknown reference"))
            }
            None => {
                tracing::warn!(reference = %raw, "Unrecognised webhook reference");
                Ok(Reconciliation::ignored(status, None, format!("unrecognised reference {raw}")))
            }
        }
    }

    async fn fallback(
        &self,
        profile: &ProviderProfile,
        status: PaymentStatus,
        scope: WebhookScope,
    ) -> Result<Reconciliation> {
        let candidate = self
            .fallback
            .resolve(self.env.store.as_ref(), scope.organizer)
            .await?;
        let Some(raffle) = candidate else {
            return Err(RaffleError::IdentityExtraction {
                provider: profile.name.to_string(),
            });
        };

        tracing::warn!(
            provider = %profile.name,
            policy = %self.fallback,
            raffle_id = %raffle.id,
            organizer_id = %raffle.organizer_id,
            "Webhook without identifier; activating pending raffle by fallback"
        );
        metrics::record_fallback();

        let mut outcome = self.activate(raffle.id, status).await?;
        outcome.via_fallback = true;
        Ok(outcome)
    }

    async fn activate(&self, id: RaffleId, status: PaymentStatus) -> Result<Reconciliation> {
        match self.activate_raffle(id).await {
            Ok(transition) => Ok(Reconciliation::acted(
                ReconcileAction::ActivateRaffle,
                *id.as_uuid(),
                transition.is_applied(),
                status,
            )),
            Err(RaffleError::NotFound { .. }) => {
                tracing::warn!(raffle_id = %id, "Activation for unknown raffle");
                Ok(Reconciliation::ignored(status, Some(*id.as_uuid()), "raffle not found"))
            }
            Err(RaffleError::InvalidState(reason)) => {
                tracing::warn!(raffle_id = %id, %reason, "Activation refused");
                Ok(Reconciliation::ignored(status, Some(*id.as_uuid()), reason))
            }
            Err(e) => Err(e),
        }
    }

    async fn confirm(&self, id: PurchaseId, status: PaymentStatus) -> Result<Reconciliation> {
        match self.confirm_purchase(id).await {
            Ok(outcome) => Ok(Reconciliation { status, ..outcome }),
            Err(RaffleError::NotFound { .. }) => {
                tracing::warn!(purchase_id = %id, "Confirmation for unknown purchase");
                Ok(Reconciliation::ignored(status, Some(*id.as_uuid()), "purchase not found"))
            }
            Err(e) => Err(e),
        }
    }

    async fn record(&self, provider: &str, event_key: String, outcome: &Reconciliation) {
        let outcome = match serde_json::to_value(outcome) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Could not serialise webhook outcome");
                return;
            }
        };
        let receipt = WebhookReceipt {
            provider: provider.to_string(),
            event_key,
            outcome,
            received_at: self.env.now(),
        };
        if let Err(e) = self.env.store.record_receipt(receipt).await {
            tracing::warn!(error = %e, "Could not record webhook receipt");
        }
    }

    /// Moves a raffle to `active`. A second call is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RaffleError::NotFound`], [`RaffleError::InvalidState`] for a
    /// drawn or closed raffle, or a storage error.
    #[tracing::instrument(skip(self), fields(raffle_id = %id))]
    pub async fn activate_raffle(&self, id: RaffleId) -> Result<Transition<RaffleStatus>> {
        let transition = self.env.store.activate_raffle(id).await?;
        if transition.is_applied() {
            tracing::info!("Raffle activated");
            emit(self.env.events.as_ref(), DomainEvent::RaffleActivated { raffle_id: id }).await;
        }
        Ok(transition)
    }

    /// Confirms payment of a purchase; used by the organizer endpoint and by
    /// webhooks.
    ///
    /// On time it becomes `confirmed`; late, or after the sweeper cancelled
    /// it, it becomes `paid_delayed`. A late purchase whose numbers were
    /// taken in the gap is still marked paid but keeps only the numbers it
    /// got back; the lost ones are returned in
    /// [`Reconciliation::unavailable`] for manual resolution. A purchase the
    /// organizer cancelled is left cancelled and the payment is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RaffleError::NotFound`] or a storage error.
    #[tracing::instrument(skip(self), fields(purchase_id = %id))]
    pub async fn confirm_purchase(&self, id: PurchaseId) -> Result<Reconciliation> {
        let now = self.env.now();
        let confirmation = self.env.store.confirm_purchase(id, now).await?;
        let purchase = &confirmation.purchase;

        if let Transition::Applied { from, to } = confirmation.transition {
            metrics::record_purchase_transition(to.as_str());
            tracing::info!(from = from.as_str(), to = to.as_str(), "Purchase paid");

            if !confirmation.unavailable.is_empty() {
                metrics::record_revive_conflicts(confirmation.unavailable.len());
                tracing::warn!(
                    raffle_id = %purchase.raffle_id,
                    unavailable = ?confirmation.unavailable,
                    "Late payment for numbers already taken by another purchase"
                );
            }

            emit(
                self.env.events.as_ref(),
                DomainEvent::PurchaseConfirmed {
                    raffle_id: purchase.raffle_id,
                    purchase_id: purchase.id,
                    status: to,
                    numbers: purchase.numbers.clone(),
                },
            )
            .await;
        } else if purchase.status == PurchaseStatus::Cancelled {
            tracing::warn!(
                raffle_id = %purchase.raffle_id,
                "Payment for a purchase the organizer cancelled"
            );
            return Ok(Reconciliation::ignored(
                PaymentStatus::Success,
                Some(*id.as_uuid()),
                "purchase was cancelled by the organizer",
            ));
        }

        Ok(Reconciliation {
            action: ReconcileAction::ConfirmPurchase,
            target_id: Some(*id.as_uuid()),
            applied: confirmation.transition.is_applied(),
            status: PaymentStatus::Success,
            via_fallback: false,
            unavailable: confirmation.unavailable,
            reason: None,
            duplicate: false,
        })
    }

    /// Cancels a purchase on the organizer's behalf, releasing every number
    /// including paid ones. A second call is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RaffleError::NotFound`] or a storage error.
    #[tracing::instrument(skip(self), fields(purchase_id = %id))]
    pub async fn cancel_purchase(&self, id: PurchaseId) -> Result<Cancellation> {
        let now = self.env.now();
        let cancellation = self.env.store.cancel_purchase(id, now).await?;
        if cancellation.transition.is_applied() {
            metrics::record_purchase_transition("cancelled");
            tracing::info!(released = cancellation.released, "Purchase cancelled by organizer");
            emit(
                self.env.events.as_ref(),
                DomainEvent::PurchaseCancelled {
                    raffle_id: cancellation.purchase.raffle_id,
                    purchase_id: id,
                    reason: CancelReason::Admin,
                },
            )
            .await;
        }
        Ok(cancellation)
    }
}
