//! Provider profiles: how to read identity, status and event id from each
//! payment provider's webhook payload.
//!
//! Every concern is an ordered list of [`Extractor`]s. Extractors are total
//! (they return `None` instead of failing) and are tried in order until one
//! yields a non-empty string.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;

/// Normalised payment status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Money received
    Success,
    /// Not settled yet, or unrecognised
    Pending,
    /// Rejected, refunded, expired
    Failure,
}

impl PaymentStatus {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Pending => "pending",
            Self::Failure => "failure",
        }
    }
}

/// Custom extraction function.
pub type ExtractFn = fn(&Value) -> Option<String>;

/// One way of pulling a string out of a payload.
#[derive(Clone, Debug)]
pub enum Extractor {
    /// Dot-separated path; numeric segments index arrays (`pix.0.txid`)
    Field(Cow<'static, str>),
    /// Arbitrary function
    Custom(ExtractFn),
}

impl Extractor {
    /// Extracts a non-empty string, if present.
    #[must_use]
    pub fn extract(&self, payload: &Value) -> Option<String> {
        match self {
            Self::Field(path) => lookup(payload, path).and_then(scalar_to_string),
            Self::Custom(f) => f(payload).filter(|s| !s.trim().is_empty()),
        }
    }
}

/// Shorthand for a path extractor.
#[must_use]
pub const fn field(path: &'static str) -> Extractor {
    Extractor::Field(Cow::Borrowed(path))
}

/// Follows a dot path through objects and arrays.
#[must_use]
pub fn lookup<'v>(payload: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(payload, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_match(extractors: &[Extractor], payload: &Value) -> Option<String> {
    extractors.iter().find_map(|e| e.extract(payload))
}

/// How one payment provider shapes its webhooks.
#[derive(Clone, Debug)]
pub struct ProviderProfile {
    /// Provider name as used in `/webhooks/{provider}`
    pub name: Cow<'static, str>,
    /// Where the raffle or purchase reference may be found
    pub references: Vec<Extractor>,
    /// Where the payment status may be found
    pub statuses: Vec<Extractor>,
    /// Where a stable event or payment id may be found
    pub event_keys: Vec<Extractor>,
    /// Lowercase substrings meaning the payment settled
    pub success_tokens: Vec<&'static str>,
    /// Lowercase substrings meaning the payment failed
    pub failure_tokens: Vec<&'static str>,
    /// Whether identity-less success events may use the fallback strategy
    pub allow_fallback: bool,
}

impl ProviderProfile {
    /// First non-empty reference.
    #[must_use]
    pub fn reference(&self, payload: &Value) -> Option<String> {
        first_match(&self.references, payload)
    }

    /// First non-empty raw status.
    #[must_use]
    pub fn raw_status(&self, payload: &Value) -> Option<String> {
        first_match(&self.statuses, payload)
    }

    /// First non-empty event id.
    #[must_use]
    pub fn event_key(&self, payload: &Value) -> Option<String> {
        first_match(&self.event_keys, payload)
    }

    /// Maps a raw status onto [`PaymentStatus`].
    ///
    /// Case-insensitive substring match; failure tokens are checked first so
    /// that e.g. `not_paid` style statuses are never read as success. A
    /// missing or unrecognised status is `Pending`.
    #[must_use]
    pub fn normalize(&self, raw: Option<&str>) -> PaymentStatus {
        let Some(raw) = raw else {
            return PaymentStatus::Pending;
        };
        let raw = raw.to_lowercase();
        if self.failure_tokens.iter().any(|t| raw.contains(t)) {
            PaymentStatus::Failure
        } else if self.success_tokens.iter().any(|t| raw.contains(t)) {
            PaymentStatus::Success
        } else {
            PaymentStatus::Pending
        }
    }
}

/// Provider profiles by name.
#[derive(Clone, Debug, Default)]
pub struct ProviderRegistry {
    profiles: HashMap<String, ProviderProfile>,
}

impl ProviderRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `mercadopago`, `asaas`, `openpix`, `efi` and `manual`.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for profile in [mercadopago(), asaas(), openpix(), efi(), manual()] {
            registry.register(profile);
        }
        registry
    }

    /// Adds or replaces a profile.
    pub fn register(&mut self, profile: ProviderProfile) {
        self.profiles.insert(profile.name.to_lowercase(), profile);
    }

    /// Looks a profile up by name, case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ProviderProfile> {
        self.profiles.get(&name.to_lowercase())
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn prefixed(prefix: &str, payload: &Value, path: &str) -> Option<String> {
    lookup(payload, path)
        .and_then(scalar_to_string)
        .map(|id| format!("{prefix}:{id}"))
}

/// Mercado Pago payment notifications.
#[must_use]
pub fn mercadopago() -> ProviderProfile {
    ProviderProfile {
        name: Cow::Borrowed("mercadopago"),
        references: vec![
            field("external_reference"),
            field("data.external_reference"),
            Extractor::Custom(|p| prefixed("purchase", p, "metadata.purchase_id")),
            Extractor::Custom(|p| prefixed("raffle", p, "metadata.raffle_id")),
        ],
        statuses: vec![field("status"), field("data.status"), field("action")],
        event_keys: vec![field("data.id"), field("id")],
        success_tokens: vec!["approved", "accredited"],
        failure_tokens: vec!["rejected", "cancelled", "refunded", "charged_back"],
        allow_fallback: true,
    }
}

/// Asaas payment events.
#[must_use]
pub fn asaas() -> ProviderProfile {
    ProviderProfile {
        name: Cow::Borrowed("asaas"),
        references: vec![field("payment.externalReference"), field("externalReference")],
        statuses: vec![field("event"), field("payment.status")],
        event_keys: vec![field("id"), field("payment.id")],
        success_tokens: vec!["received", "confirmed"],
        failure_tokens: vec!["overdue", "refunded", "deleted", "chargeback"],
        allow_fallback: true,
    }
}

/// OpenPix charge webhooks.
#[must_use]
pub fn openpix() -> ProviderProfile {
    ProviderProfile {
        name: Cow::Borrowed("openpix"),
        references: vec![
            field("charge.correlationID"),
            field("pix.charge.correlationID"),
            field("correlationID"),
        ],
        statuses: vec![field("charge.status"), field("event")],
        event_keys: vec![
            field("pix.endToEndId"),
            field("charge.transactionID"),
            field("charge.correlationID"),
        ],
        success_tokens: vec!["completed", "paid"],
        failure_tokens: vec!["expired", "unpaid"],
        allow_fallback: true,
    }
}

/// Efí (Gerencianet) PIX notifications.
///
/// The payload is `{"pix": [{"txid", "endToEndId", ...}]}` and carries no
/// status: a settled PIX is one with an end-to-end id.
#[must_use]
pub fn efi() -> ProviderProfile {
    ProviderProfile {
        name: Cow::Borrowed("efi"),
        references: vec![field("pix.0.txid"), field("txid")],
        statuses: vec![
            field("status"),
            Extractor::Custom(|p| {
                lookup(p, "pix.0.endToEndId")
                    .and_then(scalar_to_string)
                    .map(|_| "CONCLUIDA".to_string())
            }),
        ],
        event_keys: vec![field("pix.0.endToEndId")],
        success_tokens: vec!["concluida"],
        failure_tokens: vec!["removida", "devolvida"],
        allow_fallback: true,
    }
}

/// Organizer-triggered confirmations and manual test hooks.
#[must_use]
pub fn manual() -> ProviderProfile {
    ProviderProfile {
        name: Cow::Borrowed("manual"),
        references: vec![field("reference"), field("purchase_id")],
        statuses: vec![field("status")],
        event_keys: vec![field("event_id")],
        success_tokens: vec!["paid", "confirmed", "approved"],
        failure_tokens: vec!["unpaid", "failed"],
        allow_fallback: false,
    }
}
