//! Purchase orchestrator: the entry point for buyers.
//!
//! Sequence: validate input → load raffle → sweep → price → reserve. Every
//! rejection before the reserve step has no side effects; the reserve step is
//! all-or-nothing.

use crate::environment::RaffleEnvironment;
use crate::error::{RaffleError, Result};
use crate::pix;
use crate::pricing::{PricingEngine, Quote};
use crate::reservation::{ReservationDraft, ReservationLedger, validate_numbers};
use crate::sweeper::ExpirySweeper;
use crate::types::{Customer, CustomerContact, Purchase, PurchaseId, Raffle, RaffleId};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Default hold window: 15 minutes.
pub const DEFAULT_RESERVATION_TTL_SECONDS: u64 = 900;

/// Default cap on numbers in one purchase.
pub const DEFAULT_MAX_NUMBERS_PER_PURCHASE: usize = 1_000;

const MAX_NAME_LEN: usize = 120;
const MAX_TTL_SECONDS: u64 = 30 * 24 * 60 * 60;

/// How a purchase names its raffle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaffleRef {
    /// By id
    Id(RaffleId),
    /// By public slug
    Slug(String),
}

/// A buyer's request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PurchaseRequest {
    /// Raffle to buy in
    pub raffle: RaffleRef,
    /// Buyer name
    pub name: String,
    /// Buyer phone, any formatting
    pub phone: String,
    /// Requested numbers
    pub numbers: Vec<u32>,
    /// Optional coupon
    pub coupon_code: Option<String>,
}

/// What the buyer gets back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PurchaseReceipt {
    /// The pending purchase
    pub purchase: Purchase,
    /// The buyer record
    pub customer: Customer,
    /// Price breakdown
    pub quote: Quote,
    /// PIX BRCode for the total, when the raffle has PIX settings and the
    /// total is not zero
    pub pix_code: Option<String>,
}

/// Orchestrator limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PurchaseLimits {
    /// Hold TTL when the raffle does not set one
    pub default_ttl_seconds: u64,
    /// Cap on numbers per purchase
    pub max_numbers: usize,
}

impl Default for PurchaseLimits {
    fn default() -> Self {
        Self {
            default_ttl_seconds: DEFAULT_RESERVATION_TTL_SECONDS,
            max_numbers: DEFAULT_MAX_NUMBERS_PER_PURCHASE,
        }
    }
}

/// Normalises a Brazilian phone number to its digits.
///
/// Accepts 10 to 13 digits: area code plus number, optionally with the
/// country code 55.
///
/// # Errors
///
/// Returns [`RaffleError::Validation`] for anything else.
pub fn normalize_phone(raw: &str) -> Result<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(RaffleError::Validation("phone is required".into()));
    }
    if !(10..=13).contains(&digits.len()) {
        return Err(RaffleError::Validation(format!(
            "phone must have 10 to 13 digits, got {}",
            digits.len()
        )));
    }
    Ok(digits)
}

fn normalize_name(raw: &str) -> Result<String> {
    let name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if name.is_empty() {
        return Err(RaffleError::Validation("name is required".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(RaffleError::Validation(format!(
            "name is longer than {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name)
}

/// Sequences a purchase.
#[derive(Clone, Debug)]
pub struct PurchaseOrchestrator {
    env: RaffleEnvironment,
    ledger: ReservationLedger,
    sweeper: ExpirySweeper,
    limits: PurchaseLimits,
}

impl PurchaseOrchestrator {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(env: RaffleEnvironment, limits: PurchaseLimits) -> Self {
        Self {
            ledger: ReservationLedger::new(env.clone()),
            sweeper: ExpirySweeper::new(env.clone()),
            env,
            limits,
        }
    }

    /// Reserves numbers for a buyer and returns the pending purchase.
    ///
    /// # Errors
    ///
    /// - [`RaffleError::Validation`] for bad name, phone, numbers or coupon
    ///   arithmetic, before anything is written
    /// - [`RaffleError::NotFound`] for an unknown raffle
    /// - [`RaffleError::InvalidState`] if the raffle is not on sale
    /// - [`RaffleError::Conflict`] if any number is taken; nothing is held
    #[tracing::instrument(skip(self, request), fields(raffle = ?request.raffle, count = request.numbers.len()))]
    pub async fn purchase(&self, request: PurchaseRequest) -> Result<PurchaseReceipt> {
        let name = normalize_name(&request.name)?;
        let phone = normalize_phone(&request.phone)?;
        let coupon_code = request
            .coupon_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());

        let raffle = self.load(&request.raffle).await?;
        if !raffle.is_on_sale() {
            return Err(RaffleError::InvalidState(format!(
                "raffle {} is {}, not accepting purchases",
                raffle.slug, raffle.status
            )));
        }
        let numbers = validate_numbers(&raffle, &request.numbers, self.limits.max_numbers)?;

        self.sweeper.sweep(raffle.id).await?;

        let quantity = u32::try_from(numbers.len())
            .map_err(|_| RaffleError::Validation("too many numbers".into()))?;
        let quote = PricingEngine::quote(
            raffle.unit_price,
            quantity,
            &raffle.settings.promotions,
            coupon_code,
        )
        .map_err(|e| RaffleError::Validation(e.to_string()))?;

        // nothing to pay when a coupon covers the whole price
        let pix_settings = raffle.settings.pix.as_ref().filter(|_| !quote.total.is_zero());
        let pix_code = pix_settings.and_then(|settings| {
            pix::encode(
                &settings.key,
                &settings.merchant_name,
                &settings.merchant_city,
                Some(quote.total),
            )
            .inspect_err(|e| tracing::warn!(error = %e, "Could not build PIX code"))
            .ok()
        });

        let draft = ReservationDraft {
            purchase_id: PurchaseId::new(),
            customer: CustomerContact { phone, name },
            numbers,
            total: quote.total,
            coupon_code: quote.coupon.as_ref().map(|c| c.code.clone()),
        };
        let reservation = self
            .ledger
            .try_reserve(&raffle, draft, self.ttl_for(&raffle))
            .await?;

        Ok(PurchaseReceipt {
            purchase: reservation.purchase,
            customer: reservation.customer,
            quote,
            pix_code,
        })
    }

    async fn load(&self, raffle: &RaffleRef) -> Result<Raffle> {
        let found = match raffle {
            RaffleRef::Id(id) => self.env.store.raffle(*id).await?,
            RaffleRef::Slug(slug) => self.env.store.raffle_by_slug(slug).await?,
        };
        found.ok_or_else(|| RaffleError::NotFound {
            resource: "raffle",
            id: match raffle {
                RaffleRef::Id(id) => id.to_string(),
                RaffleRef::Slug(slug) => slug.clone(),
            },
        })
    }

    fn ttl_for(&self, raffle: &Raffle) -> Duration {
        let seconds = raffle
            .settings
            .reservation_ttl_seconds
            .unwrap_or(self.limits.default_ttl_seconds)
            .min(MAX_TTL_SECONDS);
        Duration::seconds(i64::try_from(seconds).unwrap_or(0))
    }
}
