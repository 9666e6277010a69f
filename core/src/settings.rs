//! Typed raffle settings.
//!
//! Organizer configuration stores promotions and payment details as a JSON
//! blob. The blob is parsed and validated here, at the configuration boundary,
//! so the pricing engine only ever sees well-formed [`PromotionRule`]s.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Errors raised when organizer settings are malformed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// The blob is not valid settings JSON
    #[error("Invalid settings JSON: {0}")]
    Malformed(String),

    /// A discount percentage is outside `(0, 100]`
    #[error("Discount {pct}% is out of range (0, 100]")]
    DiscountOutOfRange {
        /// Offending percentage
        pct: Decimal,
    },

    /// A package with `min_quantity` of zero
    #[error("Package minimum quantity must be at least 1")]
    ZeroMinQuantity,

    /// A coupon with an empty code
    #[error("Coupon code must not be empty")]
    EmptyCouponCode,

    /// Two coupons whose codes differ only by case
    #[error("Duplicate coupon code: {0}")]
    DuplicateCoupon(String),

    /// A reservation TTL of zero seconds
    #[error("Reservation TTL must be positive")]
    ZeroTtl,

    /// PIX details are incomplete
    #[error("PIX settings are incomplete: {0} is empty")]
    IncompletePix(&'static str),
}

/// A discount rule configured by the organizer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromotionRule {
    /// Quantity tier: buying at least `min_quantity` tickets earns `discount_pct`
    Package {
        /// Smallest quantity the tier applies to
        min_quantity: u32,
        /// Percentage off the base price
        discount_pct: Decimal,
    },
    /// Code-based discount, matched case-insensitively
    Coupon {
        /// Code the buyer enters
        code: String,
        /// Percentage off the package-discounted total
        discount_pct: Decimal,
        /// Inactive coupons never match
        #[serde(default = "default_active")]
        active: bool,
    },
}

const fn default_active() -> bool {
    true
}

impl PromotionRule {
    fn discount_pct(&self) -> Decimal {
        match self {
            Self::Package { discount_pct, .. } | Self::Coupon { discount_pct, .. } => *discount_pct,
        }
    }
}

/// Static PIX receiving details for a raffle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixSettings {
    /// PIX key (e-mail, phone, CPF/CNPJ or random key)
    pub key: String,
    /// Name shown to the payer
    pub merchant_name: String,
    /// City shown to the payer
    pub merchant_city: String,
}

/// Settings the core reads from a raffle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaffleSettings {
    /// Packages and coupons, in definition order
    pub promotions: Vec<PromotionRule>,
    /// Overrides the default hold TTL
    pub reservation_ttl_seconds: Option<u64>,
    /// PIX details used to build payment codes
    pub pix: Option<PixSettings>,
}

impl RaffleSettings {
    /// Parses and validates a settings blob.
    ///
    /// Unknown keys (theme, banner and the like) are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Malformed`] if the JSON does not match the
    /// settings shape, or the first validation error found.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_value(value.clone())
            .map_err(|e| SettingsError::Malformed(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks every rule.
    ///
    /// # Errors
    ///
    /// Returns the first invalid rule found.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let mut codes = HashSet::new();
        for rule in &self.promotions {
            let pct = rule.discount_pct();
            if pct <= Decimal::ZERO || pct > Decimal::ONE_HUNDRED {
                return Err(SettingsError::DiscountOutOfRange { pct });
            }
            match rule {
                PromotionRule::Package { min_quantity, .. } => {
                    if *min_quantity == 0 {
                        return Err(SettingsError::ZeroMinQuantity);
                    }
                }
                PromotionRule::Coupon { code, .. } => {
                    let normalized = code.trim().to_lowercase();
                    if normalized.is_empty() {
                        return Err(SettingsError::EmptyCouponCode);
                    }
                    if !codes.insert(normalized) {
                        return Err(SettingsError::DuplicateCoupon(code.clone()));
                    }
                }
            }
        }

        if self.reservation_ttl_seconds == Some(0) {
            return Err(SettingsError::ZeroTtl);
        }

        if let Some(pix) = &self.pix {
            if pix.key.trim().is_empty() {
                return Err(SettingsError::IncompletePix("key"));
            }
            if pix.merchant_name.trim().is_empty() {
                return Err(SettingsError::IncompletePix("merchant_name"));
            }
            if pix.merchant_city.trim().is_empty() {
                return Err(SettingsError::IncompletePix("merchant_city"));
            }
        }

        Ok(())
    }

    /// Package tiers, in definition order.
    pub fn packages(&self) -> impl Iterator<Item = (u32, Decimal)> + '_ {
        self.promotions.iter().filter_map(|rule| match rule {
            PromotionRule::Package {
                min_quantity,
                discount_pct,
            } => Some((*min_quantity, *discount_pct)),
            PromotionRule::Coupon { .. } => None,
        })
    }
}
