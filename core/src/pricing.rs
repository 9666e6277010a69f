//! Pricing engine.
//!
//! `base = unit_price * quantity`, then the best-matching package tier, then
//! a coupon, applied multiplicatively in that order. Intermediate values keep
//! full decimal precision; the total is rounded once, half away from zero, to
//! the centavo.

use crate::settings::PromotionRule;
use crate::types::Money;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pricing failures.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingError {
    /// `unit_price * quantity` does not fit in centavos
    #[error("Price overflow for {quantity} tickets")]
    Overflow {
        /// Requested quantity
        quantity: u32,
    },
}

/// The package tier applied to a quote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDiscount {
    /// Tier threshold
    pub min_quantity: u32,
    /// Percentage off
    pub discount_pct: Decimal,
}

/// The coupon applied to a quote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponDiscount {
    /// Coupon code as configured
    pub code: String,
    /// Percentage off
    pub discount_pct: Decimal,
}

/// Price breakdown for a purchase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Number of tickets
    pub quantity: u32,
    /// `unit_price * quantity`
    pub base: Money,
    /// Package tier, if one matched
    pub package: Option<PackageDiscount>,
    /// Coupon, if the code matched an active coupon
    pub coupon: Option<CouponDiscount>,
    /// Amount due
    pub total: Money,
}

impl Quote {
    /// Total discount granted.
    #[must_use]
    pub const fn discount(&self) -> Money {
        match self.base.checked_sub(self.total) {
            Some(discount) => discount,
            None => Money::ZERO,
        }
    }
}

/// Stateless pricing rules.
#[derive(Clone, Copy, Debug, Default)]
pub struct PricingEngine;

impl PricingEngine {
    /// Prices `quantity` tickets and explains how.
    ///
    /// The package tier is the one with the largest `min_quantity` not above
    /// `quantity` (first defined wins a tie), regardless of which tier has
    /// the bigger discount. The coupon matches case-insensitively and only if
    /// active. An unknown coupon code is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::Overflow`] if the base price overflows.
    pub fn quote(
        unit_price: Money,
        quantity: u32,
        promotions: &[PromotionRule],
        coupon_code: Option<&str>,
    ) -> Result<Quote, PricingError> {
        let base = unit_price
            .checked_multiply(quantity)
            .ok_or(PricingError::Overflow { quantity })?;

        let package = best_package(promotions, quantity);
        let coupon = coupon_code.and_then(|code| matching_coupon(promotions, code));

        let mut running = Decimal::from(base.cents());
        if let Some(package) = &package {
            running = apply(running, package.discount_pct);
        }
        if let Some(coupon) = &coupon {
            running = apply(running, coupon.discount_pct);
        }

        let total = running
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_u64()
            .map_or(Money::ZERO, Money::from_cents);

        Ok(Quote {
            quantity,
            base,
            package,
            coupon,
            total,
        })
    }

    /// Total only.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::Overflow`] if the base price overflows.
    pub fn price(
        unit_price: Money,
        quantity: u32,
        promotions: &[PromotionRule],
        coupon_code: Option<&str>,
    ) -> Result<Money, PricingError> {
        Self::quote(unit_price, quantity, promotions, coupon_code).map(|q| q.total)
    }
}

fn apply(amount: Decimal, discount_pct: Decimal) -> Decimal {
    let factor = (Decimal::ONE_HUNDRED - discount_pct) / Decimal::ONE_HUNDRED;
    (amount * factor).max(Decimal::ZERO)
}

fn best_package(promotions: &[PromotionRule], quantity: u32) -> Option<PackageDiscount> {
    let mut best: Option<PackageDiscount> = None;
    for rule in promotions {
        if let PromotionRule::Package {
            min_quantity,
            discount_pct,
        } = rule
        {
            if *min_quantity > quantity {
                continue;
            }
            // strictly greater keeps the first-defined tier on ties
            if best.as_ref().is_none_or(|b| *min_quantity > b.min_quantity) {
                best = Some(PackageDiscount {
                    min_quantity: *min_quantity,
                    discount_pct: *discount_pct,
                });
            }
        }
    }
    best
}

fn matching_coupon(promotions: &[PromotionRule], code: &str) -> Option<CouponDiscount> {
    let wanted = code.trim();
    if wanted.is_empty() {
        return None;
    }
    promotions.iter().find_map(|rule| match rule {
        PromotionRule::Coupon {
            code,
            discount_pct,
            active: true,
        } if code.trim().eq_ignore_ascii_case(wanted) => Some(CouponDiscount {
            code: code.clone(),
            discount_pct: *discount_pct,
        }),
        _ => None,
    })
}
