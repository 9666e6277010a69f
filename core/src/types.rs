//! Domain types for the raffle reservation core.
//!
//! Identifiers, money, ticket numbers and the four persisted records:
//! [`Raffle`], [`Customer`], [`Purchase`] and [`Hold`].

use crate::settings::RaffleSettings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a raffle
    RaffleId
);
uuid_id!(
    /// Unique identifier for the organizer that owns a raffle
    OrganizerId
);
uuid_id!(
    /// Unique identifier for a customer (buyer)
    CustomerId
);
uuid_id!(
    /// Unique identifier for a purchase
    PurchaseId
);

/// A ticket number within a raffle, always in `1..=total_tickets`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketNumber(u32);

impl TicketNumber {
    /// Creates a ticket number
    #[must_use]
    pub const fn new(number: u32) -> Self {
        Self(number)
    }

    /// Returns the raw number
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TicketNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TicketNumber {
    fn from(number: u32) -> Self {
        Self(number)
    }
}

// ============================================================================
// Money Value Object (centavos, no floating point)
// ============================================================================

/// An amount of Brazilian reais stored as centavos.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero reais
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from centavos
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from whole reais with overflow checking
    #[must_use]
    pub const fn checked_from_reais(reais: u64) -> Option<Self> {
        match reais.checked_mul(100) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Returns the amount in centavos
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Multiplies money by a quantity with overflow checking
    #[must_use]
    pub const fn checked_multiply(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Subtracts two amounts (returns None if result would be negative)
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        if self.0 >= other.0 {
            Some(Self(self.0 - other.0))
        } else {
            None
        }
    }

    /// Formats the amount with a dot separator and two decimals (`"102.60"`),
    /// as used by the PIX transaction amount field.
    #[must_use]
    pub fn to_decimal_string(&self) -> String {
        format!("{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R$ {},{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Raffle
// ============================================================================

/// Lifecycle of a raffle.
///
/// The core only moves `PendingActivation -> Active`; the draw subsystem owns
/// the later transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaffleStatus {
    /// Created by the organizer, activation fee not yet paid
    PendingActivation,
    /// Open for purchases
    Active,
    /// Winner drawn
    Drawn,
    /// Closed without further sales
    Closed,
}

impl RaffleStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PendingActivation => "pending_activation",
            Self::Active => "active",
            Self::Drawn => "drawn",
            Self::Closed => "closed",
        }
    }

    /// Parse status from its database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_activation" => Some(Self::PendingActivation),
            "active" => Some(Self::Active),
            "drawn" => Some(Self::Drawn),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for RaffleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raffle: a fixed pool of numbered tickets sold at a unit price.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Raffle {
    /// Raffle ID
    pub id: RaffleId,
    /// Owning organizer
    pub organizer_id: OrganizerId,
    /// Public slug (unique)
    pub slug: String,
    /// Display title
    pub title: String,
    /// Number of tickets; valid numbers are `1..=total_tickets`
    pub total_tickets: u32,
    /// Price of a single ticket
    pub unit_price: Money,
    /// Current status
    pub status: RaffleStatus,
    /// Scheduled draw time
    pub draw_at: Option<DateTime<Utc>>,
    /// Organizer-owned settings (read-only to the core)
    pub settings: RaffleSettings,
    /// When the raffle was created
    pub created_at: DateTime<Utc>,
}

impl Raffle {
    /// Whether `number` is a valid ticket of this raffle.
    #[must_use]
    pub const fn contains(&self, number: TicketNumber) -> bool {
        number.0 >= 1 && number.0 <= self.total_tickets
    }

    /// Whether the raffle currently accepts purchases.
    #[must_use]
    pub const fn is_on_sale(&self) -> bool {
        matches!(self.status, RaffleStatus::Active)
    }
}

// ============================================================================
// Customer
// ============================================================================

/// A buyer, identified by phone number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Customer ID
    pub id: CustomerId,
    /// Normalised phone number (digits only), the natural key
    pub phone: String,
    /// Display name
    pub name: String,
    /// When the customer was first seen
    pub created_at: DateTime<Utc>,
}

/// Contact details supplied with a purchase; upserted into a [`Customer`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerContact {
    /// Normalised phone number
    pub phone: String,
    /// Display name
    pub name: String,
}

// ============================================================================
// Purchase
// ============================================================================

/// Payment status of a purchase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    /// Numbers held, waiting for payment
    Pending,
    /// Paid before the hold expired
    Confirmed,
    /// Paid after the hold expired
    PaidDelayed,
    /// Expired or cancelled by an organizer
    Cancelled,
}

impl PurchaseStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::PaidDelayed => "paid_delayed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse status from its database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "paid_delayed" => Some(Self::PaidDelayed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether payment for the purchase has been received.
    #[must_use]
    pub const fn is_paid(&self) -> bool {
        matches!(self, Self::Confirmed | Self::PaidDelayed)
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a purchase was cancelled.
///
/// Only an expired purchase can be revived by a late payment; an organizer's
/// cancellation is final.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// Every hold expired before payment
    Expired,
    /// An organizer cancelled it
    Admin,
}

impl CancelReason {
    /// Convert reason to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::Admin => "admin",
        }
    }

    /// Parse reason from its database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "expired" => Some(Self::Expired),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// A buyer's order for a set of ticket numbers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    /// Purchase ID
    pub id: PurchaseId,
    /// Raffle the numbers belong to
    pub raffle_id: RaffleId,
    /// Buyer
    pub customer_id: CustomerId,
    /// Numbers the purchase claims, in request order (distinct).
    ///
    /// Never overlaps another live purchase of the raffle. Only a late
    /// payment that lost numbers can leave it shorter than requested.
    pub numbers: Vec<TicketNumber>,
    /// Paid-for numbers another buyer took before a late payment arrived;
    /// left for manual resolution
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forfeited_numbers: Vec<TicketNumber>,
    /// Amount due
    pub total: Money,
    /// Current status
    pub status: PurchaseStatus,
    /// Coupon applied when pricing, if any
    pub coupon_code: Option<String>,
    /// When the purchase was created
    pub created_at: DateTime<Utc>,
    /// When the holds created with this purchase expire
    pub expires_at: DateTime<Utc>,
    /// When payment was confirmed
    pub paid_at: Option<DateTime<Utc>>,
    /// When the purchase was cancelled
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Why it was cancelled; set only while the status is `cancelled`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<CancelReason>,
}

impl Purchase {
    /// Whether a payment confirmed at `now` arrives after the hold window.
    #[must_use]
    pub fn is_late(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

// ============================================================================
// Reservation (hold)
// ============================================================================

/// Status of a hold on a single number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldStatus {
    /// Waiting for payment, released after `expires_at`
    Held,
    /// Paid; only removed by explicit cancellation
    Paid,
}

impl HoldStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Held => "held",
            Self::Paid => "paid",
        }
    }

    /// Parse status from its database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "held" => Some(Self::Held),
            "paid" => Some(Self::Paid),
            _ => None,
        }
    }
}

/// An exclusive claim on one `(raffle, number)` pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hold {
    /// Raffle
    pub raffle_id: RaffleId,
    /// Held number
    pub number: TicketNumber,
    /// Purchase that owns the hold
    pub purchase_id: PurchaseId,
    /// Held or paid
    pub status: HoldStatus,
    /// Expiry of a `Held` hold
    pub expires_at: DateTime<Utc>,
}

impl Hold {
    /// Whether the hold still occupies its number at `now`.
    ///
    /// A held number stays occupied up to and including `expires_at`; it is
    /// available to others strictly after it, whether or not a sweep has run.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            HoldStatus::Paid => true,
            HoldStatus::Held => self.expires_at >= now,
        }
    }
}
