//! Row shapes and their conversion into domain types.
//!
//! Columns are signed in `PostgreSQL`; every narrowing or sign change is
//! checked and surfaces as [`StoreError::Serialization`].

use chrono::{DateTime, Utc};
use rifa_core::error::StoreError;
use rifa_core::settings::RaffleSettings;
use rifa_core::types::{
    CancelReason, Customer, CustomerId, Hold, HoldStatus, Money, OrganizerId, Purchase, PurchaseId,
    PurchaseStatus, Raffle, RaffleId, RaffleStatus, TicketNumber,
};
use rifa_core::store::WebhookReceipt;
use uuid::Uuid;

fn corrupt(what: &str, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Serialization(format!("{what}: {detail}"))
}

pub(crate) fn to_i32(value: u32, what: &str) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| corrupt(what, format!("{value} out of range")))
}

pub(crate) fn to_i64(value: u64, what: &str) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| corrupt(what, format!("{value} out of range")))
}

fn to_u32(value: i32, what: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| corrupt(what, format!("{value} is negative")))
}

fn to_u64(value: i64, what: &str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| corrupt(what, format!("{value} is negative")))
}

pub(crate) fn numbers_to_db(numbers: &[TicketNumber]) -> Result<Vec<i32>, StoreError> {
    numbers
        .iter()
        .map(|n| to_i32(n.value(), "ticket number"))
        .collect()
}

pub(crate) fn numbers_from_db(numbers: Vec<i32>) -> Result<Vec<TicketNumber>, StoreError> {
    numbers
        .into_iter()
        .map(|n| to_u32(n, "ticket number").map(TicketNumber::new))
        .collect()
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RaffleRow {
    id: Uuid,
    organizer_id: Uuid,
    slug: String,
    title: String,
    total_tickets: i32,
    unit_price_cents: i64,
    status: String,
    draw_at: Option<DateTime<Utc>>,
    settings: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<RaffleRow> for Raffle {
    type Error = StoreError;

    fn try_from(row: RaffleRow) -> Result<Self, Self::Error> {
        let status = RaffleStatus::parse(&row.status)
            .ok_or_else(|| corrupt("raffle status", &row.status))?;
        let settings = RaffleSettings::from_json(&row.settings)
            .map_err(|e| corrupt("raffle settings", e))?;
        Ok(Self {
            id: RaffleId::from_uuid(row.id),
            organizer_id: OrganizerId::from_uuid(row.organizer_id),
            slug: row.slug,
            title: row.title,
            total_tickets: to_u32(row.total_tickets, "total_tickets")?,
            unit_price: Money::from_cents(to_u64(row.unit_price_cents, "unit_price_cents")?),
            status,
            draw_at: row.draw_at,
            settings,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CustomerRow {
    id: Uuid,
    phone: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Self {
            id: CustomerId::from_uuid(row.id),
            phone: row.phone,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PurchaseRow {
    id: Uuid,
    raffle_id: Uuid,
    customer_id: Uuid,
    numbers: Vec<i32>,
    forfeited_numbers: Vec<i32>,
    total_cents: i64,
    status: String,
    coupon_code: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,
}

impl TryFrom<PurchaseRow> for Purchase {
    type Error = StoreError;

    fn try_from(row: PurchaseRow) -> Result<Self, Self::Error> {
        let status = PurchaseStatus::parse(&row.status)
            .ok_or_else(|| corrupt("purchase status", &row.status))?;
        let cancel_reason = row
            .cancel_reason
            .map(|reason| {
                CancelReason::parse(&reason).ok_or_else(|| corrupt("cancel reason", &reason))
            })
            .transpose()?;
        Ok(Self {
            id: PurchaseId::from_uuid(row.id),
            raffle_id: RaffleId::from_uuid(row.raffle_id),
            customer_id: CustomerId::from_uuid(row.customer_id),
            numbers: numbers_from_db(row.numbers)?,
            forfeited_numbers: numbers_from_db(row.forfeited_numbers)?,
            total: Money::from_cents(to_u64(row.total_cents, "total_cents")?),
            status,
            coupon_code: row.coupon_code,
            created_at: row.created_at,
            expires_at: row.expires_at,
            paid_at: row.paid_at,
            cancelled_at: row.cancelled_at,
            cancel_reason,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct HoldRow {
    raffle_id: Uuid,
    number: i32,
    purchase_id: Uuid,
    status: String,
    expires_at: DateTime<Utc>,
}

impl TryFrom<HoldRow> for Hold {
    type Error = StoreError;

    fn try_from(row: HoldRow) -> Result<Self, Self::Error> {
        Ok(Self {
            raffle_id: RaffleId::from_uuid(row.raffle_id),
            number: TicketNumber::new(to_u32(row.number, "ticket number")?),
            purchase_id: PurchaseId::from_uuid(row.purchase_id),
            status: HoldStatus::parse(&row.status)
                .ok_or_else(|| corrupt("hold status", &row.status))?,
            expires_at: row.expires_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ReceiptRow {
    provider: String,
    event_key: String,
    outcome: serde_json::Value,
    received_at: DateTime<Utc>,
}

impl From<ReceiptRow> for WebhookReceipt {
    fn from(row: ReceiptRow) -> Self {
        Self {
            provider: row.provider,
            event_key: row.event_key,
            outcome: row.outcome,
            received_at: row.received_at,
        }
    }
}
