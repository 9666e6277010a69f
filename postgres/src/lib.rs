//! `PostgreSQL` store for the Rifa raffle core.
//!
//! Implements [`RaffleStore`] on top of sqlx. Exclusivity of ticket numbers is
//! enforced by the database, so any number of stateless service instances can
//! share one database:
//!
//! - `reserved_numbers` has primary key `(raffle_id, number)`: one row per
//!   occupied number.
//! - Reservations lock the raffle row (`FOR UPDATE`), check for occupied
//!   numbers, clear stale expired rows and insert the new holds in one
//!   transaction. Concurrent buyers of the same raffle serialise on that lock.
//! - Payment confirmation and cancellation lock the purchase row first and the
//!   raffle row second. The sweep takes the raffle lock and the per-purchase
//!   locks in separate transactions, so no two transactions wait on each
//!   other in opposite order.
//!
//! Every connection runs with `statement_timeout`; a statement cancelled by it
//! surfaces as [`StoreError::Timeout`].
//!
//! # Example
//!
//! ```ignore
//! use rifa_postgres::{PostgresConfig, PostgresRaffleStore};
//!
//! let store = PostgresRaffleStore::connect(&PostgresConfig::new("postgres://localhost/rifa")).await?;
//! store.migrate().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod rows;

use chrono::{DateTime, Utc};
use rifa_core::error::StoreError;
use rifa_core::lifecycle::Transition;
use rifa_core::store::{
    Cancellation, Confirmation, RaffleStore, Reservation, ReservationRequest, StoreFuture,
    SweepReport, WebhookReceipt,
};
use rifa_core::types::{
    CancelReason, Customer, Hold, OrganizerId, Purchase, PurchaseId, PurchaseStatus, Raffle,
    RaffleId, RaffleStatus,
};
use rows::{CustomerRow, HoldRow, PurchaseRow, RaffleRow, ReceiptRow};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use std::time::Duration;
use uuid::Uuid;

const RAFFLE_COLUMNS: &str = "id, organizer_id, slug, title, total_tickets, unit_price_cents, \
                              status, draw_at, settings, created_at";

const PURCHASE_COLUMNS: &str = "id, raffle_id, customer_id, numbers, forfeited_numbers, \
                                total_cents, status, coupon_code, created_at, expires_at, \
                                paid_at, cancelled_at, cancel_reason";

/// `SQLSTATE` raised when `statement_timeout` cancels a statement.
const QUERY_CANCELED: &str = "57014";

/// Connection settings.
#[derive(Clone, Debug)]
pub struct PostgresConfig {
    /// Connection string
    pub url: String,
    /// Pool ceiling
    pub max_connections: u32,
    /// Connections kept open when idle
    pub min_connections: u32,
    /// How long to wait for a connection from the pool
    pub connect_timeout: Duration,
    /// Per-statement deadline, set on every connection
    pub statement_timeout: Duration,
}

impl PostgresConfig {
    /// Defaults for `url`: 10/2 connections, 30 s connect timeout, 10 s
    /// statement timeout.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout: Duration::from_secs(30),
            statement_timeout: Duration::from_secs(10),
        }
    }
}

/// Maps sqlx failures onto store errors.
fn db_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::PoolTimedOut => StoreError::Timeout,
        sqlx::Error::Database(db) if db.code().as_deref() == Some(QUERY_CANCELED) => {
            StoreError::Timeout
        }
        _ => StoreError::Database(e.to_string()),
    }
}

fn not_found(resource: &'static str, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        resource,
        id: id.to_string(),
    }
}

/// `PostgreSQL`-backed [`RaffleStore`].
#[derive(Clone, Debug)]
pub struct PostgresRaffleStore {
    pool: PgPool,
}

impl PostgresRaffleStore {
    /// Wraps an existing pool.
    ///
    /// The pool's connections should already carry a `statement_timeout`;
    /// use [`connect`](Self::connect) to get one configured.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool with `statement_timeout` applied to every connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the database cannot be reached.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let statement_timeout = config.statement_timeout.as_millis().to_string();
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .after_connect(move |conn, _meta| {
                let statement_timeout = statement_timeout.clone();
                Box::pin(async move {
                    sqlx::query("SELECT set_config('statement_timeout', $1, false)")
                        .bind(statement_timeout)
                        .execute(conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(&config.url)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;

        tracing::info!(
            max_connections = config.max_connections,
            statement_timeout_ms = %config.statement_timeout.as_millis(),
            "Connected to PostgreSQL"
        );
        Ok(Self::new(pool))
    }

    /// Applies the bundled migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Inserts a raffle.
    ///
    /// Raffles are normally written by the organizer back-office; this exists
    /// for seeding and tests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on failure (including a duplicate
    /// slug).
    pub async fn create_raffle(&self, raffle: &Raffle) -> Result<(), StoreError> {
        let settings = serde_json::to_value(&raffle.settings)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        sqlx::query(
            "INSERT INTO raffles
                 (id, organizer_id, slug, title, total_tickets, unit_price_cents,
                  status, draw_at, settings, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(raffle.id.as_uuid())
        .bind(raffle.organizer_id.as_uuid())
        .bind(&raffle.slug)
        .bind(&raffle.title)
        .bind(rows::to_i32(raffle.total_tickets, "total_tickets")?)
        .bind(rows::to_i64(raffle.unit_price.cents(), "unit_price_cents")?)
        .bind(raffle.status.as_str())
        .bind(raffle.draw_at)
        .bind(settings)
        .bind(raffle.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn fetch_raffle(&self, id: RaffleId) -> Result<Option<Raffle>, StoreError> {
        let sql = format!("SELECT {RAFFLE_COLUMNS} FROM raffles WHERE id = $1");
        sqlx::query_as::<_, RaffleRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(Raffle::try_from)
            .transpose()
    }

    async fn fetch_raffle_by_slug(&self, slug: &str) -> Result<Option<Raffle>, StoreError> {
        let sql = format!("SELECT {RAFFLE_COLUMNS} FROM raffles WHERE slug = $1");
        sqlx::query_as::<_, RaffleRow>(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(Raffle::try_from)
            .transpose()
    }

    async fn fetch_pending_activation(
        &self,
        organizer: Option<OrganizerId>,
        limit: usize,
    ) -> Result<Vec<Raffle>, StoreError> {
        let sql = format!(
            "SELECT {RAFFLE_COLUMNS} FROM raffles
             WHERE status = 'pending_activation'
               AND ($1::uuid IS NULL OR organizer_id = $1)
             ORDER BY created_at DESC
             LIMIT $2"
        );
        sqlx::query_as::<_, RaffleRow>(&sql)
            .bind(organizer.map(|o| *o.as_uuid()))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?
            .into_iter()
            .map(Raffle::try_from)
            .collect()
    }

    #[tracing::instrument(skip(self), fields(raffle_id = %id))]
    async fn activate(&self, id: RaffleId) -> Result<Transition<RaffleStatus>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let status: Option<(String,)> =
            sqlx::query_as("SELECT status FROM raffles WHERE id = $1 FOR UPDATE")
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error)?;
        let (status,) = status.ok_or_else(|| not_found("raffle", id))?;
        let status = RaffleStatus::parse(&status)
            .ok_or_else(|| StoreError::Serialization(format!("raffle status: {status}")))?;

        let transition = status.activate()?;
        if transition.is_applied() {
            sqlx::query("UPDATE raffles SET status = $2 WHERE id = $1")
                .bind(id.as_uuid())
                .bind(transition.state().as_str())
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
        }
        tx.commit().await.map_err(db_error)?;
        Ok(transition)
    }

    async fn fetch_purchase(&self, id: PurchaseId) -> Result<Option<Purchase>, StoreError> {
        let sql = format!("SELECT {PURCHASE_COLUMNS} FROM purchases WHERE id = $1");
        sqlx::query_as::<_, PurchaseRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(Purchase::try_from)
            .transpose()
    }

    /// Locks and loads a purchase inside `conn`'s transaction.
    async fn lock_purchase(
        conn: &mut PgConnection,
        id: PurchaseId,
    ) -> Result<Option<Purchase>, StoreError> {
        let sql = format!("SELECT {PURCHASE_COLUMNS} FROM purchases WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, PurchaseRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(conn)
            .await
            .map_err(db_error)?
            .map(Purchase::try_from)
            .transpose()
    }

    /// Locks a raffle row; `false` if it does not exist.
    async fn lock_raffle(conn: &mut PgConnection, id: RaffleId) -> Result<bool, StoreError> {
        let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM raffles WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(conn)
            .await
            .map_err(db_error)?;
        Ok(row.is_some())
    }

    async fn mark_cancelled(
        conn: &mut PgConnection,
        id: PurchaseId,
        reason: CancelReason,
        at: DateTime<Utc>,
    ) -> Result<Purchase, StoreError> {
        let sql = format!(
            "UPDATE purchases
             SET status = 'cancelled', cancelled_at = $2, cancel_reason = $3
             WHERE id = $1
             RETURNING {PURCHASE_COLUMNS}"
        );
        let row: PurchaseRow = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .bind(at)
            .bind(reason.as_str())
            .fetch_one(conn)
            .await
            .map_err(db_error)?;
        Purchase::try_from(row)
    }

    /// Marks a purchase paid, keeping only the numbers it re-held.
    async fn mark_paid(
        conn: &mut PgConnection,
        id: PurchaseId,
        status: PurchaseStatus,
        at: DateTime<Utc>,
        forfeited: &[i32],
    ) -> Result<Purchase, StoreError> {
        let sql = format!(
            "UPDATE purchases
             SET status = $2,
                 paid_at = $3,
                 numbers = ARRAY(SELECT n FROM UNNEST(numbers) WITH ORDINALITY AS t (n, i)
                                 WHERE NOT n = ANY($4) ORDER BY i),
                 forfeited_numbers = forfeited_numbers || $4,
                 cancelled_at = NULL,
                 cancel_reason = NULL
             WHERE id = $1
             RETURNING {PURCHASE_COLUMNS}"
        );
        let row: PurchaseRow = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .bind(status.as_str())
            .bind(at)
            .bind(forfeited)
            .fetch_one(conn)
            .await
            .map_err(db_error)?;
        Purchase::try_from(row)
    }

    #[tracing::instrument(
        skip(self, request),
        fields(raffle_id = %request.raffle_id, purchase_id = %request.purchase_id, quantity = request.numbers.len())
    )]
    async fn reserve_numbers(&self, request: ReservationRequest) -> Result<Reservation, StoreError> {
        let numbers = rows::numbers_to_db(&request.numbers)?;
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        if !Self::lock_raffle(&mut tx, request.raffle_id).await? {
            return Err(not_found("raffle", request.raffle_id));
        }

        let taken: Vec<(i32,)> = sqlx::query_as(
            "SELECT number FROM reserved_numbers
             WHERE raffle_id = $1
               AND number = ANY($2)
               AND (status = 'paid' OR expires_at >= $3)
             ORDER BY number",
        )
        .bind(request.raffle_id.as_uuid())
        .bind(&numbers)
        .bind(request.now)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error)?;
        if !taken.is_empty() {
            let taken = rows::numbers_from_db(taken.into_iter().map(|(n,)| n).collect())?;
            tracing::debug!(conflicts = ?taken, "Numbers already occupied");
            return Err(StoreError::Conflict { numbers: taken });
        }

        // expired holds nobody swept yet
        sqlx::query(
            "DELETE FROM reserved_numbers
             WHERE raffle_id = $1 AND number = ANY($2) AND status = 'held' AND expires_at < $3",
        )
        .bind(request.raffle_id.as_uuid())
        .bind(&numbers)
        .bind(request.now)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        let customer: CustomerRow = sqlx::query_as(
            "INSERT INTO customers (id, phone, name, created_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (phone) DO UPDATE SET name = EXCLUDED.name
             RETURNING id, phone, name, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&request.customer.phone)
        .bind(&request.customer.name)
        .bind(request.now)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error)?;
        let customer = Customer::from(customer);

        let sql = format!(
            "INSERT INTO purchases
                 (id, raffle_id, customer_id, numbers, total_cents, status,
                  coupon_code, created_at, expires_at)
             VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7, $8)
             RETURNING {PURCHASE_COLUMNS}"
        );
        let purchase: PurchaseRow = sqlx::query_as(&sql)
            .bind(request.purchase_id.as_uuid())
            .bind(request.raffle_id.as_uuid())
            .bind(customer.id.as_uuid())
            .bind(&numbers)
            .bind(rows::to_i64(request.total.cents(), "total_cents")?)
            .bind(&request.coupon_code)
            .bind(request.now)
            .bind(request.expires_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;
        let purchase = Purchase::try_from(purchase)?;

        sqlx::query(
            "INSERT INTO reserved_numbers (raffle_id, number, purchase_id, status, expires_at)
             SELECT $1, n, $3, 'held', $4 FROM UNNEST($2::int[]) AS n",
        )
        .bind(request.raffle_id.as_uuid())
        .bind(&numbers)
        .bind(request.purchase_id.as_uuid())
        .bind(request.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(Reservation { purchase, customer })
    }

    async fn fetch_active_holds(
        &self,
        raffle_id: RaffleId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Hold>, StoreError> {
        sqlx::query_as::<_, HoldRow>(
            "SELECT raffle_id, number, purchase_id, status, expires_at
             FROM reserved_numbers
             WHERE raffle_id = $1 AND (status = 'paid' OR expires_at >= $2)
             ORDER BY number",
        )
        .bind(raffle_id.as_uuid())
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?
        .into_iter()
        .map(Hold::try_from)
        .collect()
    }

    #[tracing::instrument(skip(self), fields(raffle_id = %raffle_id))]
    async fn sweep(&self, raffle_id: RaffleId, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        if !Self::lock_raffle(&mut tx, raffle_id).await? {
            return Ok(SweepReport::default());
        }
        let released: Vec<(Uuid,)> = sqlx::query_as(
            "DELETE FROM reserved_numbers
             WHERE raffle_id = $1 AND status = 'held' AND expires_at < $2
             RETURNING purchase_id",
        )
        .bind(raffle_id.as_uuid())
        .bind(now)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;

        // pending purchases whose expired holds were already replaced by a
        // newer reservation have nothing left to delete but still need cancelling
        let orphans: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM purchases
             WHERE raffle_id = $1 AND status = 'pending' AND expires_at < $2",
        )
        .bind(raffle_id.as_uuid())
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut candidates: Vec<Uuid> = released
            .iter()
            .chain(orphans.iter())
            .map(|(id,)| *id)
            .collect();
        candidates.sort_unstable();
        candidates.dedup();

        let mut cancelled = Vec::new();
        for id in candidates {
            if let Some(purchase) = self.cancel_if_unheld(PurchaseId::from_uuid(id), now).await? {
                cancelled.push(purchase);
            }
        }

        Ok(SweepReport {
            released: released.len(),
            cancelled,
        })
    }

    /// Cancels a pending purchase that no longer holds any number.
    async fn cancel_if_unheld(
        &self,
        id: PurchaseId,
        now: DateTime<Utc>,
    ) -> Result<Option<Purchase>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let Some(purchase) = Self::lock_purchase(&mut tx, id).await? else {
            return Ok(None);
        };
        let transition = purchase.status.expire();
        if !transition.is_applied() {
            return Ok(None);
        }

        let (held,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM reserved_numbers WHERE purchase_id = $1)")
                .bind(id.as_uuid())
                .fetch_one(&mut *tx)
                .await
                .map_err(db_error)?;
        if held {
            return Ok(None);
        }

        let purchase = Self::mark_cancelled(&mut tx, id, CancelReason::Expired, now).await?;
        tx.commit().await.map_err(db_error)?;
        Ok(Some(purchase))
    }

    #[tracing::instrument(skip(self), fields(purchase_id = %id))]
    async fn confirm(&self, id: PurchaseId, now: DateTime<Utc>) -> Result<Confirmation, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let purchase = Self::lock_purchase(&mut tx, id)
            .await?
            .ok_or_else(|| not_found("purchase", id))?;

        let transition = purchase.confirm_at(now);
        if !transition.is_applied() {
            return Ok(Confirmation {
                transition,
                purchase,
                unavailable: Vec::new(),
            });
        }

        Self::lock_raffle(&mut tx, purchase.raffle_id).await?;
        let numbers = rows::numbers_to_db(&purchase.numbers)?;

        sqlx::query("UPDATE reserved_numbers SET status = 'paid' WHERE purchase_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        // a revived purchase takes back released numbers, including ones
        // whose newer hold has itself expired
        sqlx::query(
            "DELETE FROM reserved_numbers
             WHERE raffle_id = $1 AND number = ANY($2) AND purchase_id <> $3
               AND status = 'held' AND expires_at < $4",
        )
        .bind(purchase.raffle_id.as_uuid())
        .bind(&numbers)
        .bind(id.as_uuid())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        sqlx::query(
            "INSERT INTO reserved_numbers (raffle_id, number, purchase_id, status, expires_at)
             SELECT $1, n, $3, 'paid', $4 FROM UNNEST($2::int[]) AS n
             ON CONFLICT (raffle_id, number) DO NOTHING",
        )
        .bind(purchase.raffle_id.as_uuid())
        .bind(&numbers)
        .bind(id.as_uuid())
        .bind(purchase.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        let unavailable: Vec<(i32,)> = sqlx::query_as(
            "SELECT number FROM reserved_numbers
             WHERE raffle_id = $1 AND number = ANY($2) AND purchase_id <> $3
             ORDER BY number",
        )
        .bind(purchase.raffle_id.as_uuid())
        .bind(&numbers)
        .bind(id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error)?;
        let unavailable: Vec<i32> = unavailable.into_iter().map(|(n,)| n).collect();

        let purchase = Self::mark_paid(&mut tx, id, transition.state(), now, &unavailable).await?;
        let unavailable = rows::numbers_from_db(unavailable)?;
        tx.commit().await.map_err(db_error)?;
        Ok(Confirmation {
            transition,
            purchase,
            unavailable,
        })
    }

    #[tracing::instrument(skip(self), fields(purchase_id = %id))]
    async fn cancel(&self, id: PurchaseId, now: DateTime<Utc>) -> Result<Cancellation, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let purchase = Self::lock_purchase(&mut tx, id)
            .await?
            .ok_or_else(|| not_found("purchase", id))?;

        let transition = purchase.status.cancel();
        if !transition.is_applied() {
            return Ok(Cancellation {
                transition,
                purchase,
                released: 0,
            });
        }

        let deleted = sqlx::query("DELETE FROM reserved_numbers WHERE purchase_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?
            .rows_affected();
        let purchase = Self::mark_cancelled(&mut tx, id, CancelReason::Admin, now).await?;
        tx.commit().await.map_err(db_error)?;

        Ok(Cancellation {
            transition,
            purchase,
            released: usize::try_from(deleted).unwrap_or(usize::MAX),
        })
    }

    async fn fetch_receipt(
        &self,
        provider: &str,
        event_key: &str,
    ) -> Result<Option<WebhookReceipt>, StoreError> {
        let row: Option<ReceiptRow> = sqlx::query_as(
            "SELECT provider, event_key, outcome, received_at
             FROM webhook_receipts
             WHERE provider = $1 AND event_key = $2",
        )
        .bind(provider)
        .bind(event_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(WebhookReceipt::from))
    }

    async fn insert_receipt(&self, receipt: WebhookReceipt) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO webhook_receipts (provider, event_key, outcome, received_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (provider, event_key) DO NOTHING",
        )
        .bind(&receipt.provider)
        .bind(&receipt.event_key)
        .bind(&receipt.outcome)
        .bind(receipt.received_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }
}

impl RaffleStore for PostgresRaffleStore {
    fn raffle(&self, id: RaffleId) -> StoreFuture<'_, Option<Raffle>> {
        Box::pin(self.fetch_raffle(id))
    }

    fn raffle_by_slug<'a>(&'a self, slug: &'a str) -> StoreFuture<'a, Option<Raffle>> {
        Box::pin(self.fetch_raffle_by_slug(slug))
    }

    fn pending_activation_raffles(
        &self,
        organizer: Option<OrganizerId>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<Raffle>> {
        Box::pin(self.fetch_pending_activation(organizer, limit))
    }

    fn activate_raffle(&self, id: RaffleId) -> StoreFuture<'_, Transition<RaffleStatus>> {
        Box::pin(self.activate(id))
    }

    fn purchase(&self, id: PurchaseId) -> StoreFuture<'_, Option<Purchase>> {
        Box::pin(self.fetch_purchase(id))
    }

    fn reserve(&self, request: ReservationRequest) -> StoreFuture<'_, Reservation> {
        Box::pin(self.reserve_numbers(request))
    }

    fn active_holds(&self, raffle_id: RaffleId, now: DateTime<Utc>) -> StoreFuture<'_, Vec<Hold>> {
        Box::pin(self.fetch_active_holds(raffle_id, now))
    }

    fn release_expired(
        &self,
        raffle_id: RaffleId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, SweepReport> {
        Box::pin(self.sweep(raffle_id, now))
    }

    fn confirm_purchase(
        &self,
        id: PurchaseId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Confirmation> {
        Box::pin(self.confirm(id, now))
    }

    fn cancel_purchase(
        &self,
        id: PurchaseId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Cancellation> {
        Box::pin(self.cancel(id, now))
    }

    fn find_receipt<'a>(
        &'a self,
        provider: &'a str,
        event_key: &'a str,
    ) -> StoreFuture<'a, Option<WebhookReceipt>> {
        Box::pin(self.fetch_receipt(provider, event_key))
    }

    fn record_receipt(&self, receipt: WebhookReceipt) -> StoreFuture<'_, ()> {
        Box::pin(self.insert_receipt(receipt))
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
            Ok(())
        })
    }
}
