//! PostgreSQL payment store
//!
//! Implements the store ports on top of `sqlx` transactions. The two
//! consistency guarantees the domain relies on map directly onto
//! PostgreSQL primitives:
//!
//! - `acquire_or_replay` is `INSERT … ON CONFLICT (key) DO NOTHING
//!   RETURNING …`; a concurrent creator blocks on the key's uniqueness
//!   constraint until the winner commits, and the loser then reads the
//!   committed record.
//! - `lock_payment` is `SELECT … FOR UPDATE`, holding the row lock until
//!   the transaction ends so refund read-modify-writes serialize.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use core_kernel::{OrderId, PaymentId};
use domain_payment::idempotency::{
    AcquireOutcome, IdempotencyKey, IdempotencyRecord, IdempotencyStatus,
};
use domain_payment::payment::Payment;
use domain_payment::store::{PaymentStore, PaymentUnitOfWork, StoreError};

const SELECT_PAYMENT: &str = "SELECT id, order_id, amount, method, status, reference, \
     refunded_amount, gateway_response, failure_reason, created_at, updated_at \
     FROM payments";

const SELECT_RECORD: &str = "SELECT key, payment_id, request_data, response_data, status, \
     created_at, expires_at \
     FROM idempotency_records";

/// PostgreSQL-backed payment store
#[derive(Debug, Clone)]
pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    /// Creates a store over the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    type Uow = PgUnitOfWork;

    async fn begin(&self) -> Result<Self::Uow, StoreError> {
        let tx = self.pool.begin().await.map_err(store_err)?;
        Ok(PgUnitOfWork { tx })
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("{SELECT_PAYMENT} WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(store_err)?;

        row.map(Payment::try_from).transpose()
    }

    async fn successful_payments_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<Payment>, StoreError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "{SELECT_PAYMENT} WHERE order_id = $1 AND status = 'SUCCESS' ORDER BY created_at"
        ))
        .bind(order_id.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter().map(Payment::try_from).collect()
    }
}

/// Unit of work backed by a PostgreSQL transaction
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl PaymentUnitOfWork for PgUnitOfWork {
    async fn acquire_or_replay(
        &mut self,
        key: &IdempotencyKey,
        request: serde_json::Value,
        ttl: Duration,
    ) -> Result<AcquireOutcome, StoreError> {
        let record = IdempotencyRecord::new(key.clone(), request, ttl);

        let inserted = sqlx::query(
            "INSERT INTO idempotency_records \
                 (key, payment_id, request_data, response_data, status, created_at, expires_at) \
             VALUES ($1, NULL, $2, NULL, $3, $4, $5) \
             ON CONFLICT (key) DO NOTHING",
        )
        .bind(key.as_str())
        .bind(&record.request)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;

        if inserted.rows_affected() == 1 {
            return Ok(AcquireOutcome::Acquired(record));
        }

        // Lost the race (or the key is old): read the persisted record.
        let row: IdempotencyRow = sqlx::query_as(&format!("{SELECT_RECORD} WHERE key = $1"))
            .bind(key.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_err)?
            .ok_or_else(|| {
                StoreError::Backend(format!("Idempotency record {key} vanished after conflict"))
            })?;

        Ok(AcquireOutcome::Replayed(row.try_into()?))
    }

    async fn link_payment(
        &mut self,
        key: &IdempotencyKey,
        payment_id: PaymentId,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE idempotency_records SET payment_id = $2 WHERE key = $1")
            .bind(key.as_str())
            .bind(payment_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Backend(format!(
                "No idempotency record for {key}"
            )));
        }
        Ok(())
    }

    async fn finalize(
        &mut self,
        key: &IdempotencyKey,
        status: IdempotencyStatus,
        response: serde_json::Value,
        payment_id: Option<PaymentId>,
    ) -> Result<(), StoreError> {
        debug_assert!(status.is_terminal(), "finalize requires a terminal status");

        // Guarded by the PROCESSING predicate: a terminal record never
        // moves again, so a second finalize matches zero rows.
        let result = sqlx::query(
            "UPDATE idempotency_records \
             SET status = $2, response_data = $3, payment_id = COALESCE($4, payment_id) \
             WHERE key = $1 AND status = 'PROCESSING'",
        )
        .bind(key.as_str())
        .bind(status.as_str())
        .bind(&response)
        .bind(payment_id.map(|id| *id.as_uuid()))
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyFinalized(key.to_string()));
        }
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO payments \
                 (id, order_id, amount, method, status, reference, refunded_amount, \
                  gateway_response, failure_reason, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.as_i64())
        .bind(payment.amount)
        .bind(payment.method.as_str())
        .bind(payment.status.as_str())
        .bind(&payment.reference)
        .bind(payment.refunded_amount)
        .bind(&payment.gateway_response)
        .bind(&payment.failure_reason)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE payments \
             SET status = $2, refunded_amount = $3, gateway_response = $4, \
                 failure_reason = $5, updated_at = $6 \
             WHERE id = $1",
        )
        .bind(payment.id.as_uuid())
        .bind(payment.status.as_str())
        .bind(payment.refunded_amount)
        .bind(&payment.gateway_response)
        .bind(&payment.failure_reason)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Backend(format!(
                "Unknown payment id {}",
                payment.id
            )));
        }
        Ok(())
    }

    async fn lock_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("{SELECT_PAYMENT} WHERE id = $1 FOR UPDATE"))
                .bind(id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(store_err)?;

        row.map(Payment::try_from).transpose()
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(store_err)
    }
}

fn store_err(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::ConnectionFailed(err.to_string())
        }
        other => StoreError::Backend(other.to_string()),
    }
}

/// Database row for a payment
#[derive(Debug, FromRow)]
struct PaymentRow {
    id: Uuid,
    order_id: i64,
    amount: Decimal,
    method: String,
    status: String,
    reference: String,
    refunded_amount: Decimal,
    gateway_response: Option<serde_json::Value>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: PaymentId::from_uuid(row.id),
            order_id: OrderId::new(row.order_id),
            amount: row.amount,
            method: row
                .method
                .parse()
                .map_err(|e| StoreError::Serialization(format!("{e}")))?,
            status: row
                .status
                .parse()
                .map_err(|e| StoreError::Serialization(format!("{e}")))?,
            reference: row.reference,
            refunded_amount: row.refunded_amount,
            gateway_response: row.gateway_response,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Database row for an idempotency record
#[derive(Debug, FromRow)]
struct IdempotencyRow {
    key: String,
    payment_id: Option<Uuid>,
    request_data: serde_json::Value,
    response_data: Option<serde_json::Value>,
    status: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<IdempotencyRow> for IdempotencyRecord {
    type Error = StoreError;

    fn try_from(row: IdempotencyRow) -> Result<Self, Self::Error> {
        Ok(IdempotencyRecord {
            key: IdempotencyKey::from_stored(row.key),
            payment_id: row.payment_id.map(PaymentId::from_uuid),
            request: row.request_data,
            response: row.response_data,
            status: row
                .status
                .parse()
                .map_err(|e| StoreError::Serialization(format!("{e}")))?,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}
