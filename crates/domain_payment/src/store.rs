//! Store ports: transactional persistence for payments and the
//! idempotency ledger
//!
//! Orchestrators own no mutable state. All mutation happens through a
//! [`PaymentUnitOfWork`] obtained from a [`PaymentStore`], and becomes
//! durable only at `commit`. Adapters must provide two consistency
//! guarantees:
//!
//! - `acquire_or_replay` is a single atomic insert-if-absent keyed by the
//!   ledger's uniqueness constraint, never a check-then-act pair;
//! - `lock_payment` holds a row-level lock for the life of the unit of
//!   work, so concurrent refunds always compute the remaining balance
//!   from committed state.

use async_trait::async_trait;
use chrono::Duration;
use thiserror::Error;

use core_kernel::{OrderId, PaymentId};

use crate::idempotency::{AcquireOutcome, IdempotencyKey, IdempotencyStatus};
use crate::payment::Payment;

/// Errors raised by store adapters
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not reach the backing store
    #[error("Store connection failed: {0}")]
    ConnectionFailed(String),

    /// The backing store rejected or failed an operation
    #[error("Store operation failed: {0}")]
    Backend(String),

    /// `finalize` was called on a record that already left `PROCESSING`
    ///
    /// Terminal records never move again; a second finalize is a
    /// programming error in the caller.
    #[error("Idempotency record already finalized: {0}")]
    AlreadyFinalized(String),

    /// A stored payload could not be (de)serialized
    #[error("Serialization failure: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Transactional store for payments and idempotency records
#[async_trait]
pub trait PaymentStore: Send + Sync + 'static {
    /// The unit-of-work type this store hands out
    type Uow: PaymentUnitOfWork;

    /// Opens a new atomic unit of work
    async fn begin(&self) -> Result<Self::Uow, StoreError>;

    /// Reads a payment outside any unit of work
    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, StoreError>;

    /// Returns all payments for an order currently in `SUCCESS`
    ///
    /// Used by the cancellation reactor; partially or fully refunded
    /// payments are intentionally excluded.
    async fn successful_payments_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<Payment>, StoreError>;
}

/// One atomic unit of work
///
/// Dropping a unit of work without calling `commit` discards its writes.
#[async_trait]
pub trait PaymentUnitOfWork: Send {
    /// Atomically creates the record for `key`, or returns the existing one
    ///
    /// Of N concurrent callers presenting the same new key, exactly one
    /// receives `Acquired`; the others receive `Replayed` with the record
    /// as persisted at the time of their read.
    async fn acquire_or_replay(
        &mut self,
        key: &IdempotencyKey,
        request: serde_json::Value,
        ttl: Duration,
    ) -> Result<AcquireOutcome, StoreError>;

    /// Links an idempotency record to the payment it resolved to
    async fn link_payment(
        &mut self,
        key: &IdempotencyKey,
        payment_id: PaymentId,
    ) -> Result<(), StoreError>;

    /// Moves a `PROCESSING` record to a terminal status, at most once
    ///
    /// `status` must be terminal. Fails with `AlreadyFinalized` if the
    /// record has already left `PROCESSING`.
    async fn finalize(
        &mut self,
        key: &IdempotencyKey,
        status: IdempotencyStatus,
        response: serde_json::Value,
        payment_id: Option<PaymentId>,
    ) -> Result<(), StoreError>;

    /// Inserts a newly created payment
    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError>;

    /// Persists the current state of an existing payment
    async fn update_payment(&mut self, payment: &Payment) -> Result<(), StoreError>;

    /// Loads a payment and locks its row for the rest of this unit of work
    async fn lock_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, StoreError>;

    /// Makes all writes of this unit of work durable
    async fn commit(self) -> Result<(), StoreError>;
}
