//! In-memory store adapter
//!
//! Implements the store ports over a `HashMap` behind one asynchronous
//! mutex. A unit of work holds the mutex guard for its whole lifetime, so
//! units of work are fully serialized: the uniqueness constraint and the
//! row lock of the real database both degenerate to "whoever begins
//! first wins", which is exactly the linearization the orchestrators
//! rely on. Writes are applied eagerly against the live state and rolled
//! back from a snapshot when the unit of work is dropped uncommitted.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use core_kernel::{OrderId, PaymentId};
use domain_payment::idempotency::{AcquireOutcome, IdempotencyKey, IdempotencyRecord, IdempotencyStatus};
use domain_payment::payment::{Payment, PaymentStatus};
use domain_payment::store::{PaymentStore, PaymentUnitOfWork, StoreError};

#[derive(Clone, Default)]
struct State {
    payments: HashMap<PaymentId, Payment>,
    records: HashMap<String, IdempotencyRecord>,
}

/// In-memory payment store for tests
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the idempotency record for a key, if any
    pub async fn record(&self, key: &IdempotencyKey) -> Option<IdempotencyRecord> {
        self.state.lock().await.records.get(key.as_str()).cloned()
    }

    /// Number of payments ever created
    pub async fn payment_count(&self) -> usize {
        self.state.lock().await.payments.len()
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    type Uow = InMemoryUnitOfWork;

    async fn begin(&self) -> Result<Self::Uow, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let snapshot = guard.clone();
        Ok(InMemoryUnitOfWork {
            guard,
            snapshot,
            committed: false,
        })
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        Ok(self.state.lock().await.payments.get(&id).cloned())
    }

    async fn successful_payments_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<Payment>, StoreError> {
        let state = self.state.lock().await;
        let mut payments: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| p.order_id == order_id && p.status == PaymentStatus::Success)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }
}

/// Unit of work backed by the store-wide mutex guard
pub struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<State>,
    snapshot: State,
    committed: bool,
}

impl Drop for InMemoryUnitOfWork {
    fn drop(&mut self) {
        // Uncommitted writes are undone before the guard is released.
        if !self.committed {
            std::mem::swap(&mut *self.guard, &mut self.snapshot);
        }
    }
}

#[async_trait]
impl PaymentUnitOfWork for InMemoryUnitOfWork {
    async fn acquire_or_replay(
        &mut self,
        key: &IdempotencyKey,
        request: serde_json::Value,
        ttl: Duration,
    ) -> Result<AcquireOutcome, StoreError> {
        if let Some(existing) = self.guard.records.get(key.as_str()) {
            return Ok(AcquireOutcome::Replayed(existing.clone()));
        }

        let record = IdempotencyRecord::new(key.clone(), request, ttl);
        self.guard
            .records
            .insert(key.as_str().to_string(), record.clone());
        Ok(AcquireOutcome::Acquired(record))
    }

    async fn link_payment(
        &mut self,
        key: &IdempotencyKey,
        payment_id: PaymentId,
    ) -> Result<(), StoreError> {
        let record = self
            .guard
            .records
            .get_mut(key.as_str())
            .ok_or_else(|| StoreError::Backend(format!("No idempotency record for {key}")))?;
        record.payment_id = Some(payment_id);
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

        let record = self
            .guard
            .records
            .get_mut(key.as_str())
            .ok_or_else(|| StoreError::Backend(format!("No idempotency record for {key}")))?;
        if record.status.is_terminal() {
            return Err(StoreError::AlreadyFinalized(key.to_string()));
        }

        record.status = status;
        record.response = Some(response);
        if payment_id.is_some() {
            record.payment_id = payment_id;
        }
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        if self.guard.payments.contains_key(&payment.id) {
            return Err(StoreError::Backend(format!(
                "Duplicate payment id {}",
                payment.id
            )));
        }
        self.guard.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        if !self.guard.payments.contains_key(&payment.id) {
            return Err(StoreError::Backend(format!(
                "Unknown payment id {}",
                payment.id
            )));
        }
        self.guard.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn lock_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        Ok(self.guard.payments.get(&id).cloned())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        // Writes were applied eagerly; releasing the guard publishes them.
        self.committed = true;
        Ok(())
    }
}
