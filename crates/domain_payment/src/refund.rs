//! Refund orchestration
//!
//! Executes a full or partial refund exactly once per idempotency key.
//! The payment row is lock-loaded for the whole unit of work, so two
//! refunds with different keys can never both compute the remaining
//! balance from the same stale state and together over-refund.

use std::sync::Arc;

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use core_kernel::PaymentId;

use crate::error::PaymentError;
use crate::events::{EventPublisher, PaymentEvent};
use crate::idempotency::{
    AcquireOutcome, IdempotencyKey, IdempotencyStatus, DEFAULT_IDEMPOTENCY_TTL_HOURS,
};
use crate::store::{PaymentStore, PaymentUnitOfWork, StoreError};
use crate::view::{PaymentView, RefundOutcome};

/// Reason recorded when the caller supplies none
const DEFAULT_REFUND_REASON: &str = "Customer request";

/// Tuning knobs for the refund path
#[derive(Debug, Clone)]
pub struct RefundConfig {
    /// Validity window written on new idempotency records
    pub idempotency_ttl: Duration,
}

impl Default for RefundConfig {
    fn default() -> Self {
        Self {
            idempotency_ttl: Duration::hours(DEFAULT_IDEMPOTENCY_TTL_HOURS),
        }
    }
}

/// A refund request, already shape-validated by the API layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub payment_id: PaymentId,
    /// Amount to refund; the full remaining balance when omitted
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
    pub idempotency_key: String,
}

/// Coordinates ledger, payment store and publisher for refunds
pub struct RefundOrchestrator<S: PaymentStore> {
    store: S,
    publisher: Arc<dyn EventPublisher>,
    config: RefundConfig,
}

impl<S: PaymentStore> RefundOrchestrator<S> {
    /// Creates a refund orchestrator with default configuration
    pub fn new(store: S, publisher: Arc<dyn EventPublisher>) -> Self {
        Self::with_config(store, publisher, RefundConfig::default())
    }

    /// Creates a refund orchestrator with explicit configuration
    pub fn with_config(store: S, publisher: Arc<dyn EventPublisher>, config: RefundConfig) -> Self {
        Self {
            store,
            publisher,
            config,
        }
    }

    /// The store this orchestrator operates on
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Refunds a payment, at most once per idempotency key
    ///
    /// The ledger key is scoped as `refund:{payment_id}:{key}`, so refund
    /// deduplication never collides with charges or with refunds of other
    /// payments.
    pub async fn refund(&self, request: RefundRequest) -> Result<RefundOutcome, PaymentError> {
        if request.idempotency_key.is_empty() {
            return Err(PaymentError::validation("Idempotency key must not be empty"));
        }

        let key = IdempotencyKey::refund(request.payment_id, &request.idempotency_key);
        self.execute(
            request.payment_id,
            request.amount,
            request.reason.unwrap_or_else(|| DEFAULT_REFUND_REASON.to_string()),
            key,
        )
        .await
    }

    /// Runs the refund protocol under a caller-provided scoped key
    ///
    /// The cancellation reactor uses this with its deterministic
    /// `cancel:{payment_id}` keys.
    pub(crate) async fn execute(
        &self,
        payment_id: PaymentId,
        requested_amount: Option<Decimal>,
        reason: String,
        key: IdempotencyKey,
    ) -> Result<RefundOutcome, PaymentError> {
        let mut uow = self.store.begin().await?;

        // Row lock held until commit; concurrent refunds serialize here.
        let mut payment = uow
            .lock_payment(payment_id)
            .await?
            .ok_or(PaymentError::NotFound(payment_id))?;

        if !payment.status.is_refundable() {
            return Err(PaymentError::InvalidState {
                payment_id,
                status: payment.status,
            });
        }

        let snapshot = serde_json::json!({
            "payment_id": payment_id,
            "amount": requested_amount,
            "reason": reason,
        });

        let record = match uow
            .acquire_or_replay(&key, snapshot, self.config.idempotency_ttl)
            .await?
        {
            AcquireOutcome::Replayed(record) => {
                drop(uow);
                return Self::resolve_existing_key(record, &payment);
            }
            AcquireOutcome::Acquired(record) => record,
        };

        let effective_amount = requested_amount.unwrap_or_else(|| payment.remaining());
        payment.apply_refund(effective_amount)?;
        uow.update_payment(&payment).await?;

        let outcome = RefundOutcome {
            refund_amount: effective_amount,
            payment: PaymentView::from(&payment),
            replayed: false,
        };
        uow.finalize(
            &record.key,
            IdempotencyStatus::Completed,
            serde_json::to_value(&outcome).map_err(StoreError::from)?,
            Some(payment.id),
        )
        .await?;

        uow.commit().await?;

        info!(
            payment_id = %payment.id,
            order_id = %payment.order_id,
            refund_amount = %effective_amount,
            total_refunded = %payment.refunded_amount,
            "Payment refunded"
        );

        let event = PaymentEvent::Refunded {
            payment_id: payment.id,
            order_id: payment.order_id,
            refund_amount: effective_amount,
            total_refunded: payment.refunded_amount,
            reason,
        };
        if let Err(err) = self.publisher.publish(&event).await {
            // Delivery is best-effort after commit; the transition stands.
            warn!(
                payment_id = %payment.id,
                error = %err,
                "Failed to publish payment.refunded event"
            );
        }

        Ok(outcome)
    }

    /// Resolves a refund key that already has a ledger record
    fn resolve_existing_key(
        record: crate::idempotency::IdempotencyRecord,
        payment: &crate::payment::Payment,
    ) -> Result<RefundOutcome, PaymentError> {
        match record.status {
            IdempotencyStatus::Completed => {
                // Recover the per-request refund amount from the stored
                // snapshot; the payment view is always the current state.
                let refund_amount = record
                    .response
                    .as_ref()
                    .and_then(|response| response.get("refund_amount"))
                    .and_then(|value| serde_json::from_value::<Decimal>(value.clone()).ok())
                    .unwrap_or(Decimal::ZERO);

                info!(key = %record.key, payment_id = %payment.id, "Replaying completed refund");
                Ok(RefundOutcome {
                    refund_amount,
                    payment: PaymentView::from(payment),
                    replayed: true,
                })
            }
            IdempotencyStatus::Processing => Err(PaymentError::conflict(
                "A refund with this idempotency key is being processed",
            )),
            IdempotencyStatus::Failed => Err(PaymentError::conflict(
                "A refund with this idempotency key already failed; retry with a new key",
            )),
        }
    }
}
