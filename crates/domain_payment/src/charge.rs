//! Charge orchestration
//!
//! Executes a charge exactly once per idempotency key: the ledger entry,
//! the payment row and the gateway call all live inside one unit of work,
//! and outcome events are published best-effort after commit.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use core_kernel::OrderId;

use crate::error::PaymentError;
use crate::events::{EventPublisher, PaymentEvent};
use crate::gateway::{AuthorizationRequest, GatewayOutcome, PaymentGateway};
use crate::idempotency::{
    AcquireOutcome, IdempotencyKey, IdempotencyStatus, DEFAULT_IDEMPOTENCY_TTL_HOURS,
};
use crate::payment::{Payment, PaymentMethod};
use crate::store::{PaymentStore, PaymentUnitOfWork};
use crate::view::{ChargeOutcome, PaymentView};

/// Reason recorded when the gateway call exceeds its timeout
const GATEWAY_TIMEOUT_REASON: &str = "gateway timeout";

/// Tuning knobs for the charge path
#[derive(Debug, Clone)]
pub struct ChargeConfig {
    /// Validity window written on new idempotency records
    pub idempotency_ttl: Duration,
    /// Upper bound on the synchronous gateway call
    pub gateway_timeout: StdDuration,
}

impl ChargeConfig {
    /// Sets the idempotency TTL
    pub fn idempotency_ttl(mut self, ttl: Duration) -> Self {
        self.idempotency_ttl = ttl;
        self
    }

    /// Sets the gateway timeout
    pub fn gateway_timeout(mut self, timeout: StdDuration) -> Self {
        self.gateway_timeout = timeout;
        self
    }
}

impl Default for ChargeConfig {
    fn default() -> Self {
        Self {
            idempotency_ttl: Duration::hours(DEFAULT_IDEMPOTENCY_TTL_HOURS),
            gateway_timeout: StdDuration::from_secs(30),
        }
    }
}

/// A charge request, already shape-validated by the API layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub order_id: OrderId,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub idempotency_key: String,
    #[serde(default)]
    pub customer_info: serde_json::Value,
}

/// Coordinates ledger, payment store, gateway and publisher for charges
pub struct ChargeOrchestrator<S: PaymentStore> {
    store: S,
    gateway: Arc<dyn PaymentGateway>,
    publisher: Arc<dyn EventPublisher>,
    config: ChargeConfig,
}

impl<S: PaymentStore> ChargeOrchestrator<S> {
    /// Creates a charge orchestrator with default configuration
    pub fn new(store: S, gateway: Arc<dyn PaymentGateway>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self::with_config(store, gateway, publisher, ChargeConfig::default())
    }

    /// Creates a charge orchestrator with explicit configuration
    pub fn with_config(
        store: S,
        gateway: Arc<dyn PaymentGateway>,
        publisher: Arc<dyn EventPublisher>,
        config: ChargeConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            publisher,
            config,
        }
    }

    /// Charges an order, at most once per idempotency key
    ///
    /// Returns the payment view whether the gateway approved or declined;
    /// declines settle the payment as `FAILED` rather than raising an
    /// error. A key that was already completed replays its payment, a key
    /// still in flight or terminally failed yields `Conflict`.
    pub async fn charge(&self, request: ChargeRequest) -> Result<ChargeOutcome, PaymentError> {
        if request.amount <= Decimal::ZERO {
            return Err(PaymentError::validation("Amount must be greater than 0"));
        }
        if request.idempotency_key.is_empty() {
            return Err(PaymentError::validation("Idempotency key must not be empty"));
        }

        let key = IdempotencyKey::charge(&request.idempotency_key);
        let snapshot = serde_json::to_value(&request).map_err(crate::store::StoreError::from)?;

        let mut uow = self.store.begin().await?;
        let record = match uow
            .acquire_or_replay(&key, snapshot, self.config.idempotency_ttl)
            .await?
        {
            AcquireOutcome::Replayed(record) => {
                drop(uow);
                return self.resolve_existing_key(record).await;
            }
            AcquireOutcome::Acquired(record) => record,
        };

        let mut payment = Payment::new(request.order_id, request.amount, request.method);
        uow.insert_payment(&payment).await?;
        uow.link_payment(&record.key, payment.id).await?;

        let event = match self.authorize_bounded(&request).await {
            GatewayOutcome::Approved { raw, .. } => {
                payment.mark_success(raw)?;
                uow.update_payment(&payment).await?;
                uow.finalize(
                    &record.key,
                    IdempotencyStatus::Completed,
                    serde_json::to_value(PaymentView::from(&payment))
                        .map_err(crate::store::StoreError::from)?,
                    Some(payment.id),
                )
                .await?;

                PaymentEvent::Succeeded {
                    payment_id: payment.id,
                    order_id: payment.order_id,
                    amount: payment.amount,
                    method: payment.method,
                    reference: payment.reference.clone(),
                }
            }
            GatewayOutcome::Declined { reason, raw } => {
                payment.mark_failed(reason.clone(), Some(raw))?;
                uow.update_payment(&payment).await?;
                uow.finalize(
                    &record.key,
                    IdempotencyStatus::Failed,
                    serde_json::json!({ "error": reason }),
                    Some(payment.id),
                )
                .await?;

                PaymentEvent::Failed {
                    payment_id: payment.id,
                    order_id: payment.order_id,
                    amount: payment.amount,
                    reason,
                }
            }
        };

        uow.commit().await?;

        match &event {
            PaymentEvent::Succeeded { .. } => {
                info!(payment_id = %payment.id, order_id = %payment.order_id, "Payment succeeded")
            }
            _ => {
                warn!(
                    payment_id = %payment.id,
                    order_id = %payment.order_id,
                    reason = payment.failure_reason.as_deref().unwrap_or(""),
                    "Payment failed"
                )
            }
        }

        self.publish_best_effort(&event).await;

        Ok(ChargeOutcome {
            payment: PaymentView::from(&payment),
            replayed: false,
        })
    }

    /// Reads a payment by identity
    pub async fn get_payment(
        &self,
        id: core_kernel::PaymentId,
    ) -> Result<PaymentView, PaymentError> {
        let payment = self
            .store
            .get_payment(id)
            .await?
            .ok_or(PaymentError::NotFound(id))?;
        Ok(PaymentView::from(&payment))
    }

    /// Resolves a key that already has a ledger record
    async fn resolve_existing_key(
        &self,
        record: crate::idempotency::IdempotencyRecord,
    ) -> Result<ChargeOutcome, PaymentError> {
        match record.status {
            IdempotencyStatus::Completed => {
                let payment_id = record.payment_id.ok_or_else(|| {
                    crate::store::StoreError::Backend(format!(
                        "Completed idempotency record {} has no linked payment",
                        record.key
                    ))
                })?;
                let payment = self
                    .store
                    .get_payment(payment_id)
                    .await?
                    .ok_or(PaymentError::NotFound(payment_id))?;

                info!(key = %record.key, payment_id = %payment.id, "Replaying completed charge");
                Ok(ChargeOutcome {
                    payment: PaymentView::from(&payment),
                    replayed: true,
                })
            }
            IdempotencyStatus::Processing => Err(PaymentError::conflict(
                "A charge with this idempotency key is being processed",
            )),
            // A failed key stays failed; a fresh attempt needs a new key.
            IdempotencyStatus::Failed => Err(PaymentError::conflict(
                "A charge with this idempotency key already failed; retry with a new key",
            )),
        }
    }

    /// Invokes the gateway under the configured timeout
    ///
    /// Timeouts and transport errors are folded into a decline so the
    /// state machine stays decisive.
    async fn authorize_bounded(&self, request: &ChargeRequest) -> GatewayOutcome {
        let authorization = AuthorizationRequest {
            amount: request.amount,
            method: request.method,
            customer_info: request.customer_info.clone(),
        };

        match tokio::time::timeout(
            self.config.gateway_timeout,
            self.gateway.authorize(&authorization),
        )
        .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                warn!(error = %err, "Gateway call failed");
                GatewayOutcome::Declined {
                    reason: err.to_string(),
                    raw: serde_json::json!({ "error": err.to_string() }),
                }
            }
            Err(_) => {
                warn!(timeout = ?self.config.gateway_timeout, "Gateway call timed out");
                GatewayOutcome::Declined {
                    reason: GATEWAY_TIMEOUT_REASON.to_string(),
                    raw: serde_json::json!({ "error": GATEWAY_TIMEOUT_REASON }),
                }
            }
        }
    }

    async fn publish_best_effort(&self, event: &PaymentEvent) {
        if let Err(err) = self.publisher.publish(event).await {
            // Delivery is best-effort after commit; the transition stands.
            warn!(
                event_type = event.event_type(),
                payment_id = %event.payment_id(),
                error = %err,
                "Failed to publish payment event"
            );
        }
    }
}
