//! Cancellation reactor: compensating refunds for cancelled orders
//!
//! Consumes `order.cancelled` events and refunds every still-successful
//! payment of the order for its full remaining amount. Idempotency keys
//! are derived deterministically from the payment identity, so a
//! redelivered cancellation event produces no additional refunds.

use tracing::{info, warn};

use crate::error::PaymentError;
use crate::events::OrderCancelled;
use crate::idempotency::IdempotencyKey;
use crate::refund::RefundOrchestrator;
use crate::store::PaymentStore;

/// Reason attached to compensating refunds
const CANCELLATION_REASON: &str = "Order cancellation";

/// Per-event processing summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CancellationSummary {
    /// Payments refunded by this delivery
    pub refunded: usize,
    /// Payments already handled (replayed key, raced into a
    /// non-refundable state, or key in flight elsewhere)
    pub skipped: usize,
    /// Payments whose refund failed and will need another delivery or
    /// manual reconciliation
    pub failed: usize,
}

/// Drives compensating refunds off order-cancellation events
pub struct CancellationReactor<S: PaymentStore> {
    refunds: RefundOrchestrator<S>,
}

impl<S: PaymentStore> CancellationReactor<S> {
    /// Creates a reactor driving the given refund orchestrator
    pub fn new(refunds: RefundOrchestrator<S>) -> Self {
        Self { refunds }
    }

    /// Processes one `order.cancelled` delivery
    ///
    /// Only payments strictly in `SUCCESS` are compensated. A failure on
    /// one payment is logged and does not block the others; the caller
    /// should acknowledge the delivery on `Ok` and redeliver on `Err`
    /// (raised only when the order's payments cannot be loaded at all).
    pub async fn handle_order_cancelled(
        &self,
        event: &OrderCancelled,
    ) -> Result<CancellationSummary, PaymentError> {
        let payments = self
            .refunds
            .store()
            .successful_payments_for_order(event.order_id)
            .await?;

        info!(
            order_id = %event.order_id,
            payments = payments.len(),
            "Handling order cancellation"
        );

        let mut summary = CancellationSummary::default();
        for payment in payments {
            let key = IdempotencyKey::cancellation(payment.id);
            match self
                .refunds
                .execute(payment.id, None, CANCELLATION_REASON.to_string(), key)
                .await
            {
                Ok(outcome) if outcome.replayed => summary.skipped += 1,
                Ok(outcome) => {
                    info!(
                        payment_id = %payment.id,
                        order_id = %event.order_id,
                        refund_amount = %outcome.refund_amount,
                        "Auto-refunded payment for cancelled order"
                    );
                    summary.refunded += 1;
                }
                // Raced into a non-refundable state or another instance
                // holds the key: the compensation is already handled.
                Err(PaymentError::InvalidState { .. }) | Err(PaymentError::Conflict(_)) => {
                    summary.skipped += 1;
                }
                Err(err) => {
                    warn!(
                        payment_id = %payment.id,
                        order_id = %event.order_id,
                        error = %err,
                        "Compensating refund failed"
                    );
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }
}
