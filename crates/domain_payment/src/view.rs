//! Per-operation view structs
//!
//! Responses are explicit structs rather than reflections of the entity,
//! so each operation controls exactly which fields it exposes and the
//! stored response snapshots have a stable shape.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{OrderId, PaymentId};

use crate::payment::{Payment, PaymentMethod, PaymentStatus};

/// Full payment view returned by `charge`, `refund` and `get_payment`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentView {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub reference: String,
    pub refunded_amount: Decimal,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Payment> for PaymentView {
    fn from(payment: &Payment) -> Self {
        Self {
            payment_id: payment.id,
            order_id: payment.order_id,
            amount: payment.amount,
            method: payment.method,
            status: payment.status,
            reference: payment.reference.clone(),
            refunded_amount: payment.refunded_amount,
            failure_reason: payment.failure_reason.clone(),
            created_at: payment.created_at,
            updated_at: payment.updated_at,
        }
    }
}

/// Result of a charge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeOutcome {
    /// The payment in its current state; inspect `payment.status` to
    /// distinguish a settled success from a gateway decline
    pub payment: PaymentView,
    /// True when this response replays a previously completed charge
    pub replayed: bool,
}

/// Result of a refund
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundOutcome {
    /// Amount refunded under this idempotency key; on a replay this is
    /// the amount recorded when the refund first executed
    pub refund_amount: Decimal,
    /// The payment after the refund
    pub payment: PaymentView,
    /// True when this response replays a previously completed refund
    pub replayed: bool,
}
