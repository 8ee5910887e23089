//! Test data builders
//!
//! Builders with sensible defaults so tests only spell out the fields
//! they care about.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use core_kernel::{OrderId, PaymentId};
use domain_payment::charge::ChargeRequest;
use domain_payment::payment::PaymentMethod;
use domain_payment::refund::RefundRequest;

/// A fresh, unique idempotency key
pub fn unique_key() -> String {
    format!("key-{}", Uuid::new_v4().simple())
}

/// Builder for charge requests
pub struct ChargeRequestBuilder {
    order_id: OrderId,
    amount: Decimal,
    method: PaymentMethod,
    idempotency_key: String,
    customer_info: serde_json::Value,
}

impl Default for ChargeRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChargeRequestBuilder {
    /// Creates a builder with default values and a unique key
    pub fn new() -> Self {
        Self {
            order_id: OrderId::new(1),
            amount: dec!(100.00),
            method: PaymentMethod::Card,
            idempotency_key: unique_key(),
            customer_info: serde_json::json!({}),
        }
    }

    pub fn with_order_id(mut self, order_id: i64) -> Self {
        self.order_id = OrderId::new(order_id);
        self
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_method(mut self, method: PaymentMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = key.into();
        self
    }

    pub fn with_customer_info(mut self, info: serde_json::Value) -> Self {
        self.customer_info = info;
        self
    }

    pub fn build(self) -> ChargeRequest {
        ChargeRequest {
            order_id: self.order_id,
            amount: self.amount,
            method: self.method,
            idempotency_key: self.idempotency_key,
            customer_info: self.customer_info,
        }
    }
}

/// Builder for refund requests
pub struct RefundRequestBuilder {
    payment_id: PaymentId,
    amount: Option<Decimal>,
    reason: Option<String>,
    idempotency_key: String,
}

impl RefundRequestBuilder {
    /// Creates a builder targeting the given payment, full remaining
    /// amount, unique key
    pub fn new(payment_id: PaymentId) -> Self {
        Self {
            payment_id,
            amount: None,
            reason: None,
            idempotency_key: unique_key(),
        }
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = key.into();
        self
    }

    pub fn build(self) -> RefundRequest {
        RefundRequest {
            payment_id: self.payment_id,
            amount: self.amount,
            reason: self.reason,
            idempotency_key: self.idempotency_key,
        }
    }
}
