//! Payment entity and lifecycle state machine
//!
//! A payment is created in `Pending` by the charge orchestrator, settles to
//! `Success` or `Failed` within the same unit of work, and may later move
//! through `PartialRefund` to `Refunded`. Transitions outside that graph are
//! rejected.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use core_kernel::{OrderId, PaymentId};

use crate::error::PaymentError;

/// Payment method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// Credit/debit card
    Card,
    /// Unified Payments Interface
    Upi,
    /// Cash on delivery
    Cod,
    /// Net banking
    NetBanking,
}

impl PaymentMethod {
    /// Returns the canonical wire/storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "CARD",
            PaymentMethod::Upi => "UPI",
            PaymentMethod::Cod => "COD",
            PaymentMethod::NetBanking => "NET_BANKING",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CARD" => Ok(PaymentMethod::Card),
            "UPI" => Ok(PaymentMethod::Upi),
            "COD" => Ok(PaymentMethod::Cod),
            "NET_BANKING" => Ok(PaymentMethod::NetBanking),
            other => Err(PaymentError::validation(format!(
                "Unknown payment method: {other}"
            ))),
        }
    }
}

/// Payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Gateway call in flight; only visible inside the charge unit of work
    Pending,
    /// Charge settled successfully
    Success,
    /// Charge declined or timed out
    Failed,
    /// Fully refunded (`refunded_amount == amount`)
    Refunded,
    /// Partially refunded (`0 < refunded_amount < amount`)
    PartialRefund,
}

impl PaymentStatus {
    /// Returns the canonical wire/storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::PartialRefund => "PARTIAL_REFUND",
        }
    }

    /// Returns true if a refund may be applied in this status
    pub fn is_refundable(&self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::PartialRefund)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "SUCCESS" => Ok(PaymentStatus::Success),
            "FAILED" => Ok(PaymentStatus::Failed),
            "REFUNDED" => Ok(PaymentStatus::Refunded),
            "PARTIAL_REFUND" => Ok(PaymentStatus::PartialRefund),
            other => Err(PaymentError::validation(format!(
                "Unknown payment status: {other}"
            ))),
        }
    }
}

/// A payment record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// Unique identifier
    pub id: PaymentId,
    /// Order this payment settles
    pub order_id: OrderId,
    /// Charged amount, always positive
    pub amount: Decimal,
    /// Payment method
    pub method: PaymentMethod,
    /// Lifecycle status
    pub status: PaymentStatus,
    /// Globally unique human-readable reference
    pub reference: String,
    /// Total refunded so far, never decreases
    pub refunded_amount: Decimal,
    /// Raw gateway payload captured at settlement
    pub gateway_response: Option<serde_json::Value>,
    /// Decline/timeout reason when the charge failed
    pub failure_reason: Option<String>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Creates a new payment in `Pending` with a fresh reference
    pub fn new(order_id: OrderId, amount: Decimal, method: PaymentMethod) -> Self {
        let now = Utc::now();

        Self {
            id: PaymentId::new_v7(),
            order_id,
            amount: amount.round_dp(2),
            method,
            status: PaymentStatus::Pending,
            reference: generate_reference(now),
            refunded_amount: Decimal::ZERO,
            gateway_response: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Remaining refundable balance
    pub fn remaining(&self) -> Decimal {
        self.amount - self.refunded_amount
    }

    /// Settles the pending charge as successful
    ///
    /// Only legal from `Pending`.
    pub fn mark_success(&mut self, gateway_response: serde_json::Value) -> Result<(), PaymentError> {
        self.require_status(PaymentStatus::Pending, "mark_success")?;
        self.status = PaymentStatus::Success;
        self.gateway_response = Some(gateway_response);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Settles the pending charge as failed with the gateway's reason
    ///
    /// Only legal from `Pending`.
    pub fn mark_failed(
        &mut self,
        reason: impl Into<String>,
        gateway_response: Option<serde_json::Value>,
    ) -> Result<(), PaymentError> {
        self.require_status(PaymentStatus::Pending, "mark_failed")?;
        self.status = PaymentStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.gateway_response = gateway_response;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Applies a refund, moving to `PartialRefund` or `Refunded`
    ///
    /// Rejects non-positive amounts, amounts above the remaining balance,
    /// and payments that are not in a refundable status. On success the
    /// refunded total is incremented and the status recomputed, so
    /// `refunded_amount` can only grow and never exceeds `amount`.
    pub fn apply_refund(&mut self, refund_amount: Decimal) -> Result<(), PaymentError> {
        if !self.status.is_refundable() {
            return Err(PaymentError::InvalidState {
                payment_id: self.id,
                status: self.status,
            });
        }

        let remaining = self.remaining();
        if refund_amount <= Decimal::ZERO || refund_amount > remaining {
            return Err(PaymentError::InvalidAmount {
                requested: refund_amount,
                remaining,
            });
        }

        self.refunded_amount += refund_amount;
        self.status = if self.refunded_amount == self.amount {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartialRefund
        };
        self.updated_at = Utc::now();
        Ok(())
    }

    fn require_status(&self, expected: PaymentStatus, operation: &str) -> Result<(), PaymentError> {
        if self.status != expected {
            return Err(PaymentError::validation(format!(
                "{operation} requires status {expected}, payment {} is {}",
                self.id, self.status
            )));
        }
        Ok(())
    }
}

/// Generates a globally unique payment reference
///
/// Format: `PAY{YYYYMMDD}-{6 hex chars}`, date from creation time plus a
/// random suffix.
fn generate_reference(created_at: DateTime<Utc>) -> String {
    let date = created_at.format("%Y%m%d");
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(6)
        .collect::<String>()
        .to_uppercase();
    format!("PAY{date}-{suffix}")
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    proptest! {
        /// Any sequence of refund attempts keeps the refunded total
        /// non-decreasing and within the charged amount.
        #[test]
        fn refunded_amount_is_monotone_and_bounded(
            amount_minor in 1i64..1_000_000i64,
            refunds_minor in prop::collection::vec(-1_000i64..1_000_000i64, 1..20)
        ) {
            let amount = Decimal::new(amount_minor, 2);
            let mut payment = Payment::new(OrderId::new(7), amount, PaymentMethod::Upi);
            payment.mark_success(serde_json::json!({})).unwrap();

            let mut previous = payment.refunded_amount;
            for refund_minor in refunds_minor {
                let _ = payment.apply_refund(Decimal::new(refund_minor, 2));
                prop_assert!(payment.refunded_amount >= previous);
                prop_assert!(payment.refunded_amount <= payment.amount);
                previous = payment.refunded_amount;
            }

            // Status always agrees with the refund accounting.
            if payment.refunded_amount == payment.amount {
                prop_assert_eq!(payment.status, PaymentStatus::Refunded);
            } else if payment.refunded_amount > dec!(0) {
                prop_assert_eq!(payment.status, PaymentStatus::PartialRefund);
            } else {
                prop_assert_eq!(payment.status, PaymentStatus::Success);
            }
        }
    }
}
