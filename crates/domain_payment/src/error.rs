//! Payment domain errors
//!
//! `Validation`, `NotFound`, `InvalidState` and `InvalidAmount` are
//! detected before any mutation and are side-effect-free; `Conflict`
//! reports an idempotency key already in use; `Infrastructure` wraps
//! store failures, which leave no durable effect when raised before
//! commit. Gateway declines are not errors: they settle the payment as
//! `FAILED` and are returned as data.

use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::PaymentId;

use crate::payment::PaymentStatus;
use crate::store::StoreError;

/// Errors surfaced by the charge and refund orchestrators
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Malformed input rejected before touching the ledger
    #[error("Validation error: {0}")]
    Validation(String),

    /// Idempotency key in use, or terminally failed for a prior attempt
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Unknown payment
    #[error("Payment not found: {0}")]
    NotFound(PaymentId),

    /// Refund attempted on a non-refundable payment
    #[error("Payment {payment_id} is not refundable in status {status}")]
    InvalidState {
        payment_id: PaymentId,
        status: PaymentStatus,
    },

    /// Refund amount non-positive or above the remaining balance
    #[error("Invalid refund amount {requested}: remaining balance is {remaining}")]
    InvalidAmount {
        requested: Decimal,
        remaining: Decimal,
    },

    /// Store or broker unavailable; no durable effect before commit
    #[error("Infrastructure error: {0}")]
    Infrastructure(#[from] StoreError),
}

impl PaymentError {
    pub fn validation(message: impl Into<String>) -> Self {
        PaymentError::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        PaymentError::Conflict(message.into())
    }

    /// Returns true if retrying with the same input can never succeed
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentError::Infrastructure(_))
    }
}
