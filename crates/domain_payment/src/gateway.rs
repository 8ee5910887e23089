//! Payment gateway port
//!
//! The gateway is a black box invoked synchronously during a charge.
//! Callers bound the call with a timeout; a timeout or transport error is
//! a decisive gateway failure, never an ambiguous outcome.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::payment::PaymentMethod;

/// Request passed to the gateway for authorization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Amount to authorize
    pub amount: Decimal,
    /// Payment method
    pub method: PaymentMethod,
    /// Opaque customer details forwarded verbatim
    pub customer_info: serde_json::Value,
}

/// Outcome reported by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GatewayOutcome {
    /// Authorization approved
    Approved {
        /// Gateway-side transaction identifier
        transaction_id: String,
        /// Raw gateway payload, persisted for audit
        raw: serde_json::Value,
    },
    /// Authorization declined
    Declined {
        /// Human-readable decline reason
        reason: String,
        /// Raw gateway payload, persisted for audit
        raw: serde_json::Value,
    },
}

/// Transport-level gateway failure
///
/// Treated by the charge orchestrator exactly like a decline: the payment
/// settles as `FAILED` and no automatic retry happens.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Gateway unreachable: {0}")]
    Unreachable(String),

    #[error("Gateway returned a malformed response: {0}")]
    MalformedResponse(String),
}

/// Black-box authorization capability
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Authorizes a charge
    async fn authorize(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<GatewayOutcome, GatewayError>;
}
