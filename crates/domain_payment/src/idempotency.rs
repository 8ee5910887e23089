//! Idempotency ledger types
//!
//! The ledger maps a client-supplied key to the outcome of the operation it
//! guards. The key's uniqueness constraint in the store doubles as a mutex:
//! of N concurrent callers presenting the same new key, exactly one acquires
//! it and the rest replay whatever the record holds at the time of their
//! read.
//!
//! Keys are scoped per operation so charge and refund deduplication never
//! collide: charges use the raw client key, refunds derive a compound key
//! from the payment identity, and cancellation-driven refunds use a
//! deterministic system key so redelivered cancellation events are inert.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::PaymentId;

/// Default validity window for an idempotency record
pub const DEFAULT_IDEMPOTENCY_TTL_HOURS: i64 = 24;

/// An operation-scoped idempotency key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Key guarding a charge: the raw client key
    pub fn charge(client_key: impl Into<String>) -> Self {
        Self(client_key.into())
    }

    /// Key guarding a refund, scoped to the payment so refunds of
    /// different payments (and charges) never collide
    pub fn refund(payment_id: PaymentId, client_key: &str) -> Self {
        Self(format!("refund:{payment_id}:{client_key}"))
    }

    /// Rehydrates an already-scoped key as read back from the store
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Deterministic system key for a compensating refund, derived from
    /// the payment identity alone so reprocessing the same cancellation
    /// event resolves to the same record
    pub fn cancellation(payment_id: PaymentId) -> Self {
        Self(format!("cancel:{payment_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of an idempotency record
///
/// `Processing` is the only initial state; `Completed` and `Failed` are
/// terminal and never reopen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdempotencyStatus {
    Processing,
    Completed,
    Failed,
}

impl IdempotencyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdempotencyStatus::Processing => "PROCESSING",
            IdempotencyStatus::Completed => "COMPLETED",
            IdempotencyStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, IdempotencyStatus::Processing)
    }
}

impl fmt::Display for IdempotencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for IdempotencyStatus {
    type Err = crate::error::PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROCESSING" => Ok(IdempotencyStatus::Processing),
            "COMPLETED" => Ok(IdempotencyStatus::Completed),
            "FAILED" => Ok(IdempotencyStatus::Failed),
            other => Err(crate::error::PaymentError::validation(format!(
                "Unknown idempotency status: {other}"
            ))),
        }
    }
}

/// A durable idempotency record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// The scoped key, unique across the ledger
    pub key: IdempotencyKey,
    /// Payment resolved by the guarded operation, set once known
    pub payment_id: Option<PaymentId>,
    /// Snapshot of the original request, kept for audit and replay
    pub request: serde_json::Value,
    /// Response payload recorded at completion
    pub response: Option<serde_json::Value>,
    /// Record lifecycle status
    pub status: IdempotencyStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// End of the validity window; expired records are retained, not
    /// relitigated
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// Creates a fresh `Processing` record with the given TTL
    pub fn new(key: IdempotencyKey, request: serde_json::Value, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            key,
            payment_id: None,
            request,
            response: None,
            status: IdempotencyStatus::Processing,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Returns true if the validity window has elapsed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Result of presenting a key to the ledger
///
/// `Acquired` means this caller created the record and owns the guarded
/// operation; `Replayed` carries the record some earlier caller created,
/// with whatever status it had at read time.
#[derive(Debug, Clone)]
pub enum AcquireOutcome {
    Acquired(IdempotencyRecord),
    Replayed(IdempotencyRecord),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_scoping_never_collides() {
        let payment_a = PaymentId::new();
        let payment_b = PaymentId::new();

        let charge = IdempotencyKey::charge("client-key-0001");
        let refund_a = IdempotencyKey::refund(payment_a, "client-key-0001");
        let refund_b = IdempotencyKey::refund(payment_b, "client-key-0001");

        assert_ne!(charge, refund_a);
        assert_ne!(refund_a, refund_b);
    }

    #[test]
    fn test_cancellation_key_is_deterministic() {
        let payment_id = PaymentId::new();
        assert_eq!(
            IdempotencyKey::cancellation(payment_id),
            IdempotencyKey::cancellation(payment_id)
        );
    }

    #[test]
    fn test_new_record_is_processing_with_ttl() {
        let record = IdempotencyRecord::new(
            IdempotencyKey::charge("client-key-0001"),
            serde_json::json!({"order_id": 1}),
            Duration::hours(DEFAULT_IDEMPOTENCY_TTL_HOURS),
        );

        assert_eq!(record.status, IdempotencyStatus::Processing);
        assert!(record.payment_id.is_none());
        assert_eq!(record.expires_at - record.created_at, Duration::hours(24));
        assert!(!record.is_expired(Utc::now()));
        assert!(record.is_expired(record.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!IdempotencyStatus::Processing.is_terminal());
        assert!(IdempotencyStatus::Completed.is_terminal());
        assert!(IdempotencyStatus::Failed.is_terminal());
    }
}
