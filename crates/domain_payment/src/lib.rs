//! Payment Domain - Idempotent payment transaction engine
//!
//! This crate implements the core of the payment service: the payment
//! lifecycle state machine, the idempotency ledger that makes charge and
//! refund safe under retry and concurrent submission, and the
//! orchestrators that tie them to the gateway and the event bus.
//!
//! # Guarantees
//!
//! - At most one payment and one gateway invocation per idempotency key
//! - `refunded_amount` is monotone and never exceeds `amount`
//! - Every committed settlement and refund is announced at least once
//!   (best-effort per attempt; consumers must tolerate duplicates)
//! - Redelivered order cancellations are inert
//!
//! # Structure
//!
//! Persistence, the gateway and the broker are ports
//! ([`store::PaymentStore`], [`gateway::PaymentGateway`],
//! [`events::EventPublisher`]); adapters live in `infra_db`,
//! `infra_events` and `test_utils`.

pub mod cancellation;
pub mod charge;
pub mod error;
pub mod events;
pub mod gateway;
pub mod idempotency;
pub mod payment;
pub mod refund;
pub mod store;
pub mod view;

pub use cancellation::{CancellationReactor, CancellationSummary};
pub use charge::{ChargeConfig, ChargeOrchestrator, ChargeRequest};
pub use error::PaymentError;
pub use events::{EventPublisher, OrderCancelled, PaymentEvent};
pub use gateway::{AuthorizationRequest, GatewayOutcome, PaymentGateway};
pub use idempotency::{AcquireOutcome, IdempotencyKey, IdempotencyRecord, IdempotencyStatus};
pub use payment::{Payment, PaymentMethod, PaymentStatus};
pub use refund::{RefundConfig, RefundOrchestrator, RefundRequest};
pub use store::{PaymentStore, PaymentUnitOfWork, StoreError};
pub use view::{ChargeOutcome, PaymentView, RefundOutcome};
