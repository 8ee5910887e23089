//! Scripted gateway stub
//!
//! Mimics a payment gateway: approves by default, can be scripted with a
//! queue of outcomes, counts invocations, and can delay responses to
//! exercise the charge timeout.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use domain_payment::gateway::{
    AuthorizationRequest, GatewayError, GatewayOutcome, PaymentGateway,
};

/// A gateway whose outcomes are scripted by the test
#[derive(Default)]
pub struct StubGateway {
    scripted: Mutex<VecDeque<Result<GatewayOutcome, GatewayError>>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl StubGateway {
    /// Gateway that approves everything
    pub fn approving() -> Self {
        Self::default()
    }

    /// Gateway whose next call is declined with the given reason
    pub fn declining(reason: impl Into<String>) -> Self {
        let gateway = Self::default();
        gateway.push_declined(reason);
        gateway
    }

    /// Gateway that sleeps before answering, to trip the charge timeout
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Queues an approval for a future call
    pub fn push_approved(&self) {
        self.scripted
            .lock()
            .unwrap()
            .push_back(Ok(Self::approved_outcome()));
    }

    /// Queues a decline for a future call
    pub fn push_declined(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.scripted.lock().unwrap().push_back(Ok(GatewayOutcome::Declined {
            raw: serde_json::json!({
                "success": false,
                "reason": reason.clone(),
                "gateway": "StubGateway",
            }),
            reason,
        }));
    }

    /// Queues a transport error for a future call
    pub fn push_error(&self, message: impl Into<String>) {
        self.scripted
            .lock()
            .unwrap()
            .push_back(Err(GatewayError::Unreachable(message.into())));
    }

    /// Number of times `authorize` was invoked
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn approved_outcome() -> GatewayOutcome {
        let transaction_id = format!("TXN{}", &Uuid::new_v4().simple().to_string()[..12]);
        GatewayOutcome::Approved {
            raw: serde_json::json!({
                "success": true,
                "transaction_id": transaction_id.clone(),
                "gateway": "StubGateway",
            }),
            transaction_id,
        }
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn authorize(
        &self,
        _request: &AuthorizationRequest,
    ) -> Result<GatewayOutcome, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.scripted.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(Self::approved_outcome()))
    }
}
