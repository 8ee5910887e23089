//! Cancellation reactor tests

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::OrderId;
use domain_payment::cancellation::{CancellationReactor, CancellationSummary};
use domain_payment::charge::ChargeOrchestrator;
use domain_payment::events::OrderCancelled;
use domain_payment::idempotency::IdempotencyKey;
use domain_payment::payment::PaymentStatus;
use domain_payment::refund::RefundOrchestrator;
use domain_payment::store::{PaymentStore, PaymentUnitOfWork};
use test_utils::{ChargeRequestBuilder, InMemoryStore, RecordingPublisher, StubGateway};

struct Harness {
    store: InMemoryStore,
    publisher: Arc<RecordingPublisher>,
    reactor: CancellationReactor<InMemoryStore>,
}

impl Harness {
    fn new() -> Self {
        let store = InMemoryStore::new();
        let publisher = Arc::new(RecordingPublisher::new());
        let reactor = CancellationReactor::new(RefundOrchestrator::new(
            store.clone(),
            publisher.clone(),
        ));
        Self {
            store,
            publisher,
            reactor,
        }
    }

    async fn charge(&self, order_id: i64, amount: Decimal, approved: bool) -> core_kernel::PaymentId {
        let gateway = if approved {
            Arc::new(StubGateway::approving())
        } else {
            Arc::new(StubGateway::declining("Card declined"))
        };
        let charges =
            ChargeOrchestrator::new(self.store.clone(), gateway, self.publisher.clone());
        let outcome = charges
            .charge(
                ChargeRequestBuilder::new()
                    .with_order_id(order_id)
                    .with_amount(amount)
                    .build(),
            )
            .await
            .unwrap();
        outcome.payment.payment_id
    }
}

#[tokio::test]
async fn cancellation_refunds_successful_payment_in_full() {
    let harness = Harness::new();
    let payment_id = harness.charge(1, dec!(50.00), true).await;

    let event = OrderCancelled {
        order_id: OrderId::new(1),
    };
    let summary = harness.reactor.handle_order_cancelled(&event).await.unwrap();

    assert_eq!(
        summary,
        CancellationSummary {
            refunded: 1,
            skipped: 0,
            failed: 0
        }
    );

    let payment = harness.store.get_payment(payment_id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert_eq!(payment.refunded_amount, dec!(50.00));
    assert_eq!(harness.publisher.events_of_type("payment.refunded").len(), 1);
}

#[tokio::test]
async fn redelivered_cancellation_is_inert() {
    let harness = Harness::new();
    harness.charge(2, dec!(50.00), true).await;

    let event = OrderCancelled {
        order_id: OrderId::new(2),
    };
    let first = harness.reactor.handle_order_cancelled(&event).await.unwrap();
    let second = harness.reactor.handle_order_cancelled(&event).await.unwrap();

    assert_eq!(first.refunded, 1);
    assert_eq!(second, CancellationSummary::default());
    assert_eq!(harness.publisher.events_of_type("payment.refunded").len(), 1);
}

#[tokio::test]
async fn only_successful_payments_are_compensated() {
    let harness = Harness::new();
    let succeeded = harness.charge(3, dec!(30.00), true).await;
    let failed = harness.charge(3, dec!(40.00), false).await;

    let event = OrderCancelled {
        order_id: OrderId::new(3),
    };
    let summary = harness.reactor.handle_order_cancelled(&event).await.unwrap();

    assert_eq!(summary.refunded, 1);
    assert_eq!(summary.failed, 0);

    let refunded = harness.store.get_payment(succeeded).await.unwrap().unwrap();
    assert_eq!(refunded.status, PaymentStatus::Refunded);

    let untouched = harness.store.get_payment(failed).await.unwrap().unwrap();
    assert_eq!(untouched.status, PaymentStatus::Failed);
    assert_eq!(untouched.refunded_amount, Decimal::ZERO);
}

#[tokio::test]
async fn partially_refunded_payment_is_left_to_manual_handling() {
    let harness = Harness::new();
    let payment_id = harness.charge(4, dec!(100.00), true).await;

    // A manual partial refund happened before the order was cancelled;
    // the payment is no longer strictly successful and is not touched.
    let refunds = RefundOrchestrator::new(harness.store.clone(), harness.publisher.clone());
    refunds
        .refund(
            test_utils::RefundRequestBuilder::new(payment_id)
                .with_amount(dec!(25.00))
                .build(),
        )
        .await
        .unwrap();

    let event = OrderCancelled {
        order_id: OrderId::new(4),
    };
    let summary = harness.reactor.handle_order_cancelled(&event).await.unwrap();

    assert_eq!(summary, CancellationSummary::default());
    let payment = harness.store.get_payment(payment_id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::PartialRefund);
    assert_eq!(payment.refunded_amount, dec!(25.00));
}

#[tokio::test]
async fn in_flight_cancellation_key_is_skipped() {
    let harness = Harness::new();
    let payment_id = harness.charge(5, dec!(60.00), true).await;

    // Another consumer instance holds the deterministic key.
    {
        let mut uow = harness.store.begin().await.unwrap();
        uow.acquire_or_replay(
            &IdempotencyKey::cancellation(payment_id),
            serde_json::json!({}),
            chrono::Duration::hours(24),
        )
        .await
        .unwrap();
        uow.commit().await.unwrap();
    }

    let event = OrderCancelled {
        order_id: OrderId::new(5),
    };
    let summary = harness.reactor.handle_order_cancelled(&event).await.unwrap();

    assert_eq!(
        summary,
        CancellationSummary {
            refunded: 0,
            skipped: 1,
            failed: 0
        }
    );

    let payment = harness.store.get_payment(payment_id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);
}

#[tokio::test]
async fn unknown_order_produces_empty_summary() {
    let harness = Harness::new();

    let event = OrderCancelled {
        order_id: OrderId::new(999),
    };
    let summary = harness.reactor.handle_order_cancelled(&event).await.unwrap();

    assert_eq!(summary, CancellationSummary::default());
    assert!(harness.publisher.events().is_empty());
}
