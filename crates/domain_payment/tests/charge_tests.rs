//! Charge orchestration tests
//!
//! Exercises the idempotent charge path against the in-memory store,
//! scripted gateway and recording publisher.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;

use domain_payment::charge::{ChargeConfig, ChargeOrchestrator};
use domain_payment::error::PaymentError;
use domain_payment::idempotency::{IdempotencyKey, IdempotencyStatus};
use domain_payment::payment::PaymentStatus;
use domain_payment::store::{PaymentStore, PaymentUnitOfWork};
use test_utils::{unique_key, ChargeRequestBuilder, InMemoryStore, RecordingPublisher, StubGateway};

fn orchestrator(
    store: &InMemoryStore,
    gateway: &Arc<StubGateway>,
    publisher: &Arc<RecordingPublisher>,
) -> ChargeOrchestrator<InMemoryStore> {
    ChargeOrchestrator::new(store.clone(), gateway.clone(), publisher.clone())
}

#[tokio::test]
async fn successful_charge_settles_and_publishes() {
    let store = InMemoryStore::new();
    let gateway = Arc::new(StubGateway::approving());
    let publisher = Arc::new(RecordingPublisher::new());
    let charges = orchestrator(&store, &gateway, &publisher);

    let request = ChargeRequestBuilder::new()
        .with_order_id(10)
        .with_amount(dec!(250.00))
        .build();
    let key = request.idempotency_key.clone();

    let outcome = charges.charge(request).await.unwrap();

    assert!(!outcome.replayed);
    assert_eq!(outcome.payment.status, PaymentStatus::Success);
    assert_eq!(outcome.payment.amount, dec!(250.00));
    assert!(outcome.payment.reference.starts_with("PAY"));

    let record = store.record(&IdempotencyKey::charge(&key)).await.unwrap();
    assert_eq!(record.status, IdempotencyStatus::Completed);
    assert_eq!(record.payment_id, Some(outcome.payment.payment_id));

    let events = publisher.events_of_type("payment.succeeded");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payment_id(), outcome.payment.payment_id);
}

#[tokio::test]
async fn repeated_charge_replays_without_side_effects() {
    let store = InMemoryStore::new();
    let gateway = Arc::new(StubGateway::approving());
    let publisher = Arc::new(RecordingPublisher::new());
    let charges = orchestrator(&store, &gateway, &publisher);

    let request = ChargeRequestBuilder::new().build();
    let first = charges.charge(request.clone()).await.unwrap();
    let second = charges.charge(request).await.unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(first.payment, second.payment);

    assert_eq!(store.payment_count().await, 1);
    assert_eq!(gateway.call_count(), 1);
    assert_eq!(publisher.events().len(), 1);
}

#[tokio::test]
async fn concurrent_charges_with_shared_key_create_one_payment() {
    let store = InMemoryStore::new();
    let gateway = Arc::new(StubGateway::approving());
    let publisher = Arc::new(RecordingPublisher::new());
    let charges = Arc::new(orchestrator(&store, &gateway, &publisher));

    let request = ChargeRequestBuilder::new().with_amount(dec!(75.00)).build();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let charges = charges.clone();
        let request = request.clone();
        handles.push(tokio::spawn(async move { charges.charge(request).await }));
    }

    let mut fresh = 0;
    let mut payment_ids = Vec::new();
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        if !outcome.replayed {
            fresh += 1;
        }
        payment_ids.push(outcome.payment.payment_id);
    }

    assert_eq!(fresh, 1);
    payment_ids.dedup();
    assert_eq!(payment_ids.len(), 1);
    assert_eq!(store.payment_count().await, 1);
    assert_eq!(gateway.call_count(), 1);
}

#[tokio::test]
async fn declined_charge_settles_failed_and_conflicts_on_retry() {
    let store = InMemoryStore::new();
    let gateway = Arc::new(StubGateway::declining("Insufficient funds"));
    let publisher = Arc::new(RecordingPublisher::new());
    let charges = orchestrator(&store, &gateway, &publisher);

    let request = ChargeRequestBuilder::new().build();
    let outcome = charges.charge(request.clone()).await.unwrap();

    assert_eq!(outcome.payment.status, PaymentStatus::Failed);
    assert_eq!(
        outcome.payment.failure_reason.as_deref(),
        Some("Insufficient funds")
    );

    let record = store
        .record(&IdempotencyKey::charge(&request.idempotency_key))
        .await
        .unwrap();
    assert_eq!(record.status, IdempotencyStatus::Failed);
    assert_eq!(publisher.events_of_type("payment.failed").len(), 1);

    // A failed key is terminal; the retry needs a new key.
    let retry = charges.charge(request).await;
    assert!(matches!(retry, Err(PaymentError::Conflict(_))));
    assert_eq!(store.payment_count().await, 1);
    assert_eq!(gateway.call_count(), 1);
}

#[tokio::test]
async fn gateway_transport_error_is_a_decisive_failure() {
    let store = InMemoryStore::new();
    let gateway = Arc::new(StubGateway::approving());
    gateway.push_error("connection refused");
    let publisher = Arc::new(RecordingPublisher::new());
    let charges = orchestrator(&store, &gateway, &publisher);

    let outcome = charges
        .charge(ChargeRequestBuilder::new().build())
        .await
        .unwrap();

    assert_eq!(outcome.payment.status, PaymentStatus::Failed);
    assert!(outcome
        .payment
        .failure_reason
        .as_deref()
        .unwrap()
        .contains("connection refused"));
}

#[tokio::test]
async fn gateway_timeout_settles_failed() {
    let store = InMemoryStore::new();
    let gateway = Arc::new(StubGateway::with_delay(Duration::from_millis(200)));
    let publisher = Arc::new(RecordingPublisher::new());
    let charges = ChargeOrchestrator::with_config(
        store.clone(),
        gateway.clone(),
        publisher.clone(),
        ChargeConfig::default().gateway_timeout(Duration::from_millis(20)),
    );

    let outcome = charges
        .charge(ChargeRequestBuilder::new().build())
        .await
        .unwrap();

    assert_eq!(outcome.payment.status, PaymentStatus::Failed);
    assert_eq!(
        outcome.payment.failure_reason.as_deref(),
        Some("gateway timeout")
    );
    assert_eq!(publisher.events_of_type("payment.failed").len(), 1);
}

#[tokio::test]
async fn in_flight_key_yields_conflict() {
    let store = InMemoryStore::new();
    let gateway = Arc::new(StubGateway::approving());
    let publisher = Arc::new(RecordingPublisher::new());
    let charges = orchestrator(&store, &gateway, &publisher);

    let key = unique_key();

    // Seed a PROCESSING record, as left behind by a crashed execution.
    {
        let mut uow = store.begin().await.unwrap();
        uow.acquire_or_replay(
            &IdempotencyKey::charge(&key),
            serde_json::json!({}),
            chrono::Duration::hours(24),
        )
        .await
        .unwrap();
        uow.commit().await.unwrap();
    }

    let request = ChargeRequestBuilder::new()
        .with_idempotency_key(key)
        .build();
    let result = charges.charge(request).await;

    assert!(matches!(result, Err(PaymentError::Conflict(_))));
    assert_eq!(store.payment_count().await, 0);
    assert_eq!(gateway.call_count(), 0);
}

#[tokio::test]
async fn invalid_requests_never_touch_the_ledger() {
    let store = InMemoryStore::new();
    let gateway = Arc::new(StubGateway::approving());
    let publisher = Arc::new(RecordingPublisher::new());
    let charges = orchestrator(&store, &gateway, &publisher);

    let zero_amount = ChargeRequestBuilder::new().with_amount(dec!(0)).build();
    assert!(matches!(
        charges.charge(zero_amount).await,
        Err(PaymentError::Validation(_))
    ));

    let empty_key = ChargeRequestBuilder::new().with_idempotency_key("").build();
    assert!(matches!(
        charges.charge(empty_key).await,
        Err(PaymentError::Validation(_))
    ));

    assert_eq!(store.payment_count().await, 0);
    assert_eq!(gateway.call_count(), 0);
}

#[tokio::test]
async fn publish_failure_does_not_fail_the_charge() {
    let store = InMemoryStore::new();
    let gateway = Arc::new(StubGateway::approving());
    let publisher = Arc::new(RecordingPublisher::new());
    publisher.set_failing(true);
    let charges = orchestrator(&store, &gateway, &publisher);

    let outcome = charges
        .charge(ChargeRequestBuilder::new().build())
        .await
        .unwrap();

    assert_eq!(outcome.payment.status, PaymentStatus::Success);
    assert_eq!(store.payment_count().await, 1);
    assert!(publisher.events().is_empty());
}

#[tokio::test]
async fn get_payment_returns_view_or_not_found() {
    let store = InMemoryStore::new();
    let gateway = Arc::new(StubGateway::approving());
    let publisher = Arc::new(RecordingPublisher::new());
    let charges = orchestrator(&store, &gateway, &publisher);

    let outcome = charges
        .charge(ChargeRequestBuilder::new().build())
        .await
        .unwrap();

    let view = charges.get_payment(outcome.payment.payment_id).await.unwrap();
    assert_eq!(view, outcome.payment);

    let missing = charges.get_payment(core_kernel::PaymentId::new()).await;
    assert!(matches!(missing, Err(PaymentError::NotFound(_))));
}
