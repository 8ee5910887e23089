//! Recording event publisher
//!
//! Captures published events in memory instead of delivering them, and
//! can be switched into a failing mode to verify that publication
//! failures never undo a committed transition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use domain_payment::events::{EventError, EventPublisher, PaymentEvent};

/// Publisher that records events for later assertions
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<PaymentEvent>>,
    failing: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events published so far, in order
    pub fn events(&self) -> Vec<PaymentEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Events with the given routing key
    pub fn events_of_type(&self, event_type: &str) -> Vec<PaymentEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }

    /// Makes every subsequent publish fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &PaymentEvent) -> Result<(), EventError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EventError::PublishFailed("broker down".to_string()));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
