use std::sync::{Mutex, PoisonError};

use tokio::sync::Notify;

/// One-slot notification carrying the sample that crossed a bound.
///
/// The monitor arms it at most once per cycle and releases it at the start of
/// the next one, so an unconsumed arm never outlives its cycle.
#[derive(Debug, Default)]
pub struct ThresholdEvent {
    value: Mutex<Option<f64>>,
    notify: Notify,
}

impl ThresholdEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: f64) {
        *self.slot() = Some(value);
        self.notify.notify_waiters();
    }

    pub fn release(&self) {
        *self.slot() = None;
    }

    pub fn is_set(&self) -> bool {
        self.slot().is_some()
    }

    pub fn peek(&self) -> Option<f64> {
        *self.slot()
    }

    pub fn take(&self) -> Option<f64> {
        self.slot().take()
    }

    /// Waits for the next arm and consumes it.
    pub async fn wait(&self) -> f64 {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(value) = self.take() {
                return value;
            }
            notified.await;
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<f64>> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
