use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Level-triggered wake-up for the control loop.
///
/// Any number of `set` calls before the loop observes the flag collapse into
/// one pass. The flag stays up until the loop clears it after that pass.
#[derive(Debug, Default)]
pub struct ReevaluateSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl ReevaluateSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.flag.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn clear(&self) {
        self.flag.store(false, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Resolves once the flag is up. Returns immediately if it already is.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent `set` is not missed.
            notified.as_mut().enable();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}
