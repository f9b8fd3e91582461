use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use event_listener::{Event, EventListener};

use crate::epoch::Epoch;

const DEFAULT_EVENT_ORDERING: Ordering = Ordering::SeqCst;

/// Store change publisher. Carries the store epoch of the latest committed
/// change; listeners compare against the last epoch they drained.
#[derive(Debug)]
pub struct EventPublisher {
    change: AtomicI64,
    event: Event,
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self {
            change: AtomicI64::new(0),
            event: Event::new(),
        }
    }
}

impl EventPublisher {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn current_change(&self) -> i64 {
        self.change.load(DEFAULT_EVENT_ORDERING)
    }

    pub fn listen(&self) -> EventListener {
        self.event.listen()
    }

    /// record a committed store change and wake all listeners
    pub fn store_change(&self, epoch: Epoch) {
        self.change.store(epoch, DEFAULT_EVENT_ORDERING);
        self.event.notify(usize::MAX);
    }
}

/// one-shot notification, set once and observed by any number of waiters
#[derive(Debug)]
pub struct SimpleEvent {
    flag: std::sync::atomic::AtomicBool,
    event: Event,
}

impl SimpleEvent {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self {
            flag: std::sync::atomic::AtomicBool::new(false),
            event: Event::new(),
        })
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(DEFAULT_EVENT_ORDERING)
    }

    pub async fn listen(&self) {
        if self.is_set() {
            return;
        }

        let listener = self.event.listen();

        if self.is_set() {
            return;
        }

        listener.await
    }

    pub fn notify(&self) {
        self.flag.store(true, DEFAULT_EVENT_ORDERING);
        self.event.notify(usize::MAX);
    }
}
