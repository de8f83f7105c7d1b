use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// FIFO of decrypted inbound payloads waiting for the application.
#[derive(Debug, Default)]
pub struct InboundQueue {
    items: Mutex<VecDeque<String>>,
}

impl InboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, item: String) {
        self.lock().push_back(item);
    }

    /// Oldest item, or `None` when empty. Never blocks on an empty queue.
    pub fn pop(&self) -> Option<String> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
