//! Bounded FIFO of the most recent messages for one topic.
//!
//! Appends go to the tail; once the capacity is exceeded the head is evicted.
//! Order is broker arrival order.

use std::collections::VecDeque;
use std::sync::Arc;

use super::Message;

#[derive(Debug)]
pub struct ReplayBuffer {
    messages: VecDeque<Arc<Message>>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, message: Arc<Message>) {
        self.messages.push_back(message);
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
    }

    /// The last `n` messages, oldest first. Fewer when not enough are buffered.
    pub fn last_n(&self, n: usize) -> Vec<Arc<Message>> {
        let skip = self.messages.len().saturating_sub(n);
        self.messages.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
