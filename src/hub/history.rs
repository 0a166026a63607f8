//! Bounded per-room message history.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use super::types::ChatMessage;

/// Fixed-capacity FIFO buffer of recent messages.
///
/// Once full, appending evicts the oldest entry. The poll transport reads
/// this buffer with [`RoomHistory::since`].
#[derive(Debug)]
pub struct RoomHistory {
    buf: VecDeque<ChatMessage>,
    capacity: usize,
}

impl RoomHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a message, evicting the oldest entry when at capacity.
    pub fn push(&mut self, message: ChatMessage) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(message);
    }

    /// Messages strictly newer than `since`, oldest first. `None` returns
    /// the whole buffer.
    pub fn since(&self, since: Option<DateTime<Utc>>) -> Vec<ChatMessage> {
        match since {
            Some(cutoff) => self
                .buf
                .iter()
                .filter(|m| m.timestamp > cutoff)
                .cloned()
                .collect(),
            None => self.buf.iter().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
