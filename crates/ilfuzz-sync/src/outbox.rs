//! Bounded per-connection send queue (spec §5 "Backpressure. The sync
//! outbox is bounded; on overflow oldest non-crash messages are dropped
//! (crashes are never dropped)").

use std::collections::VecDeque;

use crate::protocol::Message;

#[derive(Debug)]
pub struct Outbox {
    capacity: usize,
    queue: VecDeque<Message>,
}

impl Outbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Enqueues `message`. If the queue is at capacity and `message` is not
    /// a crash report, the oldest non-crash entry is dropped to make room;
    /// crash reports are always enqueued even past capacity.
    pub fn push(&mut self, message: Message) {
        let is_crash = matches!(message, Message::Crash { .. });
        if !is_crash && self.queue.len() >= self.capacity {
            if let Some(pos) = self.queue.iter().position(|m| !matches!(m, Message::Crash { .. })) {
                self.queue.remove(pos);
                tracing::warn!("sync outbox at capacity, dropped oldest non-crash message");
            }
        }
        self.queue.push_back(message);
    }

    pub fn pop(&mut self) -> Option<Message> {
        self.queue.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_drops_oldest_non_crash() {
        let mut outbox = Outbox::new(2);
        outbox.push(Message::CorpusSample(vec![1]));
        outbox.push(Message::CorpusSample(vec![2]));
        outbox.push(Message::CorpusSample(vec![3]));
        assert_eq!(outbox.len(), 2);
        assert_eq!(outbox.pop(), Some(Message::CorpusSample(vec![2])));
        assert_eq!(outbox.pop(), Some(Message::CorpusSample(vec![3])));
    }

    #[test]
    fn crashes_are_never_dropped() {
        let mut outbox = Outbox::new(1);
        outbox.push(Message::Crash {
            program: vec![1],
            stderr: vec![],
            signal: 11,
        });
        outbox.push(Message::Crash {
            program: vec![2],
            stderr: vec![],
            signal: 6,
        });
        assert_eq!(outbox.len(), 2);
    }
}
