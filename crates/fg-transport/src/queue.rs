// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bounded, priority-ordered outbound message queue with eviction,
//! per-message retry counting, and in-flight tracking.

use std::collections::HashMap;
use std::time::Duration;

use fg_retry::{compute_delay, RetryConfig};

/// Priority levels for queued sends. `Ord` ranks `Critical` highest, so
/// [`SendQueue::dequeue`] can select by `max_by_key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SendPriority {
    /// Lowest priority; evicted first when the queue is full.
    Low,
    /// Default priority for application sends.
    Normal,
    /// Elevated priority (e.g. `UNSUB` on shutdown).
    High,
    /// Highest priority (e.g. heartbeat pong).
    Critical,
}

/// A message waiting to be written to the socket, or currently in flight.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    /// Queue-assigned identifier, stable across requeue.
    pub id: u64,
    /// Scheduling priority.
    pub priority: SendPriority,
    /// The already-encoded frame text to write to the socket.
    pub payload: String,
    /// Number of delivery attempts made so far.
    pub attempts: u32,
    sequence: u64,
}

/// What the caller should do after a delivery attempt fails.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Re-send right away; this was the message's first failure.
    Immediate,
    /// Wait `Duration` before the next attempt.
    Delayed(Duration),
    /// `max_retries` attempts were exhausted; the message is discarded.
    Dropped,
}

/// A bounded queue ordered by priority then insertion order, with eviction
/// of the lowest-priority, oldest entry when full.
pub struct SendQueue {
    entries: Vec<QueuedMessage>,
    in_flight: HashMap<u64, QueuedMessage>,
    capacity: usize,
    max_retries: u32,
    next_id: u64,
    next_sequence: u64,
}

impl SendQueue {
    /// A queue holding at most `capacity` pending entries (in-flight
    /// entries don't count against this bound), dropping a message after
    /// `max_retries` failed delivery attempts.
    #[must_use]
    pub fn new(capacity: usize, max_retries: u32) -> Self {
        Self {
            entries: Vec::new(),
            in_flight: HashMap::new(),
            capacity,
            max_retries,
            next_id: 0,
            next_sequence: 0,
        }
    }

    /// Add `payload` at `priority`, evicting the lowest-priority, oldest
    /// entry first if the queue is already at capacity. Returns the
    /// assigned message id.
    pub fn enqueue(&mut self, priority: SendPriority, payload: String) -> u64 {
        if self.entries.len() >= self.capacity {
            self.evict_lowest();
        }
        let id = self.next_id;
        self.next_id += 1;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.push(QueuedMessage {
            id,
            priority,
            payload,
            attempts: 0,
            sequence,
        });
        id
    }

    /// Remove and return the highest-priority, oldest-queued entry,
    /// moving it into the in-flight set.
    pub fn dequeue(&mut self) -> Option<QueuedMessage> {
        let idx = self.entries.iter().enumerate().max_by(|(_, a), (_, b)| {
            a.priority
                .cmp(&b.priority)
                .then(b.sequence.cmp(&a.sequence))
        })?.0;
        let message = self.entries.remove(idx);
        self.in_flight.insert(message.id, message.clone());
        Some(message)
    }

    /// Drop `id` from the in-flight set on confirmed delivery.
    pub fn confirm(&mut self, id: u64) {
        self.in_flight.remove(&id);
    }

    /// Record a delivery failure for the in-flight message `id`. Re-queues
    /// it at the front of its priority band unless retries are exhausted.
    pub fn fail(&mut self, id: u64) -> RetryDecision {
        let Some(mut message) = self.in_flight.remove(&id) else {
            return RetryDecision::Dropped;
        };
        message.attempts += 1;
        if message.attempts > self.max_retries {
            return RetryDecision::Dropped;
        }

        message.sequence = 0; // re-queued messages jump to the front of their priority band
        let decision = if message.attempts == 1 {
            RetryDecision::Immediate
        } else {
            RetryDecision::Delayed(compute_delay(&RetryConfig::send_queue(), message.attempts - 2))
        };
        self.entries.push(message);
        decision
    }

    /// Number of pending (not in-flight) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no entries are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Discard every pending and in-flight entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.in_flight.clear();
    }

    fn evict_lowest(&mut self) {
        if let Some((idx, _)) = self.entries.iter().enumerate().min_by(|(_, a), (_, b)| {
            a.priority
                .cmp(&b.priority)
                .then(a.sequence.cmp(&b.sequence))
        }) {
            self.entries.remove(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dequeue_prefers_higher_priority_then_fifo() {
        let mut queue = SendQueue::new(10, 3);
        queue.enqueue(SendPriority::Normal, "a".into());
        queue.enqueue(SendPriority::Critical, "b".into());
        queue.enqueue(SendPriority::Normal, "c".into());

        assert_eq!(queue.dequeue().unwrap().payload, "b");
        assert_eq!(queue.dequeue().unwrap().payload, "a");
        assert_eq!(queue.dequeue().unwrap().payload, "c");
    }

    #[test]
    fn a_full_queue_evicts_the_lowest_priority_oldest_entry() {
        let mut queue = SendQueue::new(2, 3);
        queue.enqueue(SendPriority::Low, "old".into());
        queue.enqueue(SendPriority::High, "keep".into());
        queue.enqueue(SendPriority::Normal, "new".into());

        assert_eq!(queue.len(), 2);
        let remaining: Vec<_> = (0..2).filter_map(|_| queue.dequeue()).map(|m| m.payload).collect();
        assert!(remaining.contains(&"keep".to_string()));
        assert!(remaining.contains(&"new".to_string()));
        assert!(!remaining.contains(&"old".to_string()));
    }

    #[test]
    fn the_first_failure_retries_immediately_later_ones_back_off() {
        let mut queue = SendQueue::new(10, 5);
        let id = queue.enqueue(SendPriority::Normal, "x".into());
        queue.dequeue();
        assert_eq!(queue.fail(id), RetryDecision::Immediate);

        let requeued = queue.dequeue().unwrap();
        assert_eq!(requeued.attempts, 1);
        match queue.fail(requeued.id) {
            RetryDecision::Delayed(d) => assert!(d >= Duration::from_millis(100)),
            other => panic!("expected a delayed retry, got {other:?}"),
        }
    }

    #[test]
    fn exhausting_max_retries_drops_the_message() {
        let mut queue = SendQueue::new(10, 1);
        let id = queue.enqueue(SendPriority::Normal, "x".into());
        queue.dequeue();
        assert_eq!(queue.fail(id), RetryDecision::Immediate);

        let requeued = queue.dequeue().unwrap();
        assert_eq!(queue.fail(requeued.id), RetryDecision::Dropped);
        assert!(queue.is_empty());
    }
}
