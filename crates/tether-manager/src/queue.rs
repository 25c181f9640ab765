//! Bounded outbound queue for messages sent while a link is down.
//!
//! Overflow rejects the newest message; older entries are never evicted.
//! Flushing drains in insertion order and stops at the first failed write,
//! leaving the failed message and everything after it queued.

use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;

/// Why an outbound message was not delivered or queued.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DropReason {
    /// Queueing is enabled but the queue is at capacity.
    QueueFull,
    /// The connection has no queue configured.
    QueueDisabled,
    /// No connection with that id exists.
    UnknownConnection,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::QueueFull => "queue full",
            Self::QueueDisabled => "queueing disabled",
            Self::UnknownConnection => "unknown connection",
        };
        f.write_str(text)
    }
}

/// What `send` did with a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SendOutcome {
    /// Written to the live link.
    Sent,
    /// Held for delivery on the next open.
    Queued,
    /// Discarded.
    Dropped(DropReason),
}

impl SendOutcome {
    /// Whether the message reached the live link.
    pub fn is_sent(self) -> bool {
        matches!(self, Self::Sent)
    }
}

/// Result of a [`MessageQueue::flush`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Messages written.
    pub sent: usize,
    /// Messages still queued after a failed write.
    pub remaining: usize,
}

/// FIFO of serialized outbound messages.
#[derive(Debug)]
pub struct MessageQueue {
    capacity: Option<usize>,
    items: VecDeque<String>,
}

impl MessageQueue {
    /// Queue holding at most `capacity` messages; `None` disables queueing.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            items: VecDeque::new(),
        }
    }

    /// Whether queueing is enabled.
    pub fn is_enabled(&self) -> bool {
        self.capacity.is_some()
    }

    /// Append a message, rejecting it when disabled or full.
    pub fn push(&mut self, text: String) -> Result<(), DropReason> {
        match self.capacity {
            None => Err(DropReason::QueueDisabled),
            Some(capacity) if self.items.len() >= capacity => Err(DropReason::QueueFull),
            Some(_) => {
                self.items.push_back(text);
                Ok(())
            }
        }
    }

    /// Drain through `write`, oldest first, stopping at the first error.
    pub fn flush<E>(&mut self, mut write: impl FnMut(&str) -> Result<(), E>) -> FlushReport {
        let mut report = FlushReport::default();
        while let Some(front) = self.items.front() {
            if write(front).is_err() {
                break;
            }
            let _ = self.items.pop_front();
            report.sent += 1;
        }
        report.remaining = self.items.len();
        report
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Discard everything queued.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_queue_rejects() {
        let mut q = MessageQueue::new(None);
        assert!(!q.is_enabled());
        assert_eq!(q.push("m".into()), Err(DropReason::QueueDisabled));
        assert!(q.is_empty());
    }

    #[test]
    fn full_queue_rejects_newest() {
        let mut q = MessageQueue::new(Some(2));
        q.push("m1".into()).unwrap();
        q.push("m2".into()).unwrap();
        assert_eq!(q.push("m3".into()), Err(DropReason::QueueFull));

        let mut seen = Vec::new();
        let report = q.flush(|m| {
            seen.push(m.to_owned());
            Ok::<(), ()>(())
        });
        assert_eq!(seen, vec!["m1", "m2"]);
        assert_eq!(report, FlushReport { sent: 2, remaining: 0 });
    }

    #[test]
    fn zero_capacity_is_always_full() {
        let mut q = MessageQueue::new(Some(0));
        assert!(q.is_enabled());
        assert_eq!(q.push("m".into()), Err(DropReason::QueueFull));
    }

    #[test]
    fn flush_stops_at_failure_and_keeps_order() {
        let mut q = MessageQueue::new(Some(10));
        for m in ["m1", "m2", "m3", "m4"] {
            q.push(m.into()).unwrap();
        }

        let mut writes = 0;
        let report = q.flush(|_| {
            writes += 1;
            if writes == 3 { Err(()) } else { Ok(()) }
        });
        assert_eq!(report, FlushReport { sent: 2, remaining: 2 });

        let mut rest = Vec::new();
        let _ = q.flush(|m| {
            rest.push(m.to_owned());
            Ok::<(), ()>(())
        });
        assert_eq!(rest, vec!["m3", "m4"]);
        assert!(q.is_empty());
    }

    #[test]
    fn clear_empties() {
        let mut q = MessageQueue::new(Some(3));
        q.push("a".into()).unwrap();
        q.clear();
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn outcome_display_and_flags() {
        assert!(SendOutcome::Sent.is_sent());
        assert!(!SendOutcome::Queued.is_sent());
        assert_eq!(DropReason::QueueFull.to_string(), "queue full");
    }
}
