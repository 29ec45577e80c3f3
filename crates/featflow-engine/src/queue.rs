use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::messages::{EstimatorMessage, Timestamp};

struct Entry {
    ts: Timestamp,
    seq: u64,
    message: EstimatorMessage,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed so the max-heap pops the earliest (ts, seq) first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .ts
            .total_cmp(&self.ts)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-heap of messages keyed by `(timestamp, arrival)`.
///
/// Messages with equal timestamps come out in the order they were pushed.
#[derive(Default)]
pub struct MessageQueue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: EstimatorMessage) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            ts: message.ts,
            seq,
            message,
        });
    }

    pub fn pop(&mut self) -> Option<EstimatorMessage> {
        self.heap.pop().map(|entry| entry.message)
    }

    pub fn peek_ts(&self) -> Option<Timestamp> {
        self.heap.peek().map(|entry| entry.ts)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl Extend<EstimatorMessage> for MessageQueue {
    fn extend<T: IntoIterator<Item = EstimatorMessage>>(&mut self, iter: T) {
        for message in iter {
            self.push(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ControlCommand;
    use nalgebra::Vector3;

    #[test]
    fn pops_by_timestamp_then_arrival() {
        let mut queue = MessageQueue::new();
        queue.push(EstimatorMessage::inertial(2.0, Vector3::x(), Vector3::zeros()));
        queue.push(EstimatorMessage::control(1.0, ControlCommand::Reset));
        queue.push(EstimatorMessage::inertial(2.0, Vector3::y(), Vector3::zeros()));
        queue.push(EstimatorMessage::control(0.5, ControlCommand::Stop));
        assert_eq!(queue.len(), 4);
        assert_eq!(queue.peek_ts(), Some(0.5));

        let labels: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(
            labels.iter().map(|m| (m.ts, m.label())).collect::<Vec<_>>(),
            vec![(0.5, "stop"), (1.0, "reset"), (2.0, "inertial"), (2.0, "inertial")]
        );
        match (&labels[2].kind, &labels[3].kind) {
            (crate::messages::MessageKind::Inertial(a), crate::messages::MessageKind::Inertial(b)) => {
                assert_eq!(a.gyro, Vector3::x());
                assert_eq!(b.gyro, Vector3::y());
            }
            other => panic!("unexpected kinds {other:?}"),
        }
        assert!(queue.is_empty());
    }
}
