use std::collections::hash_map::Entry;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};
use crate::message::Message;
use crate::sequence_id::SequenceId;

/// Holds ordered messages of a single (connection, message type) pair that arrived ahead of
///  their predecessors.
///
/// The buffer is only ever drained starting at `next_expected`, so pending messages are keyed
///  by id.
pub struct ReorderBuffer {
    next_expected: SequenceId,
    pending: FxHashMap<SequenceId, Message>,
}

impl Default for ReorderBuffer {
    fn default() -> Self {
        ReorderBuffer::starting_at(SequenceId::ZERO)
    }
}

impl ReorderBuffer {
    pub fn starting_at(next_expected: SequenceId) -> ReorderBuffer {
        ReorderBuffer {
            next_expected,
            pending: Default::default(),
        }
    }

    pub fn next_expected(&self) -> SequenceId {
        self.next_expected
    }

    pub fn num_pending(&self) -> usize {
        self.pending.len()
    }

    /// Adds a message to the buffer and returns the (possibly empty) run of messages that can be
    ///  delivered now, in sequence.
    ///
    /// Every id that is newer than `next_expected` is buffered, i.e. the window is half the id
    ///  space. Ids that are not newer were delivered before.
    pub fn admit(&mut self, message: Message) -> Vec<Message> {
        let id = message.sequence_id();

        if self.next_expected.is_newer_than(id) {
            debug!("ordered message {} was delivered before (next expected is {}) - dropping", id, self.next_expected);
            return Vec::new();
        }

        match self.pending.entry(id) {
            Entry::Occupied(_) => {
                debug!("ordered message {} is already buffered - dropping duplicate", id);
                return Vec::new();
            }
            Entry::Vacant(e) => {
                e.insert(message);
            }
        }

        let mut run = Vec::new();
        while let Some(message) = self.pending.remove(&self.next_expected) {
            run.push(message);
            self.next_expected = self.next_expected.next();
        }

        if run.is_empty() {
            trace!("buffering ordered message {}, waiting for {}", id, self.next_expected);
        }
        run
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageType, Mode};
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use rstest::rstest;

    fn msg(id: u16) -> Message {
        let mut result = Message::new(MessageType(1), Mode::ORDERED, vec![]);
        result.header.sequence_id = SequenceId::from_raw(id);
        result
    }

    fn ids(messages: &[Message]) -> Vec<u16> {
        messages.iter()
            .map(|m| m.sequence_id().to_raw())
            .collect()
    }

    #[rstest]
    #[case::in_order(vec![0, 1, 2], vec![vec![0], vec![1], vec![2]])]
    #[case::reversed(vec![2, 1, 0], vec![vec![], vec![], vec![0, 1, 2]])]
    #[case::gap_filled_in_middle(vec![0, 2, 3, 1, 4], vec![vec![0], vec![], vec![], vec![1, 2, 3], vec![4]])]
    #[case::duplicate_pending(vec![1, 1, 0], vec![vec![], vec![], vec![0, 1]])]
    #[case::duplicate_delivered(vec![0, 0, 1], vec![vec![0], vec![], vec![1]])]
    #[case::far_ahead(vec![8, 0, 7], vec![vec![], vec![0], vec![]])]
    #[case::delivered_long_ago(vec![0, 1, 0, 1], vec![vec![0], vec![1], vec![], vec![]])]
    fn test_admit(#[case] arrivals: Vec<u16>, #[case] expected: Vec<Vec<u16>>) {
        let mut buffer = ReorderBuffer::default();

        for (id, expected) in arrivals.into_iter().zip(expected) {
            assert_eq!(ids(&buffer.admit(msg(id))), expected, "admitting {}", id);
        }
    }

    #[test]
    fn test_admit_across_wraparound() {
        let mut buffer = ReorderBuffer::starting_at(SequenceId::from_raw(u16::MAX - 1));

        assert!(buffer.admit(msg(1)).is_empty());
        assert!(buffer.admit(msg(0)).is_empty());
        assert_eq!(ids(&buffer.admit(msg(u16::MAX))), Vec::<u16>::new());
        assert_eq!(ids(&buffer.admit(msg(u16::MAX - 1))), vec![u16::MAX - 1, u16::MAX, 0, 1]);
        assert_eq!(buffer.next_expected(), SequenceId::from_raw(2));
        assert_eq!(buffer.num_pending(), 0);
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    #[case(4)]
    fn test_admit_any_permutation(#[case] seed: u64) {
        let mut arrivals = (0..100u16).collect::<Vec<_>>();
        arrivals.shuffle(&mut StdRng::seed_from_u64(seed));

        let mut buffer = ReorderBuffer::default();
        let mut delivered = Vec::new();
        for id in arrivals {
            delivered.extend(ids(&buffer.admit(msg(id))));
        }

        assert_eq!(delivered, (0..100u16).collect::<Vec<_>>());
        assert_eq!(buffer.num_pending(), 0);
    }

    #[rstest]
    #[case::short(9)]
    #[case::long(1500)]
    #[case::very_long(20000)]
    fn test_admit_reversed(#[case] len: u16) {
        let mut buffer = ReorderBuffer::default();

        for id in (1..len).rev() {
            assert!(buffer.admit(msg(id)).is_empty(), "admitting {}", id);
        }
        assert_eq!(buffer.num_pending(), len as usize - 1);

        assert_eq!(ids(&buffer.admit(msg(0))), (0..len).collect::<Vec<_>>());
        assert_eq!(buffer.next_expected(), SequenceId::from_raw(len));
        assert_eq!(ids(&buffer.admit(msg(len))), vec![len]);
    }
}
