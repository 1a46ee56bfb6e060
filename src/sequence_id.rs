use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// A 16 bit message id that wraps around after `u16::MAX`.
///
/// Ids are compared circularly: if two raw values are less than half the id space apart, they are
///  compared numerically; otherwise the numerically smaller id is considered newer because it
///  wrapped around. This is correct as long as ids that are compared are never more than half the
///  id space apart in 'real' time.
///
/// NB: There is no `Ord` impl - circular comparison is not transitive across the whole id space.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct SequenceId(u16);

impl Display for SequenceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SequenceId {
    pub const ZERO: SequenceId = SequenceId(0);

    const HALF_RANGE: i32 = 1 << 15;

    pub fn from_raw(value: u16) -> Self {
        Self(value)
    }

    pub fn to_raw(&self) -> u16 {
        self.0
    }

    pub fn next(self) -> SequenceId {
        SequenceId(self.0.wrapping_add(1))
    }

    pub fn compare(self, other: SequenceId) -> Ordering {
        let diff = self.0 as i32 - other.0 as i32;
        let numeric = self.0.cmp(&other.0);

        if diff.abs() < Self::HALF_RANGE {
            numeric
        }
        else {
            numeric.reverse()
        }
    }

    /// the length of the shorter arc between two ids, i.e. a value between 0 and 2^15
    pub fn distance(self, other: SequenceId) -> u16 {
        let forward = self.0.wrapping_sub(other.0);
        forward.min(forward.wrapping_neg())
    }

    pub fn is_newer_than(self, other: SequenceId) -> bool {
        self.compare(other) == Ordering::Greater
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::equal(5, 5, Ordering::Equal)]
    #[case::simple_less(1, 2, Ordering::Less)]
    #[case::simple_greater(200, 100, Ordering::Greater)]
    #[case::zero_max(0, u16::MAX, Ordering::Greater)]
    #[case::max_zero(u16::MAX, 0, Ordering::Less)]
    #[case::wrapped_by_a_few(3, 65530, Ordering::Greater)]
    #[case::just_below_half(0, 32767, Ordering::Less)]
    #[case::exactly_half(0, 32768, Ordering::Greater)]
    #[case::exactly_half_reversed(32768, 0, Ordering::Less)]
    #[case::just_above_half(0, 32769, Ordering::Greater)]
    fn test_compare(#[case] a: u16, #[case] b: u16, #[case] expected: Ordering) {
        assert_eq!(SequenceId::from_raw(a).compare(SequenceId::from_raw(b)), expected);
    }

    #[test]
    fn test_compare_antisymmetric() {
        for a in (0..=u16::MAX).step_by(251) {
            for offset in [1u16, 2, 100, 1000, 32767] {
                let a = SequenceId::from_raw(a);
                let b = SequenceId::from_raw(a.to_raw().wrapping_add(offset));

                assert_eq!(b.compare(a), Ordering::Greater, "{} vs {}", b, a);
                assert_eq!(a.compare(b), Ordering::Less, "{} vs {}", a, b);
                assert_eq!(a.distance(b), offset);
                assert_eq!(b.distance(a), offset);
            }
        }
    }

    #[rstest]
    #[case(0, 0, 0)]
    #[case(1, 5, 4)]
    #[case(5, 1, 4)]
    #[case(0, u16::MAX, 1)]
    #[case(u16::MAX, 0, 1)]
    #[case(65530, 3, 9)]
    #[case(0, 32768, 32768)]
    #[case(0, 40000, 25536)]
    fn test_distance(#[case] a: u16, #[case] b: u16, #[case] expected: u16) {
        assert_eq!(SequenceId::from_raw(a).distance(SequenceId::from_raw(b)), expected);
    }

    #[test]
    fn test_next_wraps_around() {
        assert_eq!(SequenceId::from_raw(u16::MAX).next(), SequenceId::ZERO);
        assert_eq!(SequenceId::ZERO.next(), SequenceId::from_raw(1));

        let mut id = SequenceId::ZERO;
        for _ in 0..=u16::MAX {
            let next = id.next();
            assert!(next.is_newer_than(id));
            id = next;
        }
        assert_eq!(id, SequenceId::ZERO);
    }
}
