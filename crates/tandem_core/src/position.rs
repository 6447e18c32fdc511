//! Sparse position key allocation.
//!
//! # Responsibility
//! - Compute new ordering keys from neighbor positions, without I/O.
//! - Signal exhaustion explicitly instead of producing colliding keys.
//!
//! # Invariants
//! - Allocated keys are strictly between the given bounds.
//! - Arithmetic is integer-only; midpoints are computed in 128-bit width
//!   so no input pair can overflow.
//! - Boundary allocations stay inside `[POSITION_FLOOR, POSITION_CEIL]`;
//!   values outside that band are reserved for transient storage states.

/// Spacing used for tail/head insertion and rebalancing. Large enough for
/// roughly twenty midpoint bisections between fresh neighbors before a
/// rebalance becomes necessary.
pub const POSITION_GAP: i64 = 1_000_000;

/// Position assigned to the first task of an empty column.
pub const FIRST_POSITION: i64 = 0;

/// Lowest key a head insertion may produce. Keys below the floor never
/// come out of the allocator, which leaves the sub-floor band free for
/// the rebalancer's intermediate parking writes.
pub const POSITION_FLOOR: i64 = i64::MIN / 2;

/// Highest key a tail insertion may produce.
pub const POSITION_CEIL: i64 = i64::MAX / 2;

/// Allocation outcome.
///
/// `Exhausted` means no usable integer exists for the requested slot; the
/// caller is expected to rebalance the column and retry once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allocation {
    /// Usable position key, strictly between the given bounds.
    At(i64),
    /// No integer fits between the bounds.
    Exhausted,
}

impl Allocation {
    /// Returns the allocated key, if any.
    pub fn position(self) -> Option<i64> {
        match self {
            Self::At(value) => Some(value),
            Self::Exhausted => None,
        }
    }
}

/// Computes a position key for the slot described by `left` and `right`
/// neighbor positions. Absent neighbors mean a column boundary.
///
/// - both absent: empty column, [`FIRST_POSITION`].
/// - only `left`: tail insertion at `left + POSITION_GAP`.
/// - only `right`: head insertion at `right - POSITION_GAP`.
/// - both present: integer midpoint, exhausted when `right - left <= 1`.
///
/// Pure function of its inputs; performs no I/O.
pub fn allocate(left: Option<i64>, right: Option<i64>) -> Allocation {
    match (left, right) {
        (None, None) => Allocation::At(FIRST_POSITION),
        (Some(left), None) => match left.checked_add(POSITION_GAP) {
            Some(value) if value <= POSITION_CEIL => Allocation::At(value),
            _ => Allocation::Exhausted,
        },
        (None, Some(right)) => match right.checked_sub(POSITION_GAP) {
            Some(value) if value >= POSITION_FLOOR => Allocation::At(value),
            _ => Allocation::Exhausted,
        },
        (Some(left), Some(right)) => midpoint(left, right),
    }
}

/// Position assigned to the task at `rank` (0-based) by a rebalance pass.
pub fn rebalanced_position(rank: i64) -> i64 {
    rank * POSITION_GAP
}

fn midpoint(left: i64, right: i64) -> Allocation {
    let width = i128::from(right) - i128::from(left);
    if width <= 1 {
        return Allocation::Exhausted;
    }
    // Strictly between the bounds, so the result always fits back in i64.
    let value = i128::from(left) + width / 2;
    Allocation::At(value as i64)
}

#[cfg(test)]
mod tests {
    use super::{
        allocate, rebalanced_position, Allocation, FIRST_POSITION, POSITION_CEIL, POSITION_FLOOR,
        POSITION_GAP,
    };

    #[test]
    fn empty_column_starts_at_zero() {
        assert_eq!(allocate(None, None), Allocation::At(FIRST_POSITION));
    }

    #[test]
    fn tail_insertion_steps_by_gap() {
        assert_eq!(allocate(Some(0), None), Allocation::At(POSITION_GAP));
        assert_eq!(
            allocate(Some(3 * POSITION_GAP), None),
            Allocation::At(4 * POSITION_GAP)
        );
    }

    #[test]
    fn head_insertion_goes_negative() {
        assert_eq!(allocate(None, Some(0)), Allocation::At(-POSITION_GAP));
        assert_eq!(
            allocate(None, Some(-POSITION_GAP)),
            Allocation::At(-2 * POSITION_GAP)
        );
    }

    #[test]
    fn midpoint_splits_the_gap() {
        assert_eq!(
            allocate(Some(0), Some(POSITION_GAP)),
            Allocation::At(POSITION_GAP / 2)
        );
        assert_eq!(allocate(Some(-10), Some(10)), Allocation::At(0));
        assert_eq!(allocate(Some(0), Some(3)), Allocation::At(1));
    }

    #[test]
    fn adjacent_bounds_are_exhausted() {
        assert_eq!(allocate(Some(0), Some(1)), Allocation::Exhausted);
        assert_eq!(allocate(Some(41), Some(42)), Allocation::Exhausted);
        assert_eq!(allocate(Some(5), Some(5)), Allocation::Exhausted);
        assert_eq!(allocate(Some(7), Some(3)), Allocation::Exhausted);
    }

    #[test]
    fn extreme_bounds_do_not_overflow() {
        assert_eq!(
            allocate(Some(i64::MIN), Some(i64::MAX)),
            Allocation::At(-1)
        );
        assert_eq!(allocate(Some(i64::MAX - 2), Some(i64::MAX)), Allocation::At(i64::MAX - 1));
    }

    #[test]
    fn boundary_insertions_respect_the_band() {
        assert_eq!(allocate(Some(POSITION_CEIL), None), Allocation::Exhausted);
        assert_eq!(
            allocate(Some(POSITION_CEIL - POSITION_GAP), None),
            Allocation::At(POSITION_CEIL)
        );
        assert_eq!(allocate(None, Some(POSITION_FLOOR)), Allocation::Exhausted);
        assert_eq!(
            allocate(None, Some(POSITION_FLOOR + POSITION_GAP)),
            Allocation::At(POSITION_FLOOR)
        );
        assert_eq!(allocate(Some(i64::MAX), None), Allocation::Exhausted);
        assert_eq!(allocate(None, Some(i64::MIN)), Allocation::Exhausted);
    }

    #[test]
    fn rebalanced_positions_are_gap_multiples() {
        assert_eq!(rebalanced_position(0), 0);
        assert_eq!(rebalanced_position(1), POSITION_GAP);
        assert_eq!(rebalanced_position(5), 5 * POSITION_GAP);
    }

    #[test]
    fn allocation_position_accessor() {
        assert_eq!(Allocation::At(7).position(), Some(7));
        assert_eq!(Allocation::Exhausted.position(), None);
    }
}
