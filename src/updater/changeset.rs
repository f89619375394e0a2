//! Changeset - Edit script between two ordered item lists.
//!
//! # Algorithm
//!
//! 1. Pair every new item with the first unpaired old item it equals
//! 2. Unpaired old items are deletions (old coordinates)
//! 3. Unpaired new items are insertions (new coordinates)
//! 4. Paired items whose old positions lie on the longest increasing run stay
//!    put; every other pair is a move (old → new)
//!
//! Only an equality predicate is available, so pairing is quadratic.

bitflags::bitflags! {
    /// Kinds of structural change a reconciliation performed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Changes: u8 {
        const NONE = 0;
        const INSERT = 1 << 0;
        const DELETE = 1 << 1;
        const MOVE = 1 << 2;
        const RELOAD = 1 << 3;
    }
}

/// Structural operations that turn `old` into `new`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Changeset {
    /// Positions in the old list that disappear.
    pub deleted: Vec<usize>,
    /// Positions in the new list that appear.
    pub inserted: Vec<usize>,
    /// `(old position, new position)` for items that change order.
    pub moved: Vec<(usize, usize)>,
}

impl Changeset {
    /// Compute the changeset between two lists.
    pub fn compute<T>(old: &[T], new: &[T], is_equal: &dyn Fn(&T, &T) -> bool) -> Self {
        let mut paired_old = vec![false; old.len()];
        // (old position, new position), in new order
        let mut pairs: Vec<(usize, usize)> = Vec::with_capacity(new.len());
        let mut inserted = Vec::new();

        for (new_pos, item) in new.iter().enumerate() {
            let found = old
                .iter()
                .enumerate()
                .position(|(old_pos, candidate)| !paired_old[old_pos] && is_equal(candidate, item));

            match found {
                Some(old_pos) => {
                    paired_old[old_pos] = true;
                    pairs.push((old_pos, new_pos));
                }
                None => inserted.push(new_pos),
            }
        }

        let deleted = paired_old
            .iter()
            .enumerate()
            .filter(|(_, paired)| !**paired)
            .map(|(old_pos, _)| old_pos)
            .collect();

        let old_order: Vec<usize> = pairs.iter().map(|(old_pos, _)| *old_pos).collect();
        let stable = stable_positions(&old_order);

        let moved = pairs
            .into_iter()
            .zip(stable)
            .filter(|(_, stays)| !stays)
            .map(|(pair, _)| pair)
            .collect();

        Self {
            deleted,
            inserted,
            moved,
        }
    }

    /// True if applying the changeset would change nothing.
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.inserted.is_empty() && self.moved.is_empty()
    }

    /// Total number of structural operations.
    pub fn len(&self) -> usize {
        self.deleted.len() + self.inserted.len() + self.moved.len()
    }

    /// Summary of which kinds of operation are present.
    pub fn changes(&self) -> Changes {
        let mut changes = Changes::NONE;
        if !self.inserted.is_empty() {
            changes |= Changes::INSERT;
        }
        if !self.deleted.is_empty() {
            changes |= Changes::DELETE;
        }
        if !self.moved.is_empty() {
            changes |= Changes::MOVE;
        }
        changes
    }
}

/// Mark the members of one longest strictly increasing subsequence.
fn stable_positions(seq: &[usize]) -> Vec<bool> {
    // tails[k] = index into seq of the smallest tail of an increasing run of length k + 1
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; seq.len()];

    for (i, &value) in seq.iter().enumerate() {
        let pos = tails.partition_point(|&t| seq[t] < value);
        if pos > 0 {
            prev[i] = Some(tails[pos - 1]);
        }
        if pos == tails.len() {
            tails.push(i);
        } else {
            tails[pos] = i;
        }
    }

    let mut stable = vec![false; seq.len()];
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        stable[i] = true;
        cursor = prev[i];
    }
    stable
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eq(a: &&str, b: &&str) -> bool {
        a == b
    }

    #[test]
    fn test_identical_lists_are_empty() {
        let set = Changeset::compute(&["a", "b", "c"], &["a", "b", "c"], &eq);
        assert!(set.is_empty());
        assert_eq!(set.changes(), Changes::NONE);
    }

    #[test]
    fn test_insert_and_delete() {
        let set = Changeset::compute(&["a", "b", "c"], &["a", "c", "d"], &eq);
        assert_eq!(set.deleted, vec![1]);
        assert_eq!(set.inserted, vec![2]);
        assert!(set.moved.is_empty());
        assert_eq!(set.changes(), Changes::INSERT | Changes::DELETE);
    }

    #[test]
    fn test_swap_is_single_move() {
        let set = Changeset::compute(&["a", "b", "c"], &["a", "c", "b", "d"], &eq);
        assert!(set.deleted.is_empty());
        assert_eq!(set.inserted, vec![3]);
        assert_eq!(set.moved.len(), 1, "one of b/c should move, the other stays");
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_rotation_moves_one_item() {
        let set = Changeset::compute(&["x", "y", "z"], &["y", "z", "x"], &eq);
        assert_eq!(set.moved, vec![(0, 2)]);
    }

    #[test]
    fn test_duplicates_pair_in_order() {
        let set = Changeset::compute(&["a", "a", "b"], &["a", "a", "b"], &eq);
        assert!(set.is_empty(), "equal duplicates should pair without moves");
    }

    #[test]
    fn test_custom_equality_ignores_payload() {
        let old = [(1, "old"), (2, "old")];
        let new = [(1, "new"), (2, "new")];
        let by_id = |a: &(i32, &str), b: &(i32, &str)| a.0 == b.0;
        assert!(Changeset::compute(&old, &new, &by_id).is_empty());
    }

    #[test]
    fn test_stable_positions_marks_longest_run() {
        let stable = stable_positions(&[3, 0, 1, 4, 2]);
        assert_eq!(stable, vec![false, true, true, false, true]);
    }

    #[test]
    fn test_empty_to_full_and_back() {
        let set = Changeset::compute(&[], &["a", "b"], &eq);
        assert_eq!(set.inserted, vec![0, 1]);

        let set = Changeset::compute(&["a", "b"], &[], &eq);
        assert_eq!(set.deleted, vec![0, 1]);
    }
}
