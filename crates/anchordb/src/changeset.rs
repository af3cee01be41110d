//! Index-level diffs between two observed states of a live collection.
//!
//! Keys are matched by identity, not position. A list may hold the same
//! row twice, so the n-th occurrence of a key in the old sequence is
//! matched with the n-th occurrence in the new one.
//!
//! Index conventions:
//! - `deletions`: positions in the old sequence.
//! - `insertions`: positions in the new sequence.
//! - `modifications`: positions in the new sequence; `old_modifications`
//!   holds the same rows' old positions.
//! - `moves`: `(from, to)` positions in the old and new sequences with
//!   deleted and inserted keys removed.

use crate::notify::Notification;
use anchordb_engine::RowKey;
use std::collections::HashMap;

/// Above this many reordered keys, move detection falls back from the
/// quadratic weighted search to a plain longest increasing subsequence.
const WEIGHTED_MOVE_LIMIT: usize = 1024;

/// One key that changed position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move {
    /// Position among surviving keys of the old sequence.
    pub from: usize,
    /// Position among surviving keys of the new sequence.
    pub to: usize,
}

/// Difference between two consecutive states of a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    insertions: Vec<usize>,
    deletions: Vec<usize>,
    modifications: Vec<usize>,
    old_modifications: Vec<usize>,
    moves: Vec<Move>,
}

type Label = (RowKey, usize);

fn label(keys: &[RowKey]) -> Vec<Label> {
    let mut seen: HashMap<RowKey, usize> = HashMap::new();
    keys.iter()
        .map(|key| {
            let n = seen.entry(*key).or_insert(0);
            *n += 1;
            (*key, *n)
        })
        .collect()
}

impl ChangeSet {
    /// Diffs `old` against `new`. `modified` reports whether a key present
    /// in both sequences has a changed row.
    pub fn compute(old: &[RowKey], new: &[RowKey], mut modified: impl FnMut(RowKey) -> bool) -> Self {
        let old_labels = label(old);
        let new_labels = label(new);
        let old_index: HashMap<Label, usize> =
            old_labels.iter().enumerate().map(|(i, l)| (*l, i)).collect();
        let new_index: HashMap<Label, usize> =
            new_labels.iter().enumerate().map(|(i, l)| (*l, i)).collect();

        let mut changes = Self::default();

        // Surviving keys in old order, remembering their old positions.
        let mut survivor_of: HashMap<Label, usize> = HashMap::new();
        let mut survivor_old_pos = Vec::new();
        for (i, l) in old_labels.iter().enumerate() {
            if new_index.contains_key(l) {
                survivor_of.insert(*l, survivor_old_pos.len());
                survivor_old_pos.push(i);
            } else {
                changes.deletions.push(i);
            }
        }

        // Surviving keys in new order, as positions into the old order.
        let mut sequence = Vec::with_capacity(survivor_old_pos.len());
        let mut survivor_new_pos = Vec::with_capacity(survivor_old_pos.len());
        for (j, l) in new_labels.iter().enumerate() {
            if old_index.contains_key(l) {
                sequence.push(survivor_of[l]);
                survivor_new_pos.push(j);
            } else {
                changes.insertions.push(j);
            }
        }

        let stable = stable_positions(&sequence);
        for (to, from) in sequence.iter().enumerate() {
            if !stable[to] {
                changes.moves.push(Move { from: *from, to });
            }
            if modified(new_labels[survivor_new_pos[to]].0) {
                changes.modifications.push(survivor_new_pos[to]);
                changes.old_modifications.push(survivor_old_pos[*from]);
            }
        }
        changes.old_modifications.sort_unstable();
        changes
    }

    /// Positions in the new sequence holding keys the old one lacked.
    #[must_use]
    pub fn insertions(&self) -> &[usize] {
        &self.insertions
    }

    /// Positions in the old sequence whose keys are gone.
    #[must_use]
    pub fn deletions(&self) -> &[usize] {
        &self.deletions
    }

    /// Positions in the new sequence whose rows changed.
    #[must_use]
    pub fn modifications(&self) -> &[usize] {
        &self.modifications
    }

    /// Old positions of the rows reported in [`ChangeSet::modifications`].
    #[must_use]
    pub fn old_modifications(&self) -> &[usize] {
        &self.old_modifications
    }

    /// Keys that changed position, in surviving-key coordinates.
    #[must_use]
    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty()
            && self.deletions.is_empty()
            && self.modifications.is_empty()
            && self.moves.is_empty()
    }

    /// Rebuilds the new sequence from `old`, taking inserted items from
    /// `new`.
    ///
    /// Deletions are applied first (by old position), then moves among the
    /// surviving items, then insertions in ascending new position.
    #[must_use]
    pub fn apply<T: Clone>(&self, old: &[T], new: &[T]) -> Vec<T> {
        let mut items: Vec<T> = old
            .iter()
            .enumerate()
            .filter(|(i, _)| self.deletions.binary_search(i).is_err())
            .map(|(_, item)| item.clone())
            .collect();

        if !self.moves.is_empty() {
            let mut slots: Vec<Option<T>> = vec![None; items.len()];
            let mut moved = vec![false; items.len()];
            for mv in &self.moves {
                if let (Some(slot), Some(item)) = (slots.get_mut(mv.to), items.get(mv.from)) {
                    *slot = Some(item.clone());
                    moved[mv.from] = true;
                }
            }
            let mut rest = items
                .into_iter()
                .enumerate()
                .filter(|(i, _)| !moved[*i])
                .map(|(_, item)| item);
            items = slots
                .into_iter()
                .filter_map(|slot| slot.or_else(|| rest.next()))
                .collect();
        }

        for &j in &self.insertions {
            if let Some(item) = new.get(j) {
                items.insert(j.min(items.len()), item.clone());
            }
        }
        items
    }
}

/// Marks which entries of `sequence` (a permutation of `0..n`) stay put.
///
/// Entries already at their old index always stay, so no move ever has
/// `from == to`. Between two such fixed entries the kept entries form a
/// longest increasing run of values inside that window; everything else is
/// reported as a move. Among equally long runs the one whose entries
/// travelled furthest is kept, so the reported moves are the short ones.
fn stable_positions(sequence: &[usize]) -> Vec<bool> {
    let n = sequence.len();
    let mut stable = vec![false; n];

    let mut lower = 0;
    let mut window = Vec::new();
    for i in 0..=n {
        if i < n && sequence[i] != i {
            continue;
        }
        // Entries strictly between two fixed entries, in value range.
        window.clear();
        window.extend((lower..i).filter(|&j| (lower..i).contains(&sequence[j])));
        let kept = if window.len() <= WEIGHTED_MOVE_LIMIT {
            weighted_lis(sequence, &window)
        } else {
            plain_lis(sequence, &window)
        };
        for j in kept {
            stable[j] = true;
        }
        if i < n {
            stable[i] = true;
        }
        lower = i + 1;
    }
    stable
}

fn weighted_lis(sequence: &[usize], window: &[usize]) -> Vec<usize> {
    let n = window.len();
    let mut best: Vec<(usize, usize)> = Vec::with_capacity(n);
    let mut prev: Vec<Option<usize>> = vec![None; n];
    for (a, &i) in window.iter().enumerate() {
        let weight = sequence[i].abs_diff(i);
        let mut entry = (1, weight);
        for (b, &j) in window[..a].iter().enumerate() {
            if sequence[j] < sequence[i] {
                let candidate = (best[b].0 + 1, best[b].1 + weight);
                if candidate > entry {
                    entry = candidate;
                    prev[a] = Some(b);
                }
            }
        }
        best.push(entry);
    }

    let mut tail = None;
    let mut top = (0, 0);
    for (a, entry) in best.iter().enumerate() {
        if *entry > top {
            top = *entry;
            tail = Some(a);
        }
    }
    collect_chain(tail, &prev, window)
}

fn plain_lis(sequence: &[usize], window: &[usize]) -> Vec<usize> {
    // tails[k]: window slot of the smallest tail of an increasing run of length k + 1.
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; window.len()];
    for (a, &i) in window.iter().enumerate() {
        let value = sequence[i];
        let k = tails.partition_point(|&t| sequence[window[t]] < value);
        if k > 0 {
            prev[a] = Some(tails[k - 1]);
        }
        if k == tails.len() {
            tails.push(a);
        } else {
            tails[k] = a;
        }
    }
    collect_chain(tails.last().copied(), &prev, window)
}

/// Follows `prev` back from `tail`, mapping window slots to positions.
fn collect_chain(tail: Option<usize>, prev: &[Option<usize>], window: &[usize]) -> Vec<usize> {
    let mut chain = Vec::new();
    let mut cursor = tail;
    while let Some(a) = cursor {
        chain.push(window[a]);
        cursor = prev[a];
    }
    chain.reverse();
    chain
}

/// "Collection changed" event derived from a notification.
///
/// Granular events are only produced when they can be applied one after
/// another without ambiguity. Anything else becomes a single
/// [`CollectionChange::Reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionChange {
    /// Re-read the whole collection.
    Reset,
    /// `count` items were added starting at `index`.
    Added {
        /// First new position.
        index: usize,
        /// Number of items.
        count: usize,
    },
    /// `count` items were removed starting at `index`.
    Removed {
        /// First removed position.
        index: usize,
        /// Number of items.
        count: usize,
    },
    /// The item at `index` changed in place.
    Replaced {
        /// Position in the new sequence.
        index: usize,
    },
    /// One item moved.
    Moved {
        /// Old position.
        from: usize,
        /// New position.
        to: usize,
    },
}

impl CollectionChange {
    /// Converts a notification into the events a list view would apply,
    /// in order.
    #[must_use]
    pub fn from_notification(notification: &Notification<'_>) -> Vec<Self> {
        match notification {
            Notification::Initial | Notification::Error(_) => vec![Self::Reset],
            Notification::Changed(changes) => Self::from_changes(changes),
        }
    }

    /// Converts a change set into ordered events.
    #[must_use]
    pub fn from_changes(changes: &ChangeSet) -> Vec<Self> {
        let inserted = !changes.insertions.is_empty();
        let deleted = !changes.deletions.is_empty();
        let moved = !changes.moves.is_empty();

        if inserted && deleted {
            return vec![Self::Reset];
        }
        if moved {
            return match changes.moves.as_slice() {
                [single] if !inserted && !deleted && changes.modifications.is_empty() => {
                    vec![Self::Moved {
                        from: single.from,
                        to: single.to,
                    }]
                }
                _ => vec![Self::Reset],
            };
        }

        let mut events = Vec::new();
        // Removal runs go last-to-first so earlier indices stay valid.
        for (index, count) in runs(&changes.deletions).into_iter().rev() {
            events.push(Self::Removed { index, count });
        }
        for (index, count) in runs(&changes.insertions) {
            events.push(Self::Added { index, count });
        }
        events.extend(
            changes
                .modifications
                .iter()
                .map(|&index| Self::Replaced { index }),
        );
        events
    }
}

fn runs(indices: &[usize]) -> Vec<(usize, usize)> {
    let mut runs: Vec<(usize, usize)> = Vec::new();
    for &i in indices {
        match runs.last_mut() {
            Some((start, count)) if *start + *count == i => *count += 1,
            _ => runs.push((i, 1)),
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn keys(raw: &[u64]) -> Vec<RowKey> {
        raw.iter().copied().map(RowKey).collect()
    }

    fn unchanged(_: RowKey) -> bool {
        false
    }

    #[test]
    fn single_move_is_one_pair() {
        let old = keys(&[1, 2, 3, 4, 5]);
        let new = keys(&[2, 3, 4, 1, 5]);
        let changes = ChangeSet::compute(&old, &new, unchanged);
        assert_eq!(changes.moves(), &[Move { from: 0, to: 3 }]);
        assert!(changes.insertions().is_empty());
        assert!(changes.deletions().is_empty());
        assert_eq!(changes.apply(&old, &new), new);
    }

    #[test]
    fn move_to_front_is_one_pair() {
        let old = keys(&[1, 2, 3, 4, 5]);
        let new = keys(&[5, 1, 2, 3, 4]);
        let changes = ChangeSet::compute(&old, &new, unchanged);
        assert_eq!(changes.moves(), &[Move { from: 4, to: 0 }]);
    }

    #[test]
    fn adjacent_swap_reports_one_move() {
        let old = keys(&[1, 2, 3]);
        let new = keys(&[2, 1, 3]);
        let changes = ChangeSet::compute(&old, &new, unchanged);
        assert_eq!(changes.moves().len(), 1);
        assert_eq!(changes.apply(&old, &new), new);
    }

    #[test]
    fn fewest_keys_move() {
        let old = keys(&[1, 2, 7]);
        let new = keys(&[7, 1, 2]);
        let changes = ChangeSet::compute(&old, &new, unchanged);
        assert_eq!(changes.moves(), &[Move { from: 2, to: 0 }]);
    }

    #[test]
    fn ties_keep_keys_at_their_index() {
        // Keeping [1, 2] or [1, 3] both leave two keys in place; 3 has not
        // changed index, so it stays and 2 moves.
        let old = keys(&[1, 2, 3, 4]);
        let new = keys(&[4, 1, 3, 2]);
        let changes = ChangeSet::compute(&old, &new, unchanged);
        assert_eq!(
            changes.moves(),
            &[Move { from: 3, to: 0 }, Move { from: 1, to: 3 }]
        );
        assert_eq!(changes.apply(&old, &new), new);
    }

    #[test]
    fn reversal_keeps_the_middle_key() {
        let old = keys(&[1, 2, 3]);
        let new = keys(&[3, 2, 1]);
        let changes = ChangeSet::compute(&old, &new, unchanged);
        assert_eq!(
            changes.moves(),
            &[Move { from: 2, to: 0 }, Move { from: 0, to: 2 }]
        );
        assert_eq!(changes.apply(&old, &new), new);
    }

    #[test]
    fn keys_at_their_index_never_move() {
        // The longest in-order run is [3, 4], but 2 sits at its old index.
        let old = keys(&[0, 1, 2, 3, 4]);
        let new = keys(&[3, 4, 2, 0, 1]);
        let changes = ChangeSet::compute(&old, &new, unchanged);
        assert!(changes.moves().iter().all(|m| m.from != m.to));
        assert!(!changes.moves().iter().any(|m| m.from == 2));
        assert_eq!(changes.apply(&old, &new), new);
    }

    #[test]
    fn insert_and_delete_positions() {
        let old = keys(&[1, 2, 3, 4]);
        let new = keys(&[1, 3, 9, 4, 8]);
        let changes = ChangeSet::compute(&old, &new, unchanged);
        assert_eq!(changes.deletions(), &[1]);
        assert_eq!(changes.insertions(), &[2, 4]);
        assert!(changes.moves().is_empty());
        assert_eq!(changes.apply(&old, &new), new);
    }

    #[test]
    fn modifications_use_both_coordinates() {
        let old = keys(&[1, 2, 3]);
        let new = keys(&[0, 1, 3]);
        let changes = ChangeSet::compute(&old, &new, |key| key == RowKey(3));
        assert_eq!(changes.modifications(), &[2]);
        assert_eq!(changes.old_modifications(), &[2]);
        assert_eq!(changes.insertions(), &[0]);
        assert_eq!(changes.deletions(), &[1]);
    }

    #[test]
    fn duplicate_keys_match_by_occurrence() {
        let old = keys(&[1, 2, 1]);
        let new = keys(&[1, 2]);
        let changes = ChangeSet::compute(&old, &new, unchanged);
        assert_eq!(changes.deletions(), &[2]);
        assert!(changes.moves().is_empty());
    }

    #[test]
    fn identical_sequences_are_empty() {
        let seq = keys(&[4, 5, 6]);
        assert!(ChangeSet::compute(&seq, &seq, unchanged).is_empty());
    }

    #[test]
    fn large_reorders_use_plain_search() {
        let old: Vec<RowKey> = (0..2000).map(RowKey).collect();
        let mut new = old.clone();
        let first = new.remove(0);
        new.push(first);
        let changes = ChangeSet::compute(&old, &new, unchanged);
        assert_eq!(changes.moves(), &[Move { from: 0, to: 1999 }]);
        assert_eq!(changes.apply(&old, &new), new);
    }

    #[test]
    fn mixed_insert_delete_is_reset() {
        let changes = ChangeSet::compute(&keys(&[1, 2]), &keys(&[2, 3]), unchanged);
        assert_eq!(
            CollectionChange::from_changes(&changes),
            vec![CollectionChange::Reset]
        );
    }

    #[test]
    fn granular_events() {
        let changes = ChangeSet::compute(&keys(&[1, 2, 3, 4, 5]), &keys(&[1, 4, 5]), unchanged);
        assert_eq!(
            CollectionChange::from_changes(&changes),
            vec![CollectionChange::Removed { index: 1, count: 2 }]
        );

        let changes = ChangeSet::compute(&keys(&[1]), &keys(&[1, 2, 3]), |k| k == RowKey(1));
        assert_eq!(
            CollectionChange::from_changes(&changes),
            vec![
                CollectionChange::Added { index: 1, count: 2 },
                CollectionChange::Replaced { index: 0 },
            ]
        );

        let changes = ChangeSet::compute(&keys(&[1, 2, 3]), &keys(&[2, 3, 1]), unchanged);
        assert_eq!(
            CollectionChange::from_changes(&changes),
            vec![CollectionChange::Moved { from: 0, to: 2 }]
        );
        assert_eq!(
            CollectionChange::from_notification(&Notification::Initial),
            vec![CollectionChange::Reset]
        );
    }

    fn edited_pair() -> impl Strategy<Value = (Vec<RowKey>, Vec<RowKey>)> {
        (1usize..40)
            .prop_flat_map(|n| {
                let old: Vec<u64> = (0..n as u64).collect();
                (
                    Just(old.clone()),
                    proptest::sample::subsequence(old, 0..=n),
                    proptest::collection::vec(100u64..200, 0..10),
                    any::<u64>(),
                )
            })
            .prop_map(|(old, mut kept, fresh, seed)| {
                // Deterministic shuffle of survivors plus fresh keys.
                kept.extend(fresh.into_iter().collect::<std::collections::BTreeSet<_>>());
                let len = kept.len().max(1) as u64;
                for i in 0..kept.len() {
                    let j = ((seed.wrapping_mul(i as u64 + 7)) % len) as usize;
                    kept.swap(i, j);
                }
                (keys(&old), keys(&kept))
            })
    }

    proptest! {
        #[test]
        fn apply_reconstructs_new((old, new) in edited_pair()) {
            let changes = ChangeSet::compute(&old, &new, |_| false);
            prop_assert_eq!(changes.apply(&old, &new), new.clone());
            prop_assert_eq!(
                old.len() - changes.deletions().len() + changes.insertions().len(),
                new.len()
            );
        }

        #[test]
        fn moves_never_exceed_survivors((old, new) in edited_pair()) {
            let changes = ChangeSet::compute(&old, &new, |_| false);
            let survivors = old.len() - changes.deletions().len();
            prop_assert!(changes.moves().len() < survivors.max(1));
            prop_assert!(changes.moves().iter().all(|m| m.from != m.to));
        }
    }
}
