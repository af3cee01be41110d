//! Property-based test generators using proptest.

use proptest::prelude::*;

/// Strategy for sequences of distinct keys, as a collection holds them.
pub fn distinct_keys_strategy(max_len: usize) -> impl Strategy<Value = Vec<u64>> {
    prop::collection::btree_set(1u64..512, 0..=max_len)
        .prop_map(|keys| keys.into_iter().collect::<Vec<_>>())
        .prop_shuffle()
}

/// One edit a test applies to a list inside a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEdit {
    /// Append a new object.
    Push,
    /// Remove the entry at `index % len`.
    Remove(usize),
    /// Move the entry at `from % len` to `to % len`.
    Move(usize, usize),
    /// Modify the entry at `index % len`.
    Touch(usize),
}

/// Strategy for a batch of list edits.
pub fn list_edits_strategy(max_len: usize) -> impl Strategy<Value = Vec<ListEdit>> {
    let edit = prop_oneof![
        Just(ListEdit::Push),
        any::<usize>().prop_map(ListEdit::Remove),
        (any::<usize>(), any::<usize>()).prop_map(|(a, b)| ListEdit::Move(a, b)),
        any::<usize>().prop_map(ListEdit::Touch),
    ];
    prop::collection::vec(edit, 0..=max_len)
}
