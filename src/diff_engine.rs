//! Core diffing engine: a single forward pass over two key sequences.
//!
//! This is a linear-time approximation of list edit distance, not an LCS
//! solver. Two precomputed key->index maps give O(1) amortized work per
//! element, and every mismatch is classified as exactly one of delete,
//! insert or move without backtracking. Unchanged prefixes and suffixes
//! fall through the identity match and cost nothing.
use log::trace;
use std::collections::HashMap;

use crate::types::{EditOp, Key};

/// Compare an old keyed sequence to a new one and produce an ordered edit
/// script of [`EditOp`]s.
///
/// Keys are assumed unique within one snapshot; when a key repeats, the last
/// occurrence wins the index slot and the earlier one is treated as removed.
pub fn diff(old: &[Key], new: &[Key]) -> Vec<EditOp> {
    let new_index_of: HashMap<&Key, usize> =
        new.iter().enumerate().map(|(i, k)| (k, i)).collect();
    let old_index_of: HashMap<&Key, usize> =
        old.iter().enumerate().map(|(i, k)| (k, i)).collect();

    // Slots consumed by a forward move. Explicit flags keep the index
    // arithmetic stable without a sentinel colliding with real keys.
    let mut spent = vec![false; old.len()];
    let mut script = Vec::new();

    let mut i = 0;
    let mut j = 0;
    while i != old.len() || j != new.len() {
        if i < old.len() && spent[i] {
            // Already matched earlier in the scan via a move.
            i += 1;
        } else if j >= new.len() {
            // New sequence exhausted; whatever remains in old is deleted.
            script.push(EditOp::Remove { index: i });
            i += 1;
        } else if i >= old.len() {
            // Old sequence exhausted; whatever remains in new is added.
            script.push(EditOp::Add { new_index: j, to: i });
            j += 1;
        } else if old[i] == new[j] {
            i += 1;
            j += 1;
        } else if !new_index_of.contains_key(&old[i]) {
            // The key at the cursor does not appear in new: deleted.
            script.push(EditOp::Remove { index: i });
            i += 1;
        } else {
            match old_index_of.get(&new[j]) {
                None => {
                    // The wanted key does not appear in old: newly introduced.
                    script.push(EditOp::Add { new_index: j, to: i });
                    j += 1;
                }
                Some(&from) => {
                    // The wanted key sits elsewhere in old; relocate it here.
                    // The slot at `i` stays pending against the next new key.
                    script.push(EditOp::Move { from, to: i });
                    spent[from] = true;
                    j += 1;
                }
            }
        }
    }

    trace!(
        "diff: {} -> {} keys, {} edits",
        old.len(),
        new.len(),
        script.len()
    );
    script
}

#[cfg(test)]
mod tests {
    use super::diff;
    use crate::types::{EditOp, Key};

    fn keys(raw: &[&str]) -> Vec<Key> {
        raw.iter().map(|s| Key::Str(s.to_string())).collect()
    }

    #[test]
    fn identical_sequences_produce_no_edits() {
        let seq = keys(&["a", "b", "c"]);
        assert!(diff(&seq, &seq).is_empty());
    }

    #[test]
    fn rediffing_the_same_target_is_idempotent() {
        let old = keys(&["a", "b"]);
        let new = keys(&["b", "c", "a"]);
        let _ = diff(&old, &new);
        assert!(diff(&new, &new).is_empty());
    }

    #[test]
    fn removal_in_the_middle() {
        let old = keys(&["a", "b", "c"]);
        let new = keys(&["a", "c"]);
        assert_eq!(diff(&old, &new), vec![EditOp::Remove { index: 1 }]);
    }

    #[test]
    fn swap_reuses_both_slots_and_drops_the_tail() {
        let old = keys(&["1", "2", "3"]);
        let new = keys(&["2", "1"]);
        assert_eq!(
            diff(&old, &new),
            vec![
                EditOp::Move { from: 1, to: 0 },
                EditOp::Remove { index: 2 },
            ]
        );
    }

    #[test]
    fn empty_old_is_all_adds() {
        let old = keys(&[]);
        let new = keys(&["x", "y"]);
        assert_eq!(
            diff(&old, &new),
            vec![
                EditOp::Add { new_index: 0, to: 0 },
                EditOp::Add { new_index: 1, to: 0 },
            ]
        );
    }

    #[test]
    fn append_targets_past_the_old_range() {
        let old = keys(&["a"]);
        let new = keys(&["a", "b"]);
        assert_eq!(
            diff(&old, &new),
            vec![EditOp::Add { new_index: 1, to: 1 }]
        );
    }

    #[test]
    fn disjoint_keys_remove_before_adding() {
        let old = keys(&["x"]);
        let new = keys(&["a"]);
        assert_eq!(
            diff(&old, &new),
            vec![
                EditOp::Remove { index: 0 },
                EditOp::Add { new_index: 0, to: 1 },
            ]
        );
    }

    #[test]
    fn duplicate_key_in_new_keeps_the_later_occurrence() {
        // The index build is last-wins, so the first `b` matches in place and
        // the second is a fresh addition.
        let old = keys(&["a", "b"]);
        let new = keys(&["b", "b"]);
        assert_eq!(
            diff(&old, &new),
            vec![
                EditOp::Remove { index: 0 },
                EditOp::Add { new_index: 1, to: 2 },
            ]
        );
    }

    #[test]
    fn interleaved_moves_batch_toward_the_same_target() {
        let old = keys(&["a", "b", "c"]);
        let new = keys(&["b", "c", "a"]);
        assert_eq!(
            diff(&old, &new),
            vec![
                EditOp::Move { from: 1, to: 0 },
                EditOp::Move { from: 2, to: 0 },
            ]
        );
    }
}
