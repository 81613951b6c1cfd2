//! Applies an edit script to a live container.
//!
//! Contiguous additions and moves aimed at the same target position
//! accumulate in a detached fragment and land in one insertion, immediately
//! before the next already-in-place sibling. Removals detach right away;
//! their positions stay valid because the script is expressed against the
//! original old indexing. Siblings outside the managed region are never
//! touched.
use indexmap::IndexMap;
use log::{debug, trace};
use serde_json::Value;

use crate::errors::ReconcileError;
use crate::tree::Node;
use crate::types::{EditOp, Key};

/// Churn threshold: once `edits * PLACEHOLDER_FACTOR` exceeds the child
/// count, the whole container is parked behind a placeholder while the
/// edits run on the detached subtree.
const PLACEHOLDER_FACTOR: usize = 5;

/// Turns one list element into a newly created tree node.
pub type NodeFactory = dyn Fn(&Value) -> Result<Node, ReconcileError>;

/// Result of one patch application.
#[derive(Debug)]
pub struct PatchOutcome {
    /// Managed children after application, left to right.
    pub children: Vec<Node>,
    /// Key->node map for the new snapshot; on duplicate keys the later
    /// occurrence wins.
    pub nodes: IndexMap<Key, Node>,
}

pub struct Patcher<'a> {
    container: &'a Node,
    factory: &'a NodeFactory,
    /// First unmanaged sibling after the region; insertions never cross it.
    end: Option<&'a Node>,
}

impl<'a> Patcher<'a> {
    pub fn new(container: &'a Node, factory: &'a NodeFactory, end: Option<&'a Node>) -> Self {
        Patcher {
            container,
            factory,
            end,
        }
    }

    /// Execute `script` against the container.
    ///
    /// `children` are the currently managed children in old order; `elements`
    /// and `new_keys` describe the new snapshot; `prior` is the key->node map
    /// from the previous pass, consulted so that keys present in both
    /// snapshots keep their node instance.
    ///
    /// Factory failures propagate; edits already applied are not rolled
    /// back, leaving the tree partially updated but structurally valid.
    ///
    /// Keys are expected to be unique within one snapshot. When the old
    /// sequence contains a duplicated key, a later edit can anchor on a
    /// child an earlier edit already detached; the pass then fails with
    /// [`ReconcileError::NotAChild`] instead of rendering a last-wins
    /// result. The caller's bookkeeping stays on the previous snapshot,
    /// as with any other failed edit.
    pub fn apply(
        &self,
        script: &[EditOp],
        children: &[Node],
        elements: &[Value],
        new_keys: &[Key],
        prior: &IndexMap<Key, Node>,
    ) -> Result<PatchOutcome, ReconcileError> {
        let mut nodes: IndexMap<Key, Node> = new_keys
            .iter()
            .filter_map(|key| prior.get(key).map(|node| (key.clone(), node.clone())))
            .collect();

        // Anchors bounding the managed region, captured before any mutation.
        let anchor_before = match children.first() {
            Some(first) => first.prev_sibling(),
            None => self.end.and_then(Node::prev_sibling),
        };

        // Large churn: park the container behind a placeholder so the many
        // individual mutations happen on a detached subtree.
        let parent = self.container.parent();
        let parked = match parent {
            Some(parent) if script.len() * PLACEHOLDER_FACTOR > children.len() => {
                debug!(
                    "parking container #{} behind a placeholder ({} edits, {} children)",
                    self.container.id(),
                    script.len(),
                    children.len()
                );
                let placeholder = Node::comment();
                parent.replace_child(&placeholder, self.container)?;
                Some((parent, placeholder))
            }
            _ => None,
        };

        let applied = self.run(script, children, elements, new_keys, &mut nodes);

        // The container must come back even when an edit failed mid-script.
        if let Some((parent, placeholder)) = parked {
            parent.replace_child(self.container, &placeholder)?;
        }
        applied?;

        Ok(PatchOutcome {
            children: self.collect(anchor_before.as_ref()),
            nodes,
        })
    }

    fn run(
        &self,
        script: &[EditOp],
        children: &[Node],
        elements: &[Value],
        new_keys: &[Key],
        nodes: &mut IndexMap<Key, Node>,
    ) -> Result<(), ReconcileError> {
        let fragment = Node::fragment();
        let mut last_target: Option<usize> = None;

        for op in script {
            match *op {
                EditOp::Remove { index } => {
                    let child = children.get(index).ok_or(ReconcileError::EditOutOfRange {
                        index,
                        len: children.len(),
                    })?;
                    trace!("remove node #{} at old index {index}", child.id());
                    self.container.remove_child(child)?;
                }
                EditOp::Add { new_index, to } => {
                    self.stage(&fragment, children, &mut last_target, to)?;
                    let element =
                        elements.get(new_index).ok_or(ReconcileError::EditOutOfRange {
                            index: new_index,
                            len: elements.len(),
                        })?;
                    let key = new_keys.get(new_index).ok_or(ReconcileError::EditOutOfRange {
                        index: new_index,
                        len: new_keys.len(),
                    })?;
                    let node = (self.factory)(element)?;
                    trace!("add node #{} for key {key} at target {to}", node.id());
                    nodes.insert(key.clone(), node.clone());
                    fragment.append_child(&node)?;
                }
                EditOp::Move { from, to } => {
                    self.stage(&fragment, children, &mut last_target, to)?;
                    let node = children.get(from).ok_or(ReconcileError::EditOutOfRange {
                        index: from,
                        len: children.len(),
                    })?;
                    trace!("move node #{} from old index {from} to target {to}", node.id());
                    fragment.append_child(node)?;
                }
            }
        }

        if fragment.child_count() > 0 {
            self.flush(&fragment, children, last_target.unwrap_or(0))?;
        }
        Ok(())
    }

    /// Flush the pending batch when the target position changes.
    fn stage(
        &self,
        fragment: &Node,
        children: &[Node],
        last_target: &mut Option<usize>,
        to: usize,
    ) -> Result<(), ReconcileError> {
        if let Some(previous) = *last_target {
            if previous != to {
                self.flush(fragment, children, previous)?;
            }
        }
        *last_target = Some(to);
        Ok(())
    }

    /// Insert the accumulated fragment before the old child at `target`, or
    /// before the end anchor when the target lies past the managed range.
    fn flush(
        &self,
        fragment: &Node,
        children: &[Node],
        target: usize,
    ) -> Result<(), ReconcileError> {
        let before = children.get(target).or(self.end);
        trace!(
            "flush batch of {} before {:?}",
            fragment.child_count(),
            before.map(Node::id)
        );
        self.container.insert_before(fragment, before)
    }

    /// Re-read the managed region: everything between the captured left
    /// anchor and the end anchor.
    fn collect(&self, anchor_before: Option<&Node>) -> Vec<Node> {
        let mut out = Vec::new();
        let mut cursor = match anchor_before {
            Some(anchor) => anchor.next_sibling(),
            None => self.container.first_child(),
        };
        while let Some(node) = cursor {
            if self.end.is_some_and(|end| *end == node) {
                break;
            }
            cursor = node.next_sibling();
            out.push(node);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff_engine::diff;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn span(value: &Value) -> Result<Node, ReconcileError> {
        let node = Node::element("span");
        node.append_child(&Node::text(value.as_str().unwrap_or_default()))?;
        Ok(node)
    }

    fn keys(raw: &[&str]) -> Vec<Key> {
        raw.iter().map(|s| Key::Str(s.to_string())).collect()
    }

    fn values(raw: &[&str]) -> Vec<Value> {
        raw.iter().map(|s| json!(s)).collect()
    }

    fn seed(container: &Node, raw: &[&str]) -> (Vec<Node>, IndexMap<Key, Node>) {
        let mut children = Vec::new();
        let mut nodes = IndexMap::new();
        for s in raw {
            let node = span(&json!(s)).unwrap();
            container.append_child(&node).unwrap();
            nodes.insert(Key::Str(s.to_string()), node.clone());
            children.push(node);
        }
        (children, nodes)
    }

    #[test]
    fn factory_failure_propagates_without_rollback() {
        let container = Node::element("ul");
        let (children, prior) = seed(&container, &["a", "b"]);

        let factory: &NodeFactory = &|_| Err(ReconcileError::factory("boom"));
        let patcher = Patcher::new(&container, factory, None);
        let new_keys = keys(&["c"]);
        let script = diff(&keys(&["a", "b"]), &new_keys);

        let err = patcher
            .apply(&script, &children, &values(&["c"]), &new_keys, &prior)
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Factory { .. }));
        // Both removals ran before the factory was consulted.
        assert_eq!(container.child_count(), 0);
    }

    #[test]
    fn large_churn_runs_detached_behind_a_placeholder() {
        let root = Node::element("div");
        let container = Node::element("ul");
        root.append_child(&container).unwrap();
        let (children, prior) = seed(&container, &["a"]);

        let observed_detached = Rc::new(Cell::new(false));
        let flag = Rc::clone(&observed_detached);
        let probe = root.clone();
        let factory = move |value: &Value| {
            // While the factory runs, the root must hold the placeholder.
            flag.set(probe.first_child().is_some_and(|n| n.tag().is_none()));
            span(value)
        };
        let factory: &NodeFactory = &factory;

        let new_keys = keys(&["b", "c", "d"]);
        let script = diff(&keys(&["a"]), &new_keys);
        assert!(script.len() * 5 > children.len());

        let patcher = Patcher::new(&container, factory, None);
        let outcome = patcher
            .apply(&script, &children, &values(&["b", "c", "d"]), &new_keys, &prior)
            .unwrap();

        assert!(observed_detached.get());
        // Reattached at its original slot, with the right content.
        assert_eq!(root.index_of(&container), Some(0));
        assert_eq!(container.text_content(), "bcd");
        assert_eq!(outcome.children.len(), 3);
    }

    #[test]
    fn small_edits_on_a_large_region_stay_attached() {
        let root = Node::element("div");
        let container = Node::element("ul");
        root.append_child(&container).unwrap();
        let old: Vec<&str> = vec!["a", "b", "c", "d", "e", "f"];
        let (children, prior) = seed(&container, &old);

        let observed_detached = Rc::new(Cell::new(false));
        let flag = Rc::clone(&observed_detached);
        let probe = root.clone();
        let factory = move |value: &Value| {
            flag.set(probe.first_child().is_some_and(|n| n.tag().is_none()));
            span(value)
        };
        let factory: &NodeFactory = &factory;

        // One addition against six children: below the churn threshold.
        let new: Vec<&str> = vec!["a", "b", "c", "d", "e", "f", "g"];
        let new_keys = keys(&new);
        let script = diff(&keys(&old), &new_keys);
        assert_eq!(script.len(), 1);

        let patcher = Patcher::new(&container, factory, None);
        let outcome = patcher
            .apply(&script, &children, &values(&new), &new_keys, &prior)
            .unwrap();

        assert!(!observed_detached.get());
        assert_eq!(container.text_content(), "abcdefg");
        assert_eq!(outcome.children.len(), 7);
    }

    #[test]
    fn keys_in_both_snapshots_keep_their_node_instance() {
        let container = Node::element("ul");
        let (children, prior) = seed(&container, &["a", "b", "c"]);
        let reused: Vec<usize> = children.iter().map(Node::id).collect();

        let factory: &NodeFactory = &span;
        let new_keys = keys(&["c", "a"]);
        let script = diff(&keys(&["a", "b", "c"]), &new_keys);

        let patcher = Patcher::new(&container, factory, None);
        let outcome = patcher
            .apply(&script, &children, &values(&["c", "a"]), &new_keys, &prior)
            .unwrap();

        assert_eq!(container.text_content(), "ca");
        assert_eq!(outcome.nodes[&Key::Str("a".into())].id(), reused[0]);
        assert_eq!(outcome.nodes[&Key::Str("c".into())].id(), reused[2]);
    }
}
