//! Live node tree: the mutable container the patcher operates on.
//!
//! Nodes are single-threaded reference-counted handles; cloning a [`Node`]
//! clones the handle, not the subtree. Parents own their children, children
//! hold weak back-references, so dropping the last external handle to a
//! detached subtree frees it.
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::errors::ReconcileError;
use crate::types::next_node_id;

/// What a node is. Decided once at construction time and never re-inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element(String),
    Text,
    Comment,
    /// Detached staging container; inserting it splices its children into the
    /// target in one call and leaves the fragment empty.
    Fragment,
}

/// A handle to one node in the live tree. Compared by identity.
pub struct Node(Rc<NodeInner>);

struct NodeInner {
    id: usize,
    kind: NodeKind,
    text: RefCell<String>,
    parent: RefCell<Weak<NodeInner>>,
    children: RefCell<Vec<Node>>,
}

impl Clone for Node {
    fn clone(&self) -> Self {
        Node(Rc::clone(&self.0))
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Node {}

impl Node {
    fn build(kind: NodeKind, text: &str) -> Node {
        Node(Rc::new(NodeInner {
            id: next_node_id(),
            kind,
            text: RefCell::new(text.to_string()),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
        }))
    }

    pub fn element(tag: &str) -> Node {
        Node::build(NodeKind::Element(tag.to_string()), "")
    }

    pub fn text(content: &str) -> Node {
        Node::build(NodeKind::Text, content)
    }

    pub fn comment() -> Node {
        Node::build(NodeKind::Comment, "")
    }

    pub fn fragment() -> Node {
        Node::build(NodeKind::Fragment, "")
    }

    /// Process-unique id, stable for the node's lifetime.
    pub fn id(&self) -> usize {
        self.0.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.0.kind
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.0.kind {
            NodeKind::Element(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn text_value(&self) -> String {
        self.0.text.borrow().clone()
    }

    pub fn set_text(&self, content: &str) {
        *self.0.text.borrow_mut() = content.to_string();
    }

    pub fn parent(&self) -> Option<Node> {
        self.0.parent.borrow().upgrade().map(Node)
    }

    /// Ordered children, as fresh handles.
    pub fn children(&self) -> Vec<Node> {
        self.0.children.borrow().clone()
    }

    pub fn child_count(&self) -> usize {
        self.0.children.borrow().len()
    }

    pub fn first_child(&self) -> Option<Node> {
        self.0.children.borrow().first().cloned()
    }

    pub fn last_child(&self) -> Option<Node> {
        self.0.children.borrow().last().cloned()
    }

    pub fn index_of(&self, child: &Node) -> Option<usize> {
        self.0.children.borrow().iter().position(|c| c == child)
    }

    pub fn next_sibling(&self) -> Option<Node> {
        let parent = self.parent()?;
        let index = parent.index_of(self)?;
        parent.0.children.borrow().get(index + 1).cloned()
    }

    pub fn prev_sibling(&self) -> Option<Node> {
        let parent = self.parent()?;
        let index = parent.index_of(self)?;
        parent.0.children.borrow().get(index.checked_sub(1)?).cloned()
    }

    fn ensure_container(&self) -> Result<(), ReconcileError> {
        match self.0.kind {
            NodeKind::Element(_) | NodeKind::Fragment => Ok(()),
            _ => Err(ReconcileError::NotAContainer { id: self.id() }),
        }
    }

    pub fn append_child(&self, child: &Node) -> Result<(), ReconcileError> {
        self.insert_before(child, None)
    }

    /// Insert `child` before `reference`, or at the end when `reference` is
    /// `None`. A node that already has a parent is detached first, so the
    /// same call moves nodes between (or within) containers. Inserting a
    /// fragment splices its children.
    pub fn insert_before(
        &self,
        child: &Node,
        reference: Option<&Node>,
    ) -> Result<(), ReconcileError> {
        self.ensure_container()?;
        if let NodeKind::Fragment = child.0.kind {
            for grandchild in child.take_children() {
                self.insert_before(&grandchild, reference)?;
            }
            return Ok(());
        }
        child.detach();
        let index = match reference {
            Some(reference) => {
                self.index_of(reference).ok_or(ReconcileError::NotAChild {
                    id: reference.id(),
                    container: self.id(),
                })?
            }
            None => self.child_count(),
        };
        self.0.children.borrow_mut().insert(index, child.clone());
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        Ok(())
    }

    pub fn remove_child(&self, child: &Node) -> Result<(), ReconcileError> {
        let index = self.index_of(child).ok_or(ReconcileError::NotAChild {
            id: child.id(),
            container: self.id(),
        })?;
        self.0.children.borrow_mut().remove(index);
        *child.0.parent.borrow_mut() = Weak::new();
        Ok(())
    }

    /// Swap `old_child` for `new_child` in place, keeping the position of the
    /// slot. Used to park a subtree behind a placeholder and back.
    pub fn replace_child(
        &self,
        new_child: &Node,
        old_child: &Node,
    ) -> Result<(), ReconcileError> {
        new_child.detach();
        let index = self.index_of(old_child).ok_or(ReconcileError::NotAChild {
            id: old_child.id(),
            container: self.id(),
        })?;
        self.0.children.borrow_mut()[index] = new_child.clone();
        *old_child.0.parent.borrow_mut() = Weak::new();
        *new_child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        Ok(())
    }

    /// Remove this node from its parent, if any.
    pub fn detach(&self) {
        if let Some(parent) = self.parent() {
            let mut children = parent.0.children.borrow_mut();
            if let Some(index) = children.iter().position(|c| c == self) {
                children.remove(index);
            }
            drop(children);
            *self.0.parent.borrow_mut() = Weak::new();
        }
    }

    fn take_children(&self) -> Vec<Node> {
        let children = std::mem::take(&mut *self.0.children.borrow_mut());
        for child in &children {
            *child.0.parent.borrow_mut() = Weak::new();
        }
        children
    }

    /// Concatenated text of this subtree, comments excluded.
    pub fn text_content(&self) -> String {
        match self.0.kind {
            NodeKind::Text => self.text_value(),
            NodeKind::Comment => String::new(),
            _ => self
                .0
                .children
                .borrow()
                .iter()
                .map(Node::text_content)
                .collect(),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node#{}({:?})", self.0.id, self.0.kind)
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

impl fmt::Display for Node {
    /// Compact HTML-ish rendering, used by tests and debug logging only; the
    /// tree itself is never persisted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.kind {
            NodeKind::Element(tag) => {
                write!(f, "<{tag}>")?;
                for child in self.0.children.borrow().iter() {
                    write!(f, "{child}")?;
                }
                write!(f, "</{tag}>")
            }
            NodeKind::Text => write!(f, "{}", escape(&self.0.text.borrow())),
            NodeKind::Comment => write!(f, "<!---->"),
            NodeKind::Fragment => {
                for child in self.0.children.borrow().iter() {
                    write!(f, "{child}")?;
                }
                Ok(())
            }
        }
    }
}
