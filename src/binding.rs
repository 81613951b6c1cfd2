//! Reactive binding: subscribes a differ+patcher pair to a value cell and
//! owns the bookkeeping for one managed region.
//!
//! The `old` key sequence and the key->node map live here, exclusively; the
//! rendered tree is never consulted to recover them. One binding manages one
//! contiguous span of children, bounded on the right by a comment marker
//! mounted at attach time, so unrelated siblings on either side are never
//! disturbed.
use indexmap::IndexMap;
use log::{debug, error, trace};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

use crate::cell::{Subscription, ValueCell};
use crate::diff_engine::diff;
use crate::errors::ReconcileError;
use crate::patcher::{NodeFactory, Patcher};
use crate::tree::Node;
use crate::types::{Key, KeySelector};

/// Lifecycle of a [`ListBinding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// Attached or not, no snapshot rendered yet.
    Uninitialized,
    /// Subscribed; `old` holds the last rendered key sequence.
    Bound,
    /// Subscription cancelled; further deliveries are dropped.
    Detached,
}

struct BindingInner {
    container: Option<Node>,
    /// End-of-region marker; insertions never cross it.
    marker: Option<Node>,
    selector: KeySelector,
    factory: Rc<NodeFactory>,
    state: BindingState,
    old_keys: Vec<Key>,
    nodes: IndexMap<Key, Node>,
    children: Vec<Node>,
}

/// Keeps a keyed list region in sync with a cell of snapshots.
pub struct ListBinding {
    source: ValueCell<Vec<Value>>,
    inner: Rc<RefCell<BindingInner>>,
    subscription: RefCell<Option<Subscription>>,
}

impl ListBinding {
    pub fn new(
        source: ValueCell<Vec<Value>>,
        selector: KeySelector,
        factory: impl Fn(&Value) -> Result<Node, ReconcileError> + 'static,
    ) -> Self {
        Self::from_shared(source, selector, Rc::new(factory))
    }

    pub(crate) fn from_shared(
        source: ValueCell<Vec<Value>>,
        selector: KeySelector,
        factory: Rc<NodeFactory>,
    ) -> Self {
        ListBinding {
            source,
            inner: Rc::new(RefCell::new(BindingInner {
                container: None,
                marker: None,
                selector,
                factory,
                state: BindingState::Uninitialized,
                old_keys: Vec::new(),
                nodes: IndexMap::new(),
                children: Vec::new(),
            })),
            subscription: RefCell::new(None),
        }
    }

    /// Mount the managed region at the current end of `container` and start
    /// listening. If the source already holds a value the first
    /// reconciliation runs before this returns, treating the prior state as
    /// an empty sequence.
    pub fn attach(&self, container: &Node) -> Result<(), ReconcileError> {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.container.is_some() {
                return Err(ReconcileError::AlreadyAttached);
            }
            let marker = Node::comment();
            container.append_child(&marker)?;
            inner.container = Some(container.clone());
            inner.marker = Some(marker);
        }
        let shared = Rc::clone(&self.inner);
        let subscription = self.source.subscribe(move |snapshot| {
            if let Err(err) = deliver(&shared, snapshot) {
                error!("keyed list update failed: {err}");
            }
        });
        *self.subscription.borrow_mut() = Some(subscription);
        Ok(())
    }

    /// Cancel the subscription so the source stops invoking this binding.
    /// Idempotent; rendered nodes stay in the tree. Late deliveries already
    /// in flight are dropped, not queued.
    pub fn detach(&self) {
        if let Some(mut subscription) = self.subscription.borrow_mut().take() {
            subscription.cancel();
        }
        let mut inner = self.inner.borrow_mut();
        if inner.state != BindingState::Detached {
            trace!("binding detached after {} rendered keys", inner.old_keys.len());
            inner.state = BindingState::Detached;
        }
    }

    pub fn state(&self) -> BindingState {
        self.inner.borrow().state
    }

    /// The live node currently representing `key`, if any.
    pub fn node_for(&self, key: &Key) -> Option<Node> {
        self.inner.borrow().nodes.get(key).cloned()
    }

    /// Keys of the last rendered snapshot, in render order.
    pub fn keys(&self) -> Vec<Key> {
        self.inner.borrow().old_keys.clone()
    }

    /// Number of distinct keys currently mapped to a node.
    pub fn len(&self) -> usize {
        self.inner.borrow().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn deliver(shared: &Rc<RefCell<BindingInner>>, snapshot: &[Value]) -> Result<(), ReconcileError> {
    let mut inner = shared.borrow_mut();
    if inner.state == BindingState::Detached {
        trace!("dropping delivery after detach");
        return Ok(());
    }
    let Some(container) = inner.container.clone() else {
        return Ok(());
    };

    // Elements without a usable key never surface as edit operations.
    let mut new_keys = Vec::with_capacity(snapshot.len());
    let mut elements = Vec::with_capacity(snapshot.len());
    for element in snapshot {
        match inner.selector.key_of(element) {
            Some(key) => {
                new_keys.push(key);
                elements.push(element.clone());
            }
            None => trace!("skipping element without a key"),
        }
    }

    let script = diff(&inner.old_keys, &new_keys);
    debug!(
        "reconciling {} -> {} keys with {} edits",
        inner.old_keys.len(),
        new_keys.len(),
        script.len()
    );

    let factory = Rc::clone(&inner.factory);
    let marker = inner.marker.clone();
    let outcome = Patcher::new(&container, factory.as_ref(), marker.as_ref()).apply(
        &script,
        &inner.children,
        &elements,
        &new_keys,
        &inner.nodes,
    )?;

    inner.old_keys = new_keys;
    inner.children = outcome.children;
    inner.nodes = outcome.nodes;
    inner.state = BindingState::Bound;
    Ok(())
}
