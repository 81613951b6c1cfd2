//! Declarative content and the thin node factory.
//!
//! Content is a tagged variant decided once at construction time; nothing is
//! re-inspected on later updates. Mounting hands back the live machinery
//! (bindings and subscriptions) so the caller controls its lifetime:
//! dropping a [`Mounted`] cancels everything reachable from it.
use log::error;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

use crate::binding::ListBinding;
use crate::cell::{Subscription, ValueCell};
use crate::errors::ReconcileError;
use crate::patcher::NodeFactory;
use crate::tree::{Node, NodeKind};
use crate::types::KeySelector;

/// One piece of renderable content.
pub enum Content {
    /// An already-built node, appended as-is.
    Node(Node),
    /// Plain text.
    Text(String),
    /// A single slot driven by a value cell.
    Dyn(ValueCell<Dynamic>),
    /// A keyed list region, reconciled on every source update.
    Keyed(KeyedList),
    /// Several pieces of content, mounted in order.
    Many(Vec<Content>),
}

impl Content {
    pub fn text(text: impl Into<String>) -> Content {
        Content::Text(text.into())
    }

    pub fn keyed(
        source: ValueCell<Vec<Value>>,
        selector: KeySelector,
        factory: impl Fn(&Value) -> Result<Node, ReconcileError> + 'static,
    ) -> Content {
        Content::Keyed(KeyedList::new(source, selector, factory))
    }
}

/// Value carried by a dynamic slot.
#[derive(Clone)]
pub enum Dynamic {
    Text(String),
    Node(Node),
    Empty,
}

impl Dynamic {
    /// Primitives render as text; anything else collapses the slot.
    pub fn from_value(value: &Value) -> Dynamic {
        match value {
            Value::String(s) => Dynamic::Text(s.clone()),
            Value::Number(n) => Dynamic::Text(n.to_string()),
            Value::Bool(b) => Dynamic::Text(b.to_string()),
            _ => Dynamic::Empty,
        }
    }
}

/// Descriptor for a keyed mapped list, turned into a [`ListBinding`] when
/// mounted.
pub struct KeyedList {
    source: ValueCell<Vec<Value>>,
    selector: KeySelector,
    factory: Rc<NodeFactory>,
}

impl KeyedList {
    pub fn new(
        source: ValueCell<Vec<Value>>,
        selector: KeySelector,
        factory: impl Fn(&Value) -> Result<Node, ReconcileError> + 'static,
    ) -> Self {
        KeyedList {
            source,
            selector,
            factory: Rc::new(factory),
        }
    }
}

/// A mounted view: the root node plus the live machinery keeping it in sync.
pub struct Mounted {
    pub node: Node,
    pub bindings: Vec<ListBinding>,
    pub subscriptions: Vec<Subscription>,
}

/// Build an element and mount `content` into it.
pub fn el(tag: &str, content: Content) -> Result<Mounted, ReconcileError> {
    let node = Node::element(tag);
    let mut mounted = Mounted {
        node: node.clone(),
        bindings: Vec::new(),
        subscriptions: Vec::new(),
    };
    mount(content, &node, &mut mounted)?;
    Ok(mounted)
}

/// Mount one piece of content at the current end of `container`.
pub fn mount(
    content: Content,
    container: &Node,
    mounted: &mut Mounted,
) -> Result<(), ReconcileError> {
    match content {
        Content::Node(node) => container.append_child(&node),
        Content::Text(text) => container.append_child(&Node::text(&text)),
        Content::Many(items) => {
            for item in items {
                mount(item, container, mounted)?;
            }
            Ok(())
        }
        Content::Keyed(list) => {
            let binding = ListBinding::from_shared(list.source, list.selector, list.factory);
            binding.attach(container)?;
            mounted.bindings.push(binding);
            Ok(())
        }
        Content::Dyn(cell) => {
            let slot = Rc::new(RefCell::new(Node::text("")));
            container.append_child(&slot.borrow())?;
            let host = container.clone();
            let subscription = cell.subscribe(move |value| {
                if let Err(err) = render_dynamic(&host, &slot, value) {
                    error!("dynamic content update failed: {err}");
                }
            });
            mounted.subscriptions.push(subscription);
            Ok(())
        }
    }
}

fn render_dynamic(
    host: &Node,
    slot: &Rc<RefCell<Node>>,
    value: &Dynamic,
) -> Result<(), ReconcileError> {
    let current = slot.borrow().clone();
    match value {
        Dynamic::Text(text) => {
            if matches!(current.kind(), NodeKind::Text) {
                current.set_text(text);
            } else {
                let fresh = Node::text(text);
                host.replace_child(&fresh, &current)?;
                *slot.borrow_mut() = fresh;
            }
        }
        Dynamic::Node(node) => {
            if *node != current {
                host.replace_child(node, &current)?;
                *slot.borrow_mut() = node.clone();
            }
        }
        Dynamic::Empty => {
            if matches!(current.kind(), NodeKind::Text) {
                current.set_text("");
            } else {
                let fresh = Node::text("");
                host.replace_child(&fresh, &current)?;
                *slot.borrow_mut() = fresh;
            }
        }
    }
    Ok(())
}
