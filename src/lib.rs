//! Keyed-list reconciliation for live node trees.
//!
//! Renders ordered, keyed collections into a tree of mutable nodes and keeps
//! the tree in sync as the collection changes, disturbing as few existing
//! nodes as possible: a node keeps its identity for as long as its key stays
//! in the list. The engine compares the old and new key sequences in a
//! single linear pass, emits a minimal add/move/remove edit script, and
//! applies it against the container while leaving siblings outside the
//! managed region untouched.
//!
//! ```
//! use relist::{el, Content, KeySelector, Node, ReconcileError, ValueCell};
//! use serde_json::json;
//!
//! let names = ValueCell::with(vec![json!("ada"), json!("grace")]);
//! let list = el(
//!     "ul",
//!     Content::keyed(names.clone(), KeySelector::Identity, |name| {
//!         let item = Node::element("li");
//!         item.append_child(&Node::text(name.as_str().unwrap_or_default()))?;
//!         Ok(item)
//!     }),
//! )?;
//! assert_eq!(
//!     list.node.to_string(),
//!     "<ul><li>ada</li><li>grace</li><!----></ul>"
//! );
//!
//! // Reordering relocates the existing nodes instead of rebuilding them.
//! names.set(vec![json!("grace"), json!("ada")]);
//! assert_eq!(
//!     list.node.to_string(),
//!     "<ul><li>grace</li><li>ada</li><!----></ul>"
//! );
//! # Ok::<(), ReconcileError>(())
//! ```
mod binding;
mod cell;
mod diff_engine;
mod errors;
mod patcher;
mod tree;
mod types;
mod view;

pub use binding::{BindingState, ListBinding};
pub use cell::{Scheduler, Subscription, ValueCell};
pub use diff_engine::diff;
pub use errors::ReconcileError;
pub use patcher::{NodeFactory, PatchOutcome, Patcher};
pub use tree::{Node, NodeKind};
pub use types::{EditOp, Key, KeySelector};
pub use view::{el, mount, Content, Dynamic, KeyedList, Mounted};
