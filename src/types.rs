//! Keys, key selection, and edit operations shared across the engine.
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Stable identity of a list element across snapshots.
///
/// Keys are compared by equality only. Non-integral numbers are keyed by
/// their canonical display form so the key stays hashable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Str(String),
    Int(i64),
    Bool(bool),
    Num(String),
}

impl Key {
    /// Derive a key from a primitive JSON value. Objects, arrays and null
    /// carry no identity of their own.
    pub fn from_primitive(value: &Value) -> Option<Key> {
        match value {
            Value::String(s) => Some(Key::Str(s.clone())),
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => Key::Int(i),
                None => Key::Num(n.to_string()),
            }),
            Value::Bool(b) => Some(Key::Bool(*b)),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(s) => write!(f, "{s:?}"),
            Key::Int(i) => write!(f, "{i}"),
            Key::Bool(b) => write!(f, "{b}"),
            Key::Num(n) => write!(f, "{n}"),
        }
    }
}

/// How a list element maps to its [`Key`].
#[derive(Debug, Clone)]
pub enum KeySelector {
    /// The element is its own key; valid for primitive elements only.
    Identity,
    /// The key is the value of a named field on an object element.
    Field(String),
}

impl KeySelector {
    pub fn field(name: impl Into<String>) -> Self {
        KeySelector::Field(name.into())
    }

    /// Derive the key for one element. `None` means the element has no usable
    /// identity (null, missing field, non-primitive key) and is skipped when
    /// producing content.
    pub fn key_of(&self, element: &Value) -> Option<Key> {
        match self {
            KeySelector::Identity => Key::from_primitive(element),
            KeySelector::Field(name) => element.get(name).and_then(Key::from_primitive),
        }
    }
}

/// One step of an edit script transforming the old rendered state into the
/// new one.
///
/// `to`, `from` and `index` are positions in the *old* child indexing, which
/// stays stable for the whole script: removals are never renumbered and moved
/// slots are tombstoned rather than compacted. `new_index` points into the
/// new element list. Operations are emitted in scan order and must be applied
/// in that order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "UPPERCASE")]
pub enum EditOp {
    Add { new_index: usize, to: usize },
    Move { from: usize, to: usize },
    Remove { index: usize },
}

/// Global ID generator (lock-free, atomic).
static ID_COUNTER: Lazy<AtomicUsize> = Lazy::new(|| AtomicUsize::new(0));

pub(crate) fn next_node_id() -> usize {
    ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_selector_keys_primitives() {
        let selector = KeySelector::Identity;
        assert_eq!(selector.key_of(&json!("a")), Some(Key::Str("a".into())));
        assert_eq!(selector.key_of(&json!(7)), Some(Key::Int(7)));
        assert_eq!(selector.key_of(&json!(true)), Some(Key::Bool(true)));
        assert_eq!(selector.key_of(&json!(1.5)), Some(Key::Num("1.5".into())));
    }

    #[test]
    fn identity_selector_rejects_structured_values() {
        let selector = KeySelector::Identity;
        assert_eq!(selector.key_of(&json!(null)), None);
        assert_eq!(selector.key_of(&json!({"id": 1})), None);
        assert_eq!(selector.key_of(&json!([1, 2])), None);
    }

    #[test]
    fn field_selector_reads_the_named_field() {
        let selector = KeySelector::field("id");
        assert_eq!(
            selector.key_of(&json!({"id": 3, "label": "x"})),
            Some(Key::Int(3))
        );
        assert_eq!(selector.key_of(&json!({"label": "x"})), None);
        assert_eq!(selector.key_of(&json!("not-an-object")), None);
    }

    #[test]
    fn edit_ops_serialize_with_uppercase_tags() {
        let op = EditOp::Add {
            new_index: 1,
            to: 2,
        };
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({"op": "ADD", "new_index": 1, "to": 2})
        );
        let op = EditOp::Remove { index: 0 };
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({"op": "REMOVE", "index": 0})
        );
    }

    #[test]
    fn integer_and_string_keys_do_not_collide() {
        assert_ne!(Key::Int(1), Key::Str("1".into()));
    }
}
