//! Error handling that never panics and names the node or index at fault.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("node factory failed: {details}")]
    Factory { details: String },

    #[error("edit script references index {index} outside a range of {len}")]
    EditOutOfRange { index: usize, len: usize },

    #[error("node #{id} is not a child of node #{container}")]
    NotAChild { id: usize, container: usize },

    #[error("node #{id} cannot contain children")]
    NotAContainer { id: usize },

    #[error("binding is already attached to a container")]
    AlreadyAttached,
}

impl ReconcileError {
    /// Shorthand for a factory failure with a caller-supplied message.
    pub fn factory(details: impl Into<String>) -> Self {
        ReconcileError::Factory {
            details: details.into(),
        }
    }
}
