use logscope_types::InstanceId;

/// Errors raised while building or addressing a scope tree
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// Empty path, empty segment or a path longer than the transport allows
    #[error("malformed scope path '{path}': {reason}")]
    MalformedPath { path: String, reason: &'static str },

    /// A segment name is already used by a child of the other kind
    #[error("scope path '{path}' conflicts with existing {existing} '{name}'")]
    StructuralConflict {
        path: String,
        name: String,
        existing: &'static str,
    },

    /// No root is registered for the instance
    #[error("unknown instance {0}")]
    UnknownInstance(InstanceId),

    /// The node handle does not belong to the tree
    #[error("node {0} is not part of the tree")]
    UnknownNode(usize),
}

impl ScopeError {
    pub(crate) fn malformed(path: &str, reason: &'static str) -> Self {
        Self::MalformedPath {
            path: path.to_string(),
            reason,
        }
    }
}
