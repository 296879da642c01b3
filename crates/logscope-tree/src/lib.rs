//! Scope tree for logscope
//!
//! This crate splits scope paths, builds one tree per producing instance,
//! keeps node masks aggregated from their leafs, and groups the trees into a
//! model that publishes change notifications.

mod error;
mod model;
mod node;
mod path;
mod propagation;
mod search;
mod tree;

pub use error::ScopeError;
pub use model::{RegisterReport, ScopeEvent, ScopesModel};
pub use node::{Children, NodeId, NodeKind, ScopeNode};
pub use path::{ScopePath, split_scope_path};
pub use search::ScopeMatcher;
pub use tree::ScopeTree;

// Re-export types used in our public API
pub use logscope_types::{InstanceId, InstanceInfo, PriorityMask, ScopeInfo};
