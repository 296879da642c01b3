//! Filter rule builders for logscope
//!
//! This crate turns scope tree state into priority updates for live producers
//! and into SQL filter rules for a persisted log store.

mod error;
mod live;
mod offline;
mod rules;
mod store;

pub use error::FilterError;
pub use live::LiveScopeController;
pub use offline::OfflineScopeController;
pub use rules::{
    NodePriority, build_live_update, extract_child_nodes_with_priority,
    extract_nodes_with_priority, leaf_filters, priority_record, single_node_update,
};
pub use store::{FilterStore, LogRow};
