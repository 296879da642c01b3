//! Collaborator interfaces for logscope
//!
//! This crate provides the instance-discovery feed and the transports used to
//! deliver priority updates to log producers.

mod feed;
mod transport;

pub use feed::EventFeed;
pub use transport::{
    ChannelTransport, ObserverRequest, PriorityTransport, RecordingTransport, TransportError,
};

// Re-export types used in our public API
pub use logscope_types::{DiscoveryEvent, PriorityUpdate, ScopePriorityRecord};
