use logscope_observer::TransportError;
use logscope_tree::ScopeError;
use logscope_types::InstanceId;

/// Errors raised while turning tree state into filter rules
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    /// No persisted store is attached; nothing was changed
    #[error("log store is not available")]
    StoreUnavailable,

    /// The live update could not be delivered; the tree keeps the new masks
    #[error(
        "failed to deliver request{}",
        target.map(|t| format!(" to instance {}", t)).unwrap_or_default()
    )]
    DeliveryFailed {
        target: Option<InstanceId>,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error("log store query failed: {0}")]
    Sql(#[from] rusqlite::Error),
}
