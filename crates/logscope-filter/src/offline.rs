use logscope_tree::{NodeId, ScopeError, ScopeEvent, ScopesModel};
use logscope_types::{InstanceId, PriorityMask, ScopeInfo};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::FilterError;
use crate::rules::leaf_filters;
use crate::store::{FilterStore, LogRow};

/// Scope model built from a persisted log store.
///
/// Priority changes are written to the store's filter rules so that log
/// queries only return rows of enabled severities.
pub struct OfflineScopeController {
    model: ScopesModel,
    store: Option<FilterStore>,
}

impl Default for OfflineScopeController {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineScopeController {
    /// Controller without a store; every filter operation reports `StoreUnavailable`
    pub fn new() -> Self {
        Self {
            model: ScopesModel::new(),
            store: None,
        }
    }

    /// Build one tree per recorded instance from its filter rules.
    ///
    /// Missing rules are seeded first; leaf masks then come from the stored
    /// rules so edits made before a reopen are kept.
    pub fn open(store: FilterStore) -> Result<Self, FilterError> {
        let seeded = store.seed_filter_rules()?;

        let mut model = ScopesModel::new();
        let instances = store.instances()?;
        model.add_instances(&instances);

        for instance in &instances {
            let rules = store.filter_rules(instance.instance_id)?;
            let scopes: Vec<ScopeInfo> = store
                .scopes(instance.instance_id)?
                .into_iter()
                .map(|mut scope| {
                    if let Some(rule) = rules.get(&scope.scope_id) {
                        scope.priority = store.tree_mask(*rule).bits();
                    }
                    scope
                })
                .collect();

            let report = model.register_scopes(instance.instance_id, &scopes)?;
            for (name, e) in &report.rejected {
                warn!(
                    instance = instance.instance_id,
                    scope = %name,
                    "skipped stored scope: {}", e
                );
            }
        }

        info!(instances = instances.len(), seeded, "opened log store");

        Ok(Self {
            model,
            store: Some(store),
        })
    }

    pub fn model(&self) -> &ScopesModel {
        &self.model
    }

    pub fn store(&self) -> Option<&FilterStore> {
        self.store.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.store.is_some()
    }

    /// Detach the store, keeping the in-memory trees
    pub fn close(&mut self) -> Option<FilterStore> {
        self.store.take()
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ScopeEvent> {
        self.model.subscribe()
    }

    fn require_store(&self) -> Result<(), FilterError> {
        if self.store.is_some() {
            Ok(())
        } else {
            Err(FilterError::StoreUnavailable)
        }
    }

    // ========================================================================
    // Priority Changes
    // ========================================================================

    /// Replace the masks of a subtree and persist its leafs' rules
    pub fn set_log_priority(
        &mut self,
        instance_id: InstanceId,
        node: NodeId,
        mask: PriorityMask,
    ) -> Result<bool, FilterError> {
        self.require_store()?;
        let changed = self.model.set_priority(instance_id, node, mask)?;
        self.persist(instance_id, node, changed)
    }

    /// Enable severities for a subtree and persist its leafs' rules
    pub fn add_log_priority(
        &mut self,
        instance_id: InstanceId,
        node: NodeId,
        bits: PriorityMask,
    ) -> Result<bool, FilterError> {
        self.require_store()?;
        let changed = self.model.add_priority(instance_id, node, bits)?;
        self.persist(instance_id, node, changed)
    }

    /// Disable severities for a subtree and persist its leafs' rules
    pub fn remove_log_priority(
        &mut self,
        instance_id: InstanceId,
        node: NodeId,
        bits: PriorityMask,
    ) -> Result<bool, FilterError> {
        self.require_store()?;
        let changed = self.model.remove_priority(instance_id, node, bits)?;
        self.persist(instance_id, node, changed)
    }

    fn persist(
        &mut self,
        instance_id: InstanceId,
        node: NodeId,
        changed: bool,
    ) -> Result<bool, FilterError> {
        if !changed {
            return Ok(false);
        }

        let store = self.store.as_mut().ok_or(FilterError::StoreUnavailable)?;
        let Some(tree) = self.model.tree(instance_id) else {
            return Ok(changed);
        };

        let masks = leaf_filters(tree, node, store.default_mask());
        if !masks.is_empty() {
            store.apply_filters(instance_id, &masks)?;
        }
        Ok(changed)
    }

    /// Put every scope of an instance back to the default mask, the tree
    /// reading it back the way a reopened store does
    pub fn reset_filters(&mut self, instance_id: InstanceId) -> Result<usize, FilterError> {
        let store = self.store.as_mut().ok_or(FilterError::StoreUnavailable)?;
        let root = self
            .model
            .tree(instance_id)
            .map(|t| t.root())
            .ok_or(ScopeError::UnknownInstance(instance_id))?;

        let mask = store.tree_mask(store.default_mask());
        self.model.set_priority(instance_id, root, mask)?;
        store.reset_filters(instance_id)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Rows of an instance passing its current filter rules
    pub fn filtered_logs(
        &self,
        instance_id: InstanceId,
        limit: usize,
    ) -> Result<Vec<LogRow>, FilterError> {
        let store = self.store.as_ref().ok_or(FilterError::StoreUnavailable)?;
        store.filtered_logs(instance_id, limit)
    }

    pub fn count_filtered_logs(&self, instance_id: InstanceId) -> Result<usize, FilterError> {
        let store = self.store.as_ref().ok_or(FilterError::StoreUnavailable)?;
        store.count_filtered_logs(instance_id)
    }
}
