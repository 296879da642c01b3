use logscope_types::{InstanceId, InstanceInfo, PriorityMask, ScopeInfo};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::node::NodeId;
use crate::{ScopeError, ScopePath, ScopeTree};

/// Change notification published after a model mutation completes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScopeEvent {
    /// Roots were appended at positions `first..first + count`
    RootsInserted { first: usize, count: usize },

    /// A root and its whole subtree were dropped
    RootRemoved {
        instance_id: InstanceId,
        position: usize,
    },

    /// Every root was dropped
    Reset,

    /// New nodes or leafs were attached below a root
    ScopesInserted { instance_id: InstanceId, created: usize },

    /// Masks below a root changed without structural change
    ScopesUpdated { instance_id: InstanceId },

    /// A user mutation changed masks of a subtree
    PrioritiesChanged { instance_id: InstanceId, node: NodeId },
}

/// Outcome of registering a batch of producer scopes
#[derive(Debug, Default)]
pub struct RegisterReport {
    /// Nodes and leafs created by the batch
    pub created: usize,

    /// Scopes refused with their reason
    pub rejected: Vec<(String, ScopeError)>,
}

impl RegisterReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Forest of scope trees, one per producing instance
#[derive(Debug, Default)]
pub struct ScopesModel {
    /// Roots in arrival order, unique by instance id
    roots: Vec<ScopeTree>,

    /// Presentation layer subscriber
    events: Option<mpsc::UnboundedSender<ScopeEvent>>,
}

impl ScopesModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to change notifications, replacing any previous subscriber
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ScopeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    fn emit(&mut self, event: ScopeEvent) {
        let closed = match &self.events {
            Some(tx) => tx.send(event).is_err(),
            None => false,
        };
        if closed {
            // Subscriber went away
            self.events = None;
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn roots(&self) -> &[ScopeTree] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn tree(&self, instance_id: InstanceId) -> Option<&ScopeTree> {
        self.roots.iter().find(|t| t.instance_id() == instance_id)
    }

    fn tree_mut(&mut self, instance_id: InstanceId) -> Result<&mut ScopeTree, ScopeError> {
        self.roots
            .iter_mut()
            .find(|t| t.instance_id() == instance_id)
            .ok_or(ScopeError::UnknownInstance(instance_id))
    }

    /// Position of an instance's root among all roots
    pub fn position(&self, instance_id: InstanceId) -> Option<usize> {
        self.roots.iter().position(|t| t.instance_id() == instance_id)
    }

    /// Linear index of a node within its parent; roots map to their position
    pub fn index_of(&self, instance_id: InstanceId, node: NodeId) -> Option<usize> {
        let tree = self.tree(instance_id)?;
        if node == tree.root() {
            self.position(instance_id)
        } else {
            tree.index_in_parent(node)
        }
    }

    /// Resolve a user-supplied path; empty and `*` address the root
    pub fn node_at_path(&self, instance_id: InstanceId, path: &str) -> Result<NodeId, ScopeError> {
        let tree = self
            .tree(instance_id)
            .ok_or(ScopeError::UnknownInstance(instance_id))?;

        let parsed = ScopePath::parse(path)?;
        if parsed.is_empty() {
            return Ok(tree.root());
        }
        parsed
            .segments()
            .iter()
            .try_fold(tree.root(), |current, segment| tree.find_child(current, segment))
            .ok_or_else(|| ScopeError::malformed(path, "no such scope"))
    }

    // ========================================================================
    // Instance Lifecycle
    // ========================================================================

    /// Add a root per new instance; already known instances are ignored
    pub fn add_instances(&mut self, instances: &[InstanceInfo]) -> usize {
        let first = self.roots.len();

        for instance in instances {
            if self.position(instance.instance_id).is_some() {
                debug!(instance = instance.instance_id, "instance already known");
                continue;
            }
            info!(instance = instance.instance_id, name = %instance.name, "instance connected");
            self.roots.push(ScopeTree::from_instance(instance));
        }

        let count = self.roots.len() - first;
        if count > 0 {
            self.emit(ScopeEvent::RootsInserted { first, count });
        }
        count
    }

    /// Drop the roots of disconnected instances with their subtrees
    pub fn remove_instances(&mut self, instance_ids: &[InstanceId]) -> usize {
        let mut removed = 0;

        for &instance_id in instance_ids {
            if let Some(position) = self.position(instance_id) {
                self.roots.remove(position);
                removed += 1;
                info!(instance = instance_id, "instance disconnected");
                self.emit(ScopeEvent::RootRemoved {
                    instance_id,
                    position,
                });
            }
        }
        removed
    }

    /// Drop every root
    pub fn clear(&mut self) {
        self.roots.clear();
        self.emit(ScopeEvent::Reset);
    }

    // ========================================================================
    // Producer Notifications
    // ========================================================================

    /// Insert or merge announced scopes, then refresh aggregates.
    ///
    /// Scopes that fail to insert are logged and reported individually; the
    /// rest of the batch is still applied.
    pub fn register_scopes(
        &mut self,
        instance_id: InstanceId,
        scopes: &[ScopeInfo],
    ) -> Result<RegisterReport, ScopeError> {
        let tree = self.tree_mut(instance_id)?;
        let mut report = RegisterReport::default();

        for scope in scopes {
            match tree.insert_or_merge(&scope.name, scope.mask(), scope.scope_id) {
                Ok(created) => report.created += created,
                Err(e) => {
                    warn!(instance = instance_id, scope = %scope.name, "rejected scope: {}", e);
                    report.rejected.push((scope.name.clone(), e));
                }
            }
        }
        tree.refresh_aggregates();

        if report.created > 0 {
            self.emit(ScopeEvent::ScopesInserted {
                instance_id,
                created: report.created,
            });
        } else {
            self.emit(ScopeEvent::ScopesUpdated { instance_id });
        }
        Ok(report)
    }

    /// Replace masks reported by the producer, then refresh aggregates.
    ///
    /// Returns how many of the reported paths matched a node.
    pub fn update_scopes(
        &mut self,
        instance_id: InstanceId,
        scopes: &[ScopeInfo],
    ) -> Result<usize, ScopeError> {
        let tree = self.tree_mut(instance_id)?;
        let mut applied = 0;

        for scope in scopes {
            match tree.apply_priority_at_path(&scope.name, scope.mask()) {
                Ok(Some(_)) => applied += 1,
                Ok(None) => debug!(
                    instance = instance_id,
                    scope = %scope.name,
                    "update for unknown scope"
                ),
                Err(e) => warn!(
                    instance = instance_id,
                    scope = %scope.name,
                    "ignored scope update: {}", e
                ),
            }
        }
        tree.refresh_aggregates();

        self.emit(ScopeEvent::ScopesUpdated { instance_id });
        Ok(applied)
    }

    // ========================================================================
    // User Mutations
    // ========================================================================

    /// Replace the masks of a subtree
    pub fn set_priority(
        &mut self,
        instance_id: InstanceId,
        node: NodeId,
        mask: PriorityMask,
    ) -> Result<bool, ScopeError> {
        self.mutate(instance_id, node, |tree| tree.set_priority(node, mask))
    }

    /// Enable severities for a subtree
    pub fn add_priority(
        &mut self,
        instance_id: InstanceId,
        node: NodeId,
        bits: PriorityMask,
    ) -> Result<bool, ScopeError> {
        self.mutate(instance_id, node, |tree| tree.add_priority(node, bits))
    }

    /// Disable severities for a subtree
    pub fn remove_priority(
        &mut self,
        instance_id: InstanceId,
        node: NodeId,
        bits: PriorityMask,
    ) -> Result<bool, ScopeError> {
        self.mutate(instance_id, node, |tree| tree.remove_priority(node, bits))
    }

    fn mutate<F>(
        &mut self,
        instance_id: InstanceId,
        node: NodeId,
        op: F,
    ) -> Result<bool, ScopeError>
    where
        F: FnOnce(&mut ScopeTree) -> Result<bool, ScopeError>,
    {
        let tree = self.tree_mut(instance_id)?;
        let changed = op(tree)?;
        if changed {
            tree.refresh_aggregates();
            self.emit(ScopeEvent::PrioritiesChanged { instance_id, node });
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instances() -> Vec<InstanceInfo> {
        vec![InstanceInfo::new(10, "alpha"), InstanceInfo::new(20, "beta")]
    }

    fn scopes() -> Vec<ScopeInfo> {
        vec![
            ScopeInfo::new("Svc::Comp::Init", 1, PriorityMask::DEBUG),
            ScopeInfo::new("Svc::Comp::Work", 2, PriorityMask::INFO),
            ScopeInfo::new("Svc::Main", 3, PriorityMask::ERROR),
        ]
    }

    #[test]
    fn test_add_instances_ignores_duplicates() {
        let mut model = ScopesModel::new();
        let mut rx = model.subscribe();

        assert_eq!(model.add_instances(&instances()), 2);
        assert_eq!(model.add_instances(&[InstanceInfo::new(10, "again")]), 0);

        assert_eq!(model.len(), 2);
        assert_eq!(model.tree(10).unwrap().name(), "alpha");
        assert_eq!(rx.try_recv().unwrap(), ScopeEvent::RootsInserted { first: 0, count: 2 });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_remove_instances_reports_positions() {
        let mut model = ScopesModel::new();
        model.add_instances(&instances());
        model.register_scopes(10, &scopes()).unwrap();
        let mut rx = model.subscribe();

        assert_eq!(model.remove_instances(&[10, 99]), 1);
        assert!(model.tree(10).is_none());
        assert_eq!(model.position(20), Some(0));
        assert_eq!(
            rx.try_recv().unwrap(),
            ScopeEvent::RootRemoved { instance_id: 10, position: 0 }
        );
    }

    #[test]
    fn test_clear_emits_reset() {
        let mut model = ScopesModel::new();
        model.add_instances(&instances());
        let mut rx = model.subscribe();

        model.clear();
        assert!(model.is_empty());
        assert_eq!(rx.try_recv().unwrap(), ScopeEvent::Reset);
    }

    #[test]
    fn test_register_scopes_inserts_then_updates() {
        let mut model = ScopesModel::new();
        model.add_instances(&instances());
        let mut rx = model.subscribe();

        let report = model.register_scopes(10, &scopes()).unwrap();
        assert_eq!(report.created, 5);
        assert!(report.is_clean());
        assert_eq!(
            rx.try_recv().unwrap(),
            ScopeEvent::ScopesInserted { instance_id: 10, created: 5 }
        );

        let tree = model.tree(10).unwrap();
        assert_eq!(
            tree[tree.root()].priority(),
            PriorityMask::DEBUG | PriorityMask::INFO | PriorityMask::ERROR
        );

        let report = model.register_scopes(10, &scopes()).unwrap();
        assert_eq!(report.created, 0);
        assert_eq!(rx.try_recv().unwrap(), ScopeEvent::ScopesUpdated { instance_id: 10 });
    }

    #[test]
    fn test_register_rejects_bad_scopes_individually() {
        let mut model = ScopesModel::new();
        model.add_instances(&instances());

        let batch = vec![
            ScopeInfo::new("Svc::Init", 1, PriorityMask::DEBUG),
            ScopeInfo::new("Svc", 2, PriorityMask::INFO),
            ScopeInfo::new("Bad::::Path", 3, PriorityMask::INFO),
            ScopeInfo::new("Svc::Work", 4, PriorityMask::WARNING),
        ];
        let report = model.register_scopes(10, &batch).unwrap();

        assert_eq!(report.rejected.len(), 2);
        assert!(matches!(report.rejected[0].1, ScopeError::StructuralConflict { .. }));
        assert!(matches!(report.rejected[1].1, ScopeError::MalformedPath { .. }));

        let tree = model.tree(10).unwrap();
        assert_eq!(tree.child_leafs_count(tree.find_child(tree.root(), "Svc").unwrap()), 2);
    }

    #[test]
    fn test_unknown_instance() {
        let mut model = ScopesModel::new();
        assert!(matches!(
            model.register_scopes(5, &scopes()),
            Err(ScopeError::UnknownInstance(5))
        ));
    }

    #[test]
    fn test_update_scopes_replaces_masks() {
        let mut model = ScopesModel::new();
        model.add_instances(&instances());
        model.register_scopes(10, &scopes()).unwrap();

        let update = vec![
            ScopeInfo::new("Svc::Comp::*", 0, PriorityMask::FATAL),
            ScopeInfo::new("Svc::Gone", 0, PriorityMask::FATAL),
        ];
        assert_eq!(model.update_scopes(10, &update).unwrap(), 1);

        let tree = model.tree(10).unwrap();
        let svc = tree.find_child(tree.root(), "Svc").unwrap();
        assert_eq!(tree[svc].priority(), PriorityMask::FATAL | PriorityMask::ERROR);
    }

    #[test]
    fn test_user_mutations_refresh_and_notify() {
        let mut model = ScopesModel::new();
        model.add_instances(&instances());
        model.register_scopes(10, &scopes()).unwrap();
        let mut rx = model.subscribe();

        let svc = model.node_at_path(10, "Svc").unwrap();
        assert!(model.remove_priority(10, svc, PriorityMask::DEBUG).unwrap());
        assert_eq!(
            rx.try_recv().unwrap(),
            ScopeEvent::PrioritiesChanged { instance_id: 10, node: svc }
        );

        let tree = model.tree(10).unwrap();
        assert_eq!(tree[svc].priority(), PriorityMask::INFO | PriorityMask::ERROR);

        assert!(!model.remove_priority(10, svc, PriorityMask::DEBUG).unwrap());
        assert!(rx.try_recv().is_err());

        let comp = model.node_at_path(10, "Svc::Comp").unwrap();
        assert!(model.set_priority(10, comp, PriorityMask::WARNING).unwrap());
        assert!(model.add_priority(10, comp, PriorityMask::INFO).unwrap());
        let tree = model.tree(10).unwrap();
        assert_eq!(
            tree[svc].priority(),
            PriorityMask::WARNING | PriorityMask::INFO | PriorityMask::ERROR
        );
    }

    #[test]
    fn test_index_helpers() {
        let mut model = ScopesModel::new();
        model.add_instances(&instances());
        model.register_scopes(20, &scopes()).unwrap();

        let tree = model.tree(20).unwrap();
        assert_eq!(model.index_of(20, tree.root()), Some(1));

        let main = model.node_at_path(20, "Svc::Main").unwrap();
        assert_eq!(model.index_of(20, main), Some(1));
        assert_eq!(model.node_at_path(20, "*").unwrap(), tree.root());
        assert!(model.node_at_path(20, "Svc::Nope").is_err());
    }
}
