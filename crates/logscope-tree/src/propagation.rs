use logscope_types::PriorityMask;
use tracing::debug;

use crate::node::NodeId;
use crate::{ScopeError, ScopePath, ScopeTree};

// ============================================================================
// Broadcast Mutations
// ============================================================================

impl ScopeTree {
    /// Replace the mask of `id` and every descendant.
    ///
    /// Returns whether any stored mask changed.
    pub fn set_priority(&mut self, id: NodeId, mask: PriorityMask) -> Result<bool, ScopeError> {
        let mask = mask.normalized();
        self.broadcast(id, |_| mask)
    }

    /// OR `bits` into `id` and every descendant
    pub fn add_priority(&mut self, id: NodeId, bits: PriorityMask) -> Result<bool, ScopeError> {
        self.broadcast(id, |current| current.merge(bits))
    }

    /// Clear `bits` from `id` and every descendant
    pub fn remove_priority(&mut self, id: NodeId, bits: PriorityMask) -> Result<bool, ScopeError> {
        // Removing NOT_SET alone would leave an unconfigured node reading as OFF
        let bits = bits - PriorityMask::NOT_SET;
        self.broadcast(id, |current| current.without(bits))
    }

    fn broadcast<F>(&mut self, id: NodeId, update: F) -> Result<bool, ScopeError>
    where
        F: Fn(PriorityMask) -> PriorityMask,
    {
        self.check(id)?;

        let mut changed = false;
        for target in std::iter::once(id).chain(self.descendants(id)) {
            let node = self.node_mut(target);
            let next = update(node.priority);
            if next != node.priority {
                node.priority = next;
                changed = true;
            }
        }

        if changed {
            debug!(
                instance = self.instance_id(),
                path = %self.make_path(id),
                "priorities changed"
            );
        }
        Ok(changed)
    }

    // ========================================================================
    // Reset and Refresh
    // ========================================================================

    /// Set every internal node under and including `id` back to `NOT_SET`.
    ///
    /// Leafs are cleared as well unless `skip_leafs` is true.
    pub fn reset_priorities(&mut self, id: NodeId, skip_leafs: bool) -> Result<(), ScopeError> {
        self.check(id)?;
        self.clear(id, skip_leafs);
        Ok(())
    }

    fn clear(&mut self, id: NodeId, skip_leafs: bool) {
        for target in std::iter::once(id).chain(self.descendants(id)) {
            let node = self.node_mut(target);
            if !(skip_leafs && node.is_leaf()) {
                node.priority = PriorityMask::NOT_SET;
            }
        }
    }

    /// Recompute internal masks under and including `id` bottom-up, then
    /// every ancestor of `id` up to the root.
    ///
    /// Every internal node with at least one leaf descendant ends up holding the
    /// union of its leafs' masks. Leaf masks are never modified; internal nodes
    /// without leafs keep their current mask.
    pub fn refresh_priorities(&mut self, id: NodeId) -> Result<(), ScopeError> {
        self.check(id)?;
        self.aggregate(id);

        let mut next = self[id].parent();
        while let Some(ancestor) = next {
            let leafs = self.leafs(ancestor);
            if !leafs.is_empty() {
                let union = leafs
                    .iter()
                    .fold(PriorityMask::empty(), |acc, leaf| acc | self[*leaf].priority());
                self.node_mut(ancestor).priority = union.normalized();
            }
            next = self[ancestor].parent();
        }
        Ok(())
    }

    /// Reset and refresh the whole tree, keeping leaf masks
    pub fn refresh_aggregates(&mut self) {
        let root = self.root();
        self.clear(root, true);
        self.aggregate(root);
    }

    /// Union of the leaf masks below `id`, `None` when there are no leafs
    fn aggregate(&mut self, id: NodeId) -> Option<PriorityMask> {
        if self[id].is_leaf() {
            return Some(self[id].priority());
        }

        let mut union: Option<PriorityMask> = None;
        for child in self.children(id) {
            if let Some(mask) = self.aggregate(child) {
                union = Some(union.map_or(mask, |acc| acc | mask));
            }
        }

        let union = union.map(PriorityMask::normalized);
        if let Some(mask) = union {
            self.node_mut(id).priority = mask;
        }
        union
    }

    // ========================================================================
    // Producer Updates
    // ========================================================================

    /// Replace masks addressed by a path reported by the producer.
    ///
    /// A plain path replaces the mask of the node it names; a wildcard path
    /// replaces the whole subtree, `*` alone meaning every scope of the
    /// instance. Returns the addressed node, or `None` when the path is unknown.
    pub fn apply_priority_at_path(
        &mut self,
        path: &str,
        mask: PriorityMask,
    ) -> Result<Option<NodeId>, ScopeError> {
        let parsed = ScopePath::parse(path)?;

        let target = if parsed.is_empty() {
            if !parsed.is_wildcard() {
                return Err(ScopeError::malformed(path, "empty path"));
            }
            Some(self.root())
        } else {
            parsed
                .segments()
                .iter()
                .try_fold(self.root(), |current, segment| self.find_child(current, segment))
        };

        if let Some(id) = target {
            self.set_priority(id, mask)?;
        }
        Ok(target)
    }
}
