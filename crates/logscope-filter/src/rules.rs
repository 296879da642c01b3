use logscope_tree::{NodeId, ScopePath, ScopeTree};
use logscope_types::{PriorityMask, PriorityUpdate, SCOPE_ID_UNASSIGNED, ScopePriorityRecord};

/// A configured node found while walking a subtree
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodePriority {
    pub node: NodeId,
    pub priority: PriorityMask,
}

/// `id` and its descendants whose mask is not `NOT_SET`, in pre-order
pub fn extract_nodes_with_priority(tree: &ScopeTree, id: NodeId) -> Vec<NodePriority> {
    let mut found = configured(tree, std::iter::once(id));
    found.extend(extract_child_nodes_with_priority(tree, id));
    found
}

/// Descendants of `id` whose mask is not `NOT_SET`, in pre-order
pub fn extract_child_nodes_with_priority(tree: &ScopeTree, id: NodeId) -> Vec<NodePriority> {
    configured(tree, tree.descendants(id))
}

fn configured(tree: &ScopeTree, ids: impl IntoIterator<Item = NodeId>) -> Vec<NodePriority> {
    ids.into_iter()
        .filter_map(|node| tree.get(node).map(|n| (node, n.priority())))
        .filter(|(_, priority)| !priority.is_not_set())
        .map(|(node, priority)| NodePriority { node, priority })
        .collect()
}

/// Wire record for one node: a leaf names itself, anything else its subtree
pub fn priority_record(
    tree: &ScopeTree,
    id: NodeId,
    priority: PriorityMask,
) -> ScopePriorityRecord {
    let path = tree.make_path(id);
    match tree.get(id).and_then(|n| n.scope_id()) {
        Some(scope_id) => ScopePriorityRecord::new(scope_id, priority, path),
        None => ScopePriorityRecord::new(
            SCOPE_ID_UNASSIGNED,
            priority,
            ScopePath::wildcard_of(&path),
        ),
    }
}

/// Update carrying the node's own mask as a single record
pub fn single_node_update(tree: &ScopeTree, id: NodeId) -> PriorityUpdate {
    let priority = tree.get(id).map(|n| n.priority()).unwrap_or_default();
    PriorityUpdate::new(tree.instance_id(), vec![priority_record(tree, id, priority)])
}

/// Update describing the configured descendants of `id`.
///
/// When the subtree holds no configuration at all, the node's own mask is
/// sent instead so the producer always receives at least one record.
pub fn build_live_update(tree: &ScopeTree, id: NodeId) -> PriorityUpdate {
    let records: Vec<_> = extract_child_nodes_with_priority(tree, id)
        .into_iter()
        .map(|np| priority_record(tree, np.node, np.priority))
        .collect();

    if records.is_empty() {
        single_node_update(tree, id)
    } else {
        PriorityUpdate::new(tree.instance_id(), records)
    }
}

/// `(scope_id, mask)` pairs of the leafs below `id` that carry an identifier.
///
/// Unconfigured leafs are reported with `default_mask`.
pub fn leaf_filters(
    tree: &ScopeTree,
    id: NodeId,
    default_mask: PriorityMask,
) -> Vec<(u32, PriorityMask)> {
    tree.leafs(id)
        .into_iter()
        .filter_map(|leaf| {
            let node = tree.get(leaf)?;
            let scope_id = node.scope_id().filter(|s| *s != SCOPE_ID_UNASSIGNED)?;
            let mask = if node.priority().is_not_set() {
                default_mask
            } else {
                node.priority()
            };
            Some((scope_id, mask))
        })
        .collect()
}
