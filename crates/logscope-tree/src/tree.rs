use std::ops::Index;

use logscope_types::{InstanceId, InstanceInfo, PriorityMask, SCOPE_ID_UNASSIGNED};
use tracing::debug;

use crate::node::{NodeId, NodeKind, ScopeNode};
use crate::{ScopeError, ScopePath};

/// Index of the root in every tree's arena
const ROOT: NodeId = NodeId(0);

/// Scope hierarchy of one producing instance.
///
/// Nodes are stored in an arena owned by the tree; parents keep named maps of
/// child handles and children keep a handle of their parent. Nodes are never
/// removed individually, so handles stay valid for the lifetime of the tree.
#[derive(Clone, Debug)]
pub struct ScopeTree {
    instance_id: InstanceId,
    nodes: Vec<ScopeNode>,
}

impl ScopeTree {
    /// Create an empty tree for an instance
    pub fn new(instance_id: InstanceId, name: impl Into<String>) -> Self {
        Self {
            instance_id,
            nodes: vec![ScopeNode::root(instance_id, name.into())],
        }
    }

    /// Create an empty tree from discovery metadata
    pub fn from_instance(instance: &InstanceInfo) -> Self {
        Self::new(instance.instance_id, instance.name.clone())
    }

    pub fn root(&self) -> NodeId {
        ROOT
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// Instance name shown for the root
    pub fn name(&self) -> &str {
        &self.nodes[ROOT.0].name
    }

    pub fn get(&self, id: NodeId) -> Option<&ScopeNode> {
        self.nodes.get(id.0)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    /// Total number of nodes including the root
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when no scope was inserted yet
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// All node handles in arena order
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut ScopeNode {
        &mut self.nodes[id.0]
    }

    pub(crate) fn check(&self, id: NodeId) -> Result<(), ScopeError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(ScopeError::UnknownNode(id.0))
        }
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Insert a scope path or merge it into the existing structure.
    ///
    /// Returns the number of newly created nodes and leafs. Priorities along
    /// the path are OR-merged, never replaced. A name collision between a node
    /// and a leaf fails the whole insert without touching the tree.
    pub fn insert_or_merge(
        &mut self,
        path: &str,
        priority: PriorityMask,
        scope_id: u32,
    ) -> Result<usize, ScopeError> {
        let parsed = ScopePath::parse(path)?;
        if parsed.is_wildcard() {
            return Err(ScopeError::malformed(path, "cannot insert a wildcard path"));
        }
        self.insert_segments(parsed.segments(), priority, scope_id)
    }

    /// Insert pre-split segments, see [`ScopeTree::insert_or_merge`]
    pub fn insert_segments(
        &mut self,
        segments: &[String],
        priority: PriorityMask,
        scope_id: u32,
    ) -> Result<usize, ScopeError> {
        if segments.is_empty() {
            return Err(ScopeError::malformed("", "empty path"));
        }
        self.check_conflicts(segments)?;

        let priority = priority.normalized();
        let root = self.node_mut(ROOT);
        root.priority = root.priority.merge(priority);

        let mut created = 0;
        let mut current = ROOT;
        let last = segments.len() - 1;

        for (depth, segment) in segments.iter().enumerate() {
            let Some(children) = self.nodes[current.0].children() else {
                return Err(ScopeError::UnknownNode(current.0));
            };

            if depth < last {
                current = match children.node(segment) {
                    Some(child) => {
                        let node = self.node_mut(child);
                        node.priority = node.priority.merge(priority);
                        child
                    }
                    None => {
                        created += 1;
                        self.attach(current, ScopeNode::node(segment.clone(), priority, current))
                    }
                };
            } else {
                match children.leaf(segment) {
                    Some(child) => {
                        let leaf = self.node_mut(child);
                        leaf.priority = leaf.priority.merge(priority);
                        if scope_id != SCOPE_ID_UNASSIGNED {
                            leaf.kind = NodeKind::Leaf { scope_id };
                        }
                    }
                    None => {
                        created += 1;
                        self.attach(
                            current,
                            ScopeNode::leaf(segment.clone(), priority, scope_id, current),
                        );
                    }
                }
            }
        }

        if created > 0 {
            debug!(
                instance = self.instance_id(),
                path = %ScopePath::join(segments),
                created,
                "inserted scope"
            );
        }

        Ok(created)
    }

    /// Walk the existing part of the path looking for kind collisions
    fn check_conflicts(&self, segments: &[String]) -> Result<(), ScopeError> {
        let last = segments.len() - 1;
        let mut current = ROOT;

        for (depth, segment) in segments.iter().enumerate() {
            let Some(children) = self.nodes[current.0].children() else {
                break;
            };

            let conflict = if depth < last {
                children.contains_leaf(segment).then_some("leaf")
            } else {
                children.contains_node(segment).then_some("node")
            };

            if let Some(existing) = conflict {
                return Err(ScopeError::StructuralConflict {
                    path: ScopePath::join(segments),
                    name: segment.clone(),
                    existing,
                });
            }

            match children.node(segment) {
                Some(child) => current = child,
                None => break,
            }
        }

        Ok(())
    }

    fn attach(&mut self, parent: NodeId, node: ScopeNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        let name = node.name.clone();
        let is_leaf = node.is_leaf();
        self.nodes.push(node);

        if let Some(children) = self.nodes[parent.0].children_mut() {
            if is_leaf {
                children.insert_leaf(name, id);
            } else {
                children.insert_node(name, id);
            }
        }
        id
    }

    // ========================================================================
    // Lookup and Enumeration
    // ========================================================================

    /// Direct child with the given name, of either kind
    pub fn find_child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.get(id)?.children()?.get(name)
    }

    /// Descend from `id` following the segments of `path`.
    ///
    /// A trailing wildcard is ignored; an empty or malformed path finds nothing.
    pub fn find_by_path(&self, id: NodeId, path: &str) -> Option<NodeId> {
        let parsed = ScopePath::parse(path).ok()?;
        if parsed.is_empty() {
            return None;
        }
        parsed
            .segments()
            .iter()
            .try_fold(id, |current, segment| self.find_child(current, segment))
    }

    /// Direct children in enumeration order
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.get(id)
            .and_then(ScopeNode::children)
            .map(|children| children.ids().collect())
            .unwrap_or_default()
    }

    pub fn child_at(&self, id: NodeId, pos: usize) -> Option<NodeId> {
        self.get(id)?.children()?.at(pos)
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.get(id)
            .and_then(ScopeNode::children)
            .map_or(0, |c| c.len())
    }

    pub fn child_nodes_count(&self, id: NodeId) -> usize {
        self.get(id)
            .and_then(ScopeNode::children)
            .map_or(0, |c| c.nodes_len())
    }

    pub fn child_leafs_count(&self, id: NodeId) -> usize {
        self.get(id)
            .and_then(ScopeNode::children)
            .map_or(0, |c| c.leafs_len())
    }

    pub fn has_children(&self, id: NodeId) -> bool {
        self.child_count(id) != 0
    }

    /// Enumeration index of a named child of `id`
    pub fn position(&self, id: NodeId, name: &str) -> Option<usize> {
        self.get(id)?.children()?.position(name)
    }

    /// Enumeration index of `id` within its parent
    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let node = self.get(id)?;
        self.position(node.parent?, &node.name)
    }

    /// Scope path from the root, empty for the root itself
    pub fn make_path(&self, id: NodeId) -> String {
        let mut names = Vec::new();
        let mut current = self.get(id);
        while let Some(node) = current {
            if node.is_root() {
                break;
            }
            names.push(node.name.as_str());
            current = node.parent.and_then(|parent| self.get(parent));
        }
        names.reverse();
        ScopePath::join(&names)
    }

    /// Text shown for a node in a view
    pub fn display_name(&self, id: NodeId) -> String {
        match self.get(id) {
            Some(node) if node.is_root() => format!("{} ({})", node.name, self.instance_id()),
            Some(node) => node.name.clone(),
            None => String::new(),
        }
    }

    /// All descendants of `id` in depth-first pre-order, excluding `id`
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).into_iter().rev().collect();
        while let Some(current) = stack.pop() {
            result.push(current);
            stack.extend(self.children(current).into_iter().rev());
        }
        result
    }

    /// Leaf descendants of `id`; a leaf returns itself
    pub fn leafs(&self, id: NodeId) -> Vec<NodeId> {
        match self.get(id) {
            Some(node) if node.is_leaf() => vec![id],
            Some(_) => self
                .descendants(id)
                .into_iter()
                .filter(|d| self.nodes[d.0].is_leaf())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Leaf carrying the given producer-assigned scope identifier
    pub fn find_leaf_by_scope_id(&self, scope_id: u32) -> Option<NodeId> {
        if scope_id == SCOPE_ID_UNASSIGNED {
            return None;
        }
        self.nodes
            .iter()
            .position(|node| node.scope_id() == Some(scope_id))
            .map(NodeId)
    }
}

impl Index<NodeId> for ScopeTree {
    type Output = ScopeNode;

    fn index(&self, id: NodeId) -> &Self::Output {
        &self.nodes[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> ScopeTree {
        let mut tree = ScopeTree::new(1, "app");
        tree.insert_or_merge("Svc::Comp::Init", PriorityMask::DEBUG, 1).unwrap();
        tree.insert_or_merge("Svc::Comp::Work", PriorityMask::INFO, 2).unwrap();
        tree.insert_or_merge("Svc::Main", PriorityMask::ERROR, 3).unwrap();
        tree
    }

    #[test]
    fn test_insert_builds_nodes_and_leafs() {
        let tree = sample_tree();
        let svc = tree.find_child(tree.root(), "Svc").unwrap();
        let comp = tree.find_child(svc, "Comp").unwrap();

        assert!(tree[svc].is_node());
        assert_eq!(
            tree[svc].priority(),
            PriorityMask::DEBUG | PriorityMask::INFO | PriorityMask::ERROR
        );
        assert_eq!(tree[comp].priority(), PriorityMask::DEBUG | PriorityMask::INFO);
        assert_eq!(tree.child_leafs_count(comp), 2);
        assert_eq!(tree.child_nodes_count(comp), 0);
    }

    #[test]
    fn test_insert_reports_created_count() {
        let mut tree = ScopeTree::new(1, "app");
        assert_eq!(tree.insert_or_merge("A::B::C", PriorityMask::INFO, 0).unwrap(), 3);
        assert_eq!(tree.insert_or_merge("A::B::D", PriorityMask::INFO, 0).unwrap(), 1);
        assert_eq!(tree.insert_or_merge("A::B::D", PriorityMask::INFO, 0).unwrap(), 0);
    }

    #[test]
    fn test_reinsert_merges_priority() {
        let mut tree = ScopeTree::new(1, "app");
        tree.insert_or_merge("Svc::Comp::Init", PriorityMask::DEBUG, 0).unwrap();
        let before = tree.len();
        tree.insert_or_merge("Svc::Comp::Init", PriorityMask::ERROR, 11).unwrap();

        assert_eq!(tree.len(), before);
        let init = tree.find_by_path(tree.root(), "Svc::Comp::Init").unwrap();
        assert_eq!(tree[init].priority(), PriorityMask::DEBUG | PriorityMask::ERROR);
        assert_eq!(tree[init].scope_id(), Some(11));
    }

    #[test]
    fn test_unassigned_scope_id_keeps_existing() {
        let mut tree = ScopeTree::new(1, "app");
        tree.insert_or_merge("Svc::Init", PriorityMask::DEBUG, 5).unwrap();
        tree.insert_or_merge("Svc::Init", PriorityMask::INFO, SCOPE_ID_UNASSIGNED).unwrap();
        let init = tree.find_by_path(tree.root(), "Svc::Init").unwrap();
        assert_eq!(tree[init].scope_id(), Some(5));
    }

    #[test]
    fn test_leaf_over_node_conflict() {
        let mut tree = ScopeTree::new(1, "app");
        tree.insert_or_merge("Svc::Init", PriorityMask::DEBUG, 0).unwrap();
        let before = tree.len();

        let err = tree.insert_or_merge("Svc", PriorityMask::INFO, 0).unwrap_err();
        assert!(matches!(err, ScopeError::StructuralConflict { existing: "node", .. }));

        let svc = tree.find_child(tree.root(), "Svc").unwrap();
        assert!(tree[svc].is_node());
        assert_eq!(tree[svc].priority(), PriorityMask::DEBUG);
        assert_eq!(tree.len(), before);
    }

    #[test]
    fn test_node_over_leaf_conflict_leaves_tree_untouched() {
        let mut tree = ScopeTree::new(1, "app");
        tree.insert_or_merge("Svc::Init", PriorityMask::DEBUG, 0).unwrap();
        let before = tree.len();

        let err = tree
            .insert_or_merge("Svc::Init::Deep", PriorityMask::INFO, 0)
            .unwrap_err();
        assert!(matches!(err, ScopeError::StructuralConflict { existing: "leaf", .. }));
        assert_eq!(tree.len(), before);
        assert_eq!(tree[tree.root()].priority(), PriorityMask::DEBUG);
    }

    #[test]
    fn test_malformed_insert_is_noop() {
        let mut tree = ScopeTree::new(1, "app");
        assert!(tree.insert_or_merge("", PriorityMask::DEBUG, 0).is_err());
        assert!(tree.insert_or_merge("Svc::::Init", PriorityMask::DEBUG, 0).is_err());
        assert!(tree.insert_or_merge("Svc::*", PriorityMask::DEBUG, 0).is_err());
        assert!(tree.is_empty());
        assert!(tree[tree.root()].priority().is_not_set());
    }

    #[test]
    fn test_children_order_nodes_then_leafs() {
        let mut tree = ScopeTree::new(1, "app");
        tree.insert_or_merge("b_leaf", PriorityMask::INFO, 0).unwrap();
        tree.insert_or_merge("z_node::x", PriorityMask::INFO, 0).unwrap();
        tree.insert_or_merge("a_leaf", PriorityMask::INFO, 0).unwrap();
        tree.insert_or_merge("m_node::y", PriorityMask::INFO, 0).unwrap();

        let names: Vec<_> = tree
            .children(tree.root())
            .into_iter()
            .map(|id| tree[id].name().to_string())
            .collect();
        assert_eq!(names, ["m_node", "z_node", "a_leaf", "b_leaf"]);

        assert_eq!(tree.position(tree.root(), "z_node"), Some(1));
        assert_eq!(tree.position(tree.root(), "a_leaf"), Some(2));
        assert_eq!(tree.position(tree.root(), "missing"), None);

        let at = tree.child_at(tree.root(), 3).unwrap();
        assert_eq!(tree[at].name(), "b_leaf");
        assert_eq!(tree.index_in_parent(at), Some(3));
    }

    #[test]
    fn test_make_path_and_lookup() {
        let tree = sample_tree();
        let init = tree.find_by_path(tree.root(), "Svc::Comp::Init").unwrap();
        assert_eq!(tree.make_path(init), "Svc::Comp::Init");
        assert_eq!(tree.make_path(tree.root()), "");

        let comp = tree.find_by_path(tree.root(), "Svc::Comp::*").unwrap();
        assert_eq!(tree.make_path(comp), "Svc::Comp");
        assert!(tree.find_by_path(tree.root(), "Svc::Nope").is_none());
        assert!(tree.find_by_path(tree.root(), "").is_none());

        let svc = tree.find_child(tree.root(), "Svc").unwrap();
        assert_eq!(
            tree.find_by_path(svc, "Comp::Work"),
            tree.find_by_path(tree.root(), "Svc::Comp::Work")
        );
    }

    #[test]
    fn test_leafs_and_scope_id_lookup() {
        let tree = sample_tree();
        let svc = tree.find_child(tree.root(), "Svc").unwrap();
        let leafs: Vec<_> = tree
            .leafs(svc)
            .into_iter()
            .map(|id| tree.make_path(id))
            .collect();
        assert_eq!(leafs, ["Svc::Comp::Init", "Svc::Comp::Work", "Svc::Main"]);

        let work = tree.find_leaf_by_scope_id(2).unwrap();
        assert_eq!(tree[work].name(), "Work");
        assert!(tree.find_leaf_by_scope_id(SCOPE_ID_UNASSIGNED).is_none());
        assert_eq!(tree.leafs(work), vec![work]);
    }

    #[test]
    fn test_display_name() {
        let tree = sample_tree();
        assert_eq!(tree.display_name(tree.root()), "app (1)");
        let svc = tree.find_child(tree.root(), "Svc").unwrap();
        assert_eq!(tree.display_name(svc), "Svc");
    }
}
