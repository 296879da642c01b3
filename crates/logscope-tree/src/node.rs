use std::collections::BTreeMap;

use logscope_types::{InstanceId, PriorityMask, SCOPE_ID_UNASSIGNED};

/// Handle of a node inside one [`ScopeTree`](crate::ScopeTree)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in its tree's arena
    pub fn index(self) -> usize {
        self.0
    }
}

/// Named children of a Root or Node.
///
/// Child Nodes and child Leafs live in separate maps; a name is unique
/// across both. Enumeration order is Nodes first, then Leafs, each sorted
/// by name.
#[derive(Clone, Debug, Default)]
pub struct Children {
    nodes: BTreeMap<String, NodeId>,
    leafs: BTreeMap<String, NodeId>,
}

impl Children {
    /// Look up a child of either kind
    pub fn get(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .get(name)
            .or_else(|| self.leafs.get(name))
            .copied()
    }

    pub fn node(&self, name: &str) -> Option<NodeId> {
        self.nodes.get(name).copied()
    }

    pub fn leaf(&self, name: &str) -> Option<NodeId> {
        self.leafs.get(name).copied()
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn contains_leaf(&self, name: &str) -> bool {
        self.leafs.contains_key(name)
    }

    /// All children in enumeration order
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.values().chain(self.leafs.values()).copied()
    }

    /// Enumeration index of a named child
    pub fn position(&self, name: &str) -> Option<usize> {
        if let Some(pos) = self.nodes.keys().position(|n| n == name) {
            return Some(pos);
        }
        self.leafs
            .keys()
            .position(|n| n == name)
            .map(|pos| self.nodes.len() + pos)
    }

    /// Child at an enumeration index
    pub fn at(&self, pos: usize) -> Option<NodeId> {
        self.ids().nth(pos)
    }

    pub fn len(&self) -> usize {
        self.nodes.len() + self.leafs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.leafs.is_empty()
    }

    pub fn nodes_len(&self) -> usize {
        self.nodes.len()
    }

    pub fn leafs_len(&self) -> usize {
        self.leafs.len()
    }

    pub(crate) fn insert_node(&mut self, name: String, id: NodeId) {
        self.nodes.insert(name, id);
    }

    pub(crate) fn insert_leaf(&mut self, name: String, id: NodeId) {
        self.leafs.insert(name, id);
    }
}

/// Kind-specific payload of a scope tree node
#[derive(Clone, Debug)]
pub enum NodeKind {
    /// Entry point for one producing instance
    Root {
        instance_id: InstanceId,
        children: Children,
    },

    /// Namespace segment shared by several scopes
    Node { children: Children },

    /// A concrete log scope
    Leaf { scope_id: u32 },
}

/// One element of a scope tree
#[derive(Clone, Debug)]
pub struct ScopeNode {
    pub(crate) name: String,
    pub(crate) priority: PriorityMask,
    pub(crate) parent: Option<NodeId>,
    pub(crate) kind: NodeKind,
}

impl ScopeNode {
    pub(crate) fn root(instance_id: InstanceId, name: String) -> Self {
        Self {
            name,
            priority: PriorityMask::NOT_SET,
            parent: None,
            kind: NodeKind::Root {
                instance_id,
                children: Children::default(),
            },
        }
    }

    pub(crate) fn node(name: String, priority: PriorityMask, parent: NodeId) -> Self {
        Self {
            name,
            priority,
            parent: Some(parent),
            kind: NodeKind::Node {
                children: Children::default(),
            },
        }
    }

    pub(crate) fn leaf(
        name: String,
        priority: PriorityMask,
        scope_id: u32,
        parent: NodeId,
    ) -> Self {
        Self {
            name,
            priority,
            parent: Some(parent),
            kind: NodeKind::Leaf { scope_id },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> PriorityMask {
        self.priority
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_root(&self) -> bool {
        matches!(self.kind, NodeKind::Root { .. })
    }

    pub fn is_node(&self) -> bool {
        matches!(self.kind, NodeKind::Node { .. })
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// Scope identifier of a leaf, `None` for roots and nodes
    pub fn scope_id(&self) -> Option<u32> {
        match self.kind {
            NodeKind::Leaf { scope_id } => Some(scope_id),
            _ => None,
        }
    }

    /// True for a leaf whose producer has assigned an identifier
    pub fn has_scope_id(&self) -> bool {
        self.scope_id()
            .is_some_and(|id| id != SCOPE_ID_UNASSIGNED)
    }

    /// Direct children, `None` for leafs
    pub fn children(&self) -> Option<&Children> {
        match &self.kind {
            NodeKind::Root { children, .. } | NodeKind::Node { children } => Some(children),
            NodeKind::Leaf { .. } => None,
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Children> {
        match &mut self.kind {
            NodeKind::Root { children, .. } | NodeKind::Node { children } => Some(children),
            NodeKind::Leaf { .. } => None,
        }
    }

    /// Kind name used in diagnostics
    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            NodeKind::Root { .. } => "root",
            NodeKind::Node { .. } => "node",
            NodeKind::Leaf { .. } => "leaf",
        }
    }
}
