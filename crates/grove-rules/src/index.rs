//! Hierarchy index: one pre-order walk of the tree producing a
//! [`NodeMetadata`] record per node.
//!
//! Paths are computed fresh on every build and never patched incrementally;
//! after any structural change made outside the rule engine the index must be
//! rebuilt. The `original_child_ids` snapshot taken here is what lets a later
//! "clear children" tell the children the tree was instantiated with apart
//! from children mounted by rules.

use std::collections::{HashMap, HashSet};

use grove_scene::node::NodeId;
use grove_scene::tree::SceneTree;
use serde::Serialize;

/// Cached, derived information about one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeMetadata {
    pub id: NodeId,
    /// Dot-joined names from the index root to this node, inclusive.
    pub path: String,
    pub name: String,
    /// Children present when the index was built.
    pub original_child_ids: Vec<NodeId>,
}

/// Metadata for every node under a root, in pre-order.
#[derive(Debug, Clone, Default)]
pub struct HierarchyIndex {
    root: Option<NodeId>,
    order: Vec<NodeId>,
    entries: HashMap<NodeId, NodeMetadata>,
}

/// Index the subtree rooted at `root`.
pub fn index(tree: &SceneTree, root: NodeId) -> HierarchyIndex {
    HierarchyIndex::build(tree, root)
}

impl HierarchyIndex {
    /// Walk the subtree rooted at `root` exactly once.
    ///
    /// A dead root yields an empty index.
    pub fn build(tree: &SceneTree, root: NodeId) -> Self {
        Self::build_excluding(tree, root, &HashSet::new())
    }

    /// Like [`build`](Self::build), but prunes the subtrees rooted at
    /// `excluded`: they are neither indexed nor listed as original children.
    pub fn build_excluding(tree: &SceneTree, root: NodeId, excluded: &HashSet<NodeId>) -> Self {
        let mut out = Self {
            root: tree.is_alive(root).then_some(root),
            order: Vec::new(),
            entries: HashMap::new(),
        };
        let Some(root) = out.root else {
            return out;
        };

        let mut stack: Vec<(NodeId, Option<String>)> = vec![(root, None)];
        while let Some((id, parent_path)) = stack.pop() {
            let name = tree.name(id).unwrap_or_default().to_owned();
            let path = match parent_path {
                Some(p) => format!("{p}.{name}"),
                None => name.clone(),
            };
            let children: Vec<NodeId> = tree
                .children(id)
                .iter()
                .copied()
                .filter(|c| !excluded.contains(c))
                .collect();
            for &child in children.iter().rev() {
                stack.push((child, Some(path.clone())));
            }
            out.order.push(id);
            out.entries.insert(
                id,
                NodeMetadata {
                    id,
                    path,
                    name,
                    original_child_ids: children,
                },
            );
        }
        tracing::trace!(root = %root, nodes = out.order.len(), "indexed hierarchy");
        out
    }

    /// The indexed root, `None` if it was dead at build time.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Metadata for `node`, if it was indexed.
    pub fn get(&self, node: NodeId) -> Option<&NodeMetadata> {
        self.entries.get(&node)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.entries.contains_key(&node)
    }

    /// Number of indexed nodes.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Indexed node ids in pre-order.
    pub fn node_ids(&self) -> &[NodeId] {
        &self.order
    }

    /// Metadata in pre-order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeMetadata> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    /// Drop `nodes` from every parent's original child list.
    ///
    /// Used after re-indexing a tree that already contains rule-mounted
    /// children, which must never count as originals.
    pub fn exclude_from_originals(&mut self, nodes: impl IntoIterator<Item = NodeId>) {
        let excluded: HashSet<NodeId> = nodes.into_iter().collect();
        if excluded.is_empty() {
            return;
        }
        for meta in self.entries.values_mut() {
            meta.original_child_ids.retain(|c| !excluded.contains(c));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
