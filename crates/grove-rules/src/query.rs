//! Ad-hoc node lookup with the same pattern language rules use.

use grove_scene::node::NodeId;
use grove_scene::tree::SceneTree;

use crate::index::HierarchyIndex;
use crate::pattern::{MatchOptions, Pattern};
use crate::RuleError;

/// Result of [`find_nodes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindResult {
    None,
    /// Exactly one hit for a pattern without wildcards.
    One(NodeId),
    /// Hits of a wildcard or predicate pattern, in pre-order. May hold a
    /// single node.
    Many(Vec<NodeId>),
}

impl FindResult {
    pub fn is_empty(&self) -> bool {
        match self {
            FindResult::None => true,
            FindResult::One(_) => false,
            FindResult::Many(v) => v.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FindResult::None => 0,
            FindResult::One(_) => 1,
            FindResult::Many(v) => v.len(),
        }
    }

    /// First hit in pre-order.
    pub fn first(&self) -> Option<NodeId> {
        match self {
            FindResult::None => None,
            FindResult::One(id) => Some(*id),
            FindResult::Many(v) => v.first().copied(),
        }
    }

    /// All hits in pre-order.
    pub fn into_vec(self) -> Vec<NodeId> {
        match self {
            FindResult::None => Vec::new(),
            FindResult::One(id) => vec![id],
            FindResult::Many(v) => v,
        }
    }
}

/// Find nodes under `from` matching `pattern`.
///
/// Paths are relative to `from`, so the first pattern segment is matched
/// against `from`'s own name.
pub fn find_nodes(
    tree: &SceneTree,
    pattern: &Pattern,
    from: NodeId,
    options: MatchOptions,
) -> FindResult {
    let index = HierarchyIndex::build(tree, from);
    let hits: Vec<NodeId> = index
        .iter()
        .filter(|meta| pattern.matches(tree, meta, options))
        .map(|meta| meta.id)
        .collect();

    match hits.as_slice() {
        [] => FindResult::None,
        [only] if !pattern.is_wildcard() => FindResult::One(*only),
        _ => FindResult::Many(hits),
    }
}

/// [`find_nodes`] with a pattern string.
pub fn find_nodes_str(
    tree: &SceneTree,
    pattern: &str,
    from: NodeId,
    options: MatchOptions,
) -> Result<FindResult, RuleError> {
    Ok(find_nodes(tree, &Pattern::parse(pattern)?, from, options))
}
