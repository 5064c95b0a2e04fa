//! The [`SceneTree`] owns every node of an instantiated scene: names,
//! parent/child links, and the components attached to each node.
//!
//! Nodes are stored in slots addressed by [`NodeId::slot`]; the
//! [`NodeSlots`] guards every access so a handle to a destroyed node is
//! reported as stale rather than silently reading whichever node now occupies
//! the slot.

use std::collections::BTreeMap;

use crate::component::Component;
use crate::node::{NodeId, NodeSlots};
use crate::template::NodeTemplate;
use crate::SceneError;

// ---------------------------------------------------------------------------
// NodeData
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct NodeData {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    components: BTreeMap<String, Component>,
}

// ---------------------------------------------------------------------------
// SceneTree
// ---------------------------------------------------------------------------

/// A forest of named nodes carrying components.
///
/// Every structural change (spawn, instantiate, destroy) bumps
/// [`structure_version`](Self::structure_version), which lets observers tell
/// whether a cached view of the hierarchy is out of date.
#[derive(Debug, Default)]
pub struct SceneTree {
    slots: NodeSlots,
    nodes: Vec<Option<NodeData>>,
    structure_version: u64,
}

impl SceneTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    // -- structure ----------------------------------------------------------

    /// Create a node with no components, optionally under `parent`.
    pub fn spawn(&mut self, name: &str, parent: Option<NodeId>) -> Result<NodeId, SceneError> {
        if let Some(p) = parent {
            self.require_alive(p)?;
        }
        let id = self.slots.claim();
        let idx = id.slot() as usize;
        if idx >= self.nodes.len() {
            self.nodes.resize_with(idx + 1, || None);
        }
        self.nodes[idx] = Some(NodeData {
            name: name.to_owned(),
            parent,
            children: Vec::new(),
            components: BTreeMap::new(),
        });
        if let Some(p) = parent {
            if let Some(data) = self.data_mut(p) {
                data.children.push(id);
            }
        }
        self.structure_version += 1;
        Ok(id)
    }

    /// Instantiate a template (and all of its descendants) under `parent`.
    ///
    /// Returns the id of the template's root node.
    pub fn instantiate(
        &mut self,
        template: &NodeTemplate,
        parent: Option<NodeId>,
    ) -> Result<NodeId, SceneError> {
        let id = self.spawn(&template.name, parent)?;
        if let Some(data) = self.data_mut(id) {
            data.components = template.components.clone();
        }
        for child in &template.children {
            self.instantiate(child, Some(id))?;
        }
        Ok(id)
    }

    /// Destroy a node and its whole subtree, detaching it from its parent.
    ///
    /// Returns the number of nodes destroyed.
    pub fn destroy(&mut self, node: NodeId) -> Result<usize, SceneError> {
        self.require_alive(node)?;
        if let Some(parent) = self.parent(node) {
            if let Some(data) = self.data_mut(parent) {
                data.children.retain(|&c| c != node);
            }
        }

        let doomed = self.descendants(node);
        for &id in &doomed {
            self.nodes[id.slot() as usize] = None;
            self.slots.retire(id);
        }
        self.structure_version += 1;
        tracing::trace!(node = %node, destroyed = doomed.len(), "destroyed subtree");
        Ok(doomed.len())
    }

    /// Snapshot a live subtree back into a template.
    pub fn snapshot(&self, node: NodeId) -> Option<NodeTemplate> {
        let data = self.data(node)?;
        Some(NodeTemplate {
            name: data.name.clone(),
            components: data.components.clone(),
            children: data
                .children
                .iter()
                .filter_map(|&c| self.snapshot(c))
                .collect(),
        })
    }

    // -- queries ------------------------------------------------------------

    /// `true` if `node` names a node currently in the tree.
    pub fn is_alive(&self, node: NodeId) -> bool {
        self.slots.is_live(node)
    }

    /// Node name, `None` for a dead handle.
    pub fn name(&self, node: NodeId) -> Option<&str> {
        self.data(node).map(|d| d.name.as_str())
    }

    /// Parent of `node`. Roots and dead handles have none.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.data(node).and_then(|d| d.parent)
    }

    /// Children in insertion order; empty for a dead node.
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.data(node).map(|d| d.children.as_slice()).unwrap_or(&[])
    }

    /// `node` followed by all of its descendants, pre-order.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if !self.is_alive(node) {
            return out;
        }
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            out.push(id);
            // Push in reverse so the first child is visited first.
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// Number of live nodes across every root.
    pub fn node_count(&self) -> usize {
        self.slots.live_count()
    }

    /// Counter bumped on every structural change.
    pub fn structure_version(&self) -> u64 {
        self.structure_version
    }

    // -- components ---------------------------------------------------------

    pub fn components(&self, node: NodeId) -> Option<&BTreeMap<String, Component>> {
        self.data(node).map(|d| &d.components)
    }

    /// One component of `node`.
    pub fn component(&self, node: NodeId, component_type: &str) -> Option<&Component> {
        self.data(node)?.components.get(component_type)
    }

    pub fn has_component(&self, node: NodeId, component_type: &str) -> bool {
        self.component(node, component_type).is_some()
    }

    /// Attach (or overwrite) a component, returning the previous instance.
    pub fn insert_component(
        &mut self,
        node: NodeId,
        component_type: &str,
        component: Component,
    ) -> Result<Option<Component>, SceneError> {
        let data = self.data_mut(node).ok_or(SceneError::StaleNode { node })?;
        Ok(data.components.insert(component_type.to_owned(), component))
    }

    /// Detach a component, returning it if it was present.
    pub fn remove_component(
        &mut self,
        node: NodeId,
        component_type: &str,
    ) -> Result<Option<Component>, SceneError> {
        let data = self.data_mut(node).ok_or(SceneError::StaleNode { node })?;
        Ok(data.components.remove(component_type))
    }

    /// One field of one component.
    pub fn field(&self, node: NodeId, component_type: &str, field: &str) -> Option<&serde_json::Value> {
        self.component(node, component_type)?.get(field)
    }

    /// Write a single component field, returning the previous value.
    pub fn set_field(
        &mut self,
        node: NodeId,
        component_type: &str,
        field: &str,
        value: serde_json::Value,
    ) -> Result<Option<serde_json::Value>, SceneError> {
        let data = self.data_mut(node).ok_or(SceneError::StaleNode { node })?;
        let component =
            data.components
                .get_mut(component_type)
                .ok_or_else(|| SceneError::MissingComponent {
                    node,
                    component: component_type.to_owned(),
                })?;
        Ok(component.set(field, value))
    }

    // -- internals ----------------------------------------------------------

    fn require_alive(&self, node: NodeId) -> Result<(), SceneError> {
        if self.is_alive(node) {
            Ok(())
        } else {
            Err(SceneError::StaleNode { node })
        }
    }

    fn data(&self, node: NodeId) -> Option<&NodeData> {
        if !self.slots.is_live(node) {
            return None;
        }
        self.nodes.get(node.slot() as usize)?.as_ref()
    }

    fn data_mut(&mut self, node: NodeId) -> Option<&mut NodeData> {
        if !self.slots.is_live(node) {
            return None;
        }
        self.nodes.get_mut(node.slot() as usize)?.as_mut()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body() -> NodeTemplate {
        NodeTemplate::new("Body")
            .with_child(
                NodeTemplate::new("Head").with_component(
                    "light",
                    Component::new().with("intensity", json!(1.0)),
                ),
            )
            .with_child(NodeTemplate::new("LeftArm").with_child(NodeTemplate::new("Hand")))
    }

    #[test]
    fn instantiate_builds_whole_subtree() {
        let mut tree = SceneTree::new();
        let root = tree.instantiate(&body(), None).unwrap();
        assert_eq!(tree.node_count(), 4);
        assert_eq!(tree.name(root), Some("Body"));
        let kids: Vec<_> = tree
            .children(root)
            .iter()
            .map(|&c| tree.name(c).unwrap().to_owned())
            .collect();
        assert_eq!(kids, vec!["Head", "LeftArm"]);
        let head = tree.children(root)[0];
        assert_eq!(tree.parent(head), Some(root));
        assert_eq!(tree.field(head, "light", "intensity"), Some(&json!(1.0)));
    }

    #[test]
    fn descendants_are_pre_order() {
        let mut tree = SceneTree::new();
        let root = tree.instantiate(&body(), None).unwrap();
        let names: Vec<_> = tree
            .descendants(root)
            .into_iter()
            .map(|n| tree.name(n).unwrap().to_owned())
            .collect();
        assert_eq!(names, vec!["Body", "Head", "LeftArm", "Hand"]);
    }

    #[test]
    fn destroy_removes_subtree_and_detaches() {
        let mut tree = SceneTree::new();
        let root = tree.instantiate(&body(), None).unwrap();
        let arm = tree.children(root)[1];
        let hand = tree.children(arm)[0];
        let version = tree.structure_version();

        assert_eq!(tree.destroy(arm).unwrap(), 2);
        assert!(!tree.is_alive(arm));
        assert!(!tree.is_alive(hand));
        assert_eq!(tree.children(root).len(), 1);
        assert_eq!(tree.node_count(), 2);
        assert!(tree.structure_version() > version);
        assert!(matches!(tree.destroy(arm), Err(SceneError::StaleNode { .. })));
    }

    #[test]
    fn stale_handle_does_not_alias_recycled_slot() {
        let mut tree = SceneTree::new();
        let a = tree.spawn("A", None).unwrap();
        tree.destroy(a).unwrap();
        let b = tree.spawn("B", None).unwrap();
        assert_eq!(a.slot(), b.slot());
        assert_eq!(tree.name(a), None);
        assert_eq!(tree.name(b), Some("B"));
    }

    #[test]
    fn component_crud() {
        let mut tree = SceneTree::new();
        let n = tree.spawn("Lamp", None).unwrap();
        assert!(!tree.has_component(n, "light"));
        tree.insert_component(n, "light", Component::new().with("intensity", json!(1)))
            .unwrap();
        let old = tree.set_field(n, "light", "intensity", json!(3)).unwrap();
        assert_eq!(old, Some(json!(1)));
        assert!(matches!(
            tree.set_field(n, "mesh", "visible", json!(true)),
            Err(SceneError::MissingComponent { .. })
        ));
        let removed = tree.remove_component(n, "light").unwrap();
        assert_eq!(removed.unwrap().get("intensity"), Some(&json!(3)));
        assert_eq!(tree.remove_component(n, "light").unwrap(), None);
    }

    #[test]
    fn snapshot_roundtrips_template() {
        let mut tree = SceneTree::new();
        let root = tree.instantiate(&body(), None).unwrap();
        assert_eq!(tree.snapshot(root), Some(body()));
    }

    #[test]
    fn spawn_under_dead_parent_fails() {
        let mut tree = SceneTree::new();
        let p = tree.spawn("P", None).unwrap();
        tree.destroy(p).unwrap();
        assert!(tree.spawn("C", Some(p)).is_err());
    }
}
