//! Node templates: detached sub-trees waiting to be mounted.
//!
//! A [`NodeTemplate`] describes a node (name, components, children) without
//! allocating it in a [`SceneTree`](crate::tree::SceneTree). Templates are the
//! payload of "add children" and "replace component" rules, and
//! [`SceneTree::instantiate`](crate::tree::SceneTree::instantiate) turns them
//! into live nodes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::component::Component;

/// A pending sub-tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub components: BTreeMap<String, Component>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeTemplate>,
}

impl NodeTemplate {
    /// A template for a single node with no components or children.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            components: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Attach a component of the given type.
    pub fn with_component(mut self, component_type: &str, component: Component) -> Self {
        self.components.insert(component_type.to_owned(), component);
        self
    }

    /// Append a child template.
    pub fn with_child(mut self, child: NodeTemplate) -> Self {
        self.children.push(child);
        self
    }

    /// Total number of nodes this template instantiates, itself included.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(NodeTemplate::node_count).sum::<usize>()
    }
}
