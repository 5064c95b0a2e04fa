//! Change journal recording every mutation the engine makes to the tree.
//!
//! Each [`NodeChange`] captures which node changed, what changed (old and new
//! values where meaningful), which rule caused it, and in which pass. The
//! journal answers "why does this node look like this?" without diffing the
//! tree.
//!
//! # Query API
//!
//! - **Node**: [`EffectJournal::changes_for_node`]
//! - **Component type**: [`EffectJournal::changes_for_component`]
//! - **Rule**: [`EffectJournal::changes_by_rule`]
//!
//! # Example
//!
//! ```
//! use grove_rules::journal::{ChangeKind, EffectJournal, NodeChange};
//! use grove_rules::rule::RuleId;
//! use grove_scene::node::NodeId;
//!
//! let mut journal = EffectJournal::new();
//! let node = NodeId::new(3, 0);
//! journal.record(NodeChange {
//!     node,
//!     rule: RuleId::from("dim-lights"),
//!     pass: 1,
//!     change: ChangeKind::FieldModified {
//!         component: "light".to_owned(),
//!         field: "intensity".to_owned(),
//!         old: Some(serde_json::json!(1.0)),
//!         new: serde_json::json!(0.5),
//!         defaulted: false,
//!     },
//! });
//!
//! assert_eq!(journal.changes_for_node(node).count(), 1);
//! assert_eq!(journal.changes_for_component("light").count(), 1);
//! ```

use grove_scene::component::Component;
use grove_scene::node::NodeId;
use serde::{Deserialize, Serialize};

use crate::rule::RuleId;

/// What happened to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeKind {
    FieldModified {
        component: String,
        field: String,
        old: Option<serde_json::Value>,
        new: serde_json::Value,
        /// The supplied value failed validation and the schema default was
        /// written instead.
        defaulted: bool,
    },
    ComponentRemoved {
        component: String,
        old: Component,
    },
    ComponentReplaced {
        component: String,
        old: Component,
    },
    ChildDestroyed {
        child: NodeId,
    },
    ChildMounted {
        child: NodeId,
    },
    ChildUnmounted {
        child: NodeId,
    },
}

impl ChangeKind {
    /// The component type involved, if any.
    pub fn component(&self) -> Option<&str> {
        match self {
            ChangeKind::FieldModified { component, .. }
            | ChangeKind::ComponentRemoved { component, .. }
            | ChangeKind::ComponentReplaced { component, .. } => Some(component),
            _ => None,
        }
    }
}

/// A single recorded mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeChange {
    pub node: NodeId,
    pub rule: RuleId,
    pub pass: u64,
    pub change: ChangeKind,
}

/// Accumulates [`NodeChange`]s across passes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EffectJournal {
    changes: Vec<NodeChange>,
}

impl EffectJournal {
    pub fn new() -> Self {
        Self {
            changes: Vec::new(),
        }
    }

    /// Append a change.
    pub fn record(&mut self, change: NodeChange) {
        self.changes.push(change);
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// All changes in recording order.
    pub fn all_changes(&self) -> &[NodeChange] {
        &self.changes
    }

    /// Changes made to `node`, oldest first.
    pub fn changes_for_node(&self, node: NodeId) -> impl Iterator<Item = &NodeChange> {
        self.changes.iter().filter(move |c| c.node == node)
    }

    pub fn changes_for_component<'a>(
        &'a self,
        component: &'a str,
    ) -> impl Iterator<Item = &'a NodeChange> {
        self.changes
            .iter()
            .filter(move |c| c.change.component() == Some(component))
    }

    /// Changes attributed to `rule`.
    pub fn changes_by_rule<'a>(&'a self, rule: &'a RuleId) -> impl Iterator<Item = &'a NodeChange> {
        self.changes.iter().filter(move |c| &c.rule == rule)
    }

    /// Changes recorded during one pass.
    pub fn changes_in_pass(&self, pass: u64) -> impl Iterator<Item = &NodeChange> {
        self.changes.iter().filter(move |c| c.pass == pass)
    }
}
