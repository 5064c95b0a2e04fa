//! The rule model: a pattern plus the actions to take on every node it
//! selects.
//!
//! # Example
//!
//! ```
//! use grove_rules::rule::Rule;
//! use serde_json::json;
//!
//! let rule = Rule::new("soft-lights", "Body.*[light]")
//!     .unwrap()
//!     .modify("light", "color", json!("#ffeedd"))
//!     .modify_with("light", "intensity", |v| json!(v.as_f64().unwrap_or(1.0) * 0.5));
//!
//! assert_eq!(rule.specificity, 160);
//! assert_eq!(rule.actions.len(), 1, "field updates on one component are grouped");
//! ```

use std::fmt;
use std::sync::Arc;

use grove_scene::node::NodeId;
use grove_scene::template::NodeTemplate;
use grove_scene::tree::SceneTree;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::index::NodeMetadata;
use crate::pattern::Pattern;
use crate::RuleError;

// ---------------------------------------------------------------------------
// RuleId
// ---------------------------------------------------------------------------

/// Caller-chosen identifier of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    pub fn new(id: &str) -> Self {
        Self(id.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RuleId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RuleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// FieldUpdate
// ---------------------------------------------------------------------------

/// New value for one component field.
#[derive(Clone)]
pub enum FieldUpdate {
    /// Overwrite with a fixed value.
    Literal(Value),
    /// Compute from the field's value as it was before any rule touched it.
    Functional(Arc<dyn Fn(&Value) -> Value + Send + Sync>),
}

impl FieldUpdate {
    /// Overwrite with `value`.
    pub fn literal(value: Value) -> Self {
        FieldUpdate::Literal(value)
    }

    /// Compute from the original value with `f`.
    pub fn functional<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        FieldUpdate::Functional(Arc::new(f))
    }
}

impl fmt::Debug for FieldUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldUpdate::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            FieldUpdate::Functional(_) => f.write_str("Functional(..)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// One effect a rule has on each node it matches.
#[derive(Debug, Clone)]
pub enum Action {
    /// Mount these sub-trees under the node.
    AddChildren(Vec<NodeTemplate>),
    /// Destroy the node's original children.
    ClearChildren,
    /// Change fields of an existing component.
    ModifyComponent {
        component: String,
        updates: Vec<(String, FieldUpdate)>,
    },
    /// Detach a component.
    RemoveComponent { component: String },
    /// Detach a component and mount `replacement` in its place.
    ReplaceComponent {
        component: String,
        replacement: NodeTemplate,
    },
}

impl Action {
    /// The component type this action targets, if any.
    pub fn component(&self) -> Option<&str> {
        match self {
            Action::ModifyComponent { component, .. }
            | Action::RemoveComponent { component }
            | Action::ReplaceComponent { component, .. } => Some(component),
            Action::AddChildren(_) | Action::ClearChildren => None,
        }
    }

    /// Short name of the action kind, such as `"clear_children"`.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Action::AddChildren(_) => "add_children",
            Action::ClearChildren => "clear_children",
            Action::ModifyComponent { .. } => "modify_component",
            Action::RemoveComponent { .. } => "remove_component",
            Action::ReplaceComponent { .. } => "replace_component",
        }
    }
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// A pattern and the actions applied to every node it matches.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: RuleId,
    pub pattern: Pattern,
    pub actions: Vec<Action>,
    /// Derived from the pattern at construction.
    pub specificity: u32,
}

impl Rule {
    /// Build a rule from a pattern string.
    pub fn new(id: impl Into<RuleId>, pattern: &str) -> Result<Self, RuleError> {
        Ok(Self::with_pattern(id, Pattern::parse(pattern)?))
    }

    /// Build a rule from an already compiled pattern.
    pub fn with_pattern(id: impl Into<RuleId>, pattern: Pattern) -> Self {
        Self {
            id: id.into(),
            specificity: pattern.specificity(),
            pattern,
            actions: Vec::new(),
        }
    }

    /// Build a rule selecting nodes with a predicate.
    pub fn with_predicate<F>(id: impl Into<RuleId>, predicate: F) -> Self
    where
        F: Fn(&SceneTree, NodeId, &NodeMetadata) -> bool + Send + Sync + 'static,
    {
        Self::with_pattern(id, Pattern::predicate(predicate))
    }

    /// Append an action. The helpers below cover the common cases.
    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Mount `templates` under every matched node, in order.
    pub fn add_children(self, templates: Vec<NodeTemplate>) -> Self {
        self.action(Action::AddChildren(templates))
    }

    pub fn add_child(self, template: NodeTemplate) -> Self {
        self.add_children(vec![template])
    }

    /// Destroy the children each matched node was indexed with.
    pub fn clear_children(self) -> Self {
        self.action(Action::ClearChildren)
    }

    pub fn remove(self, component: &str) -> Self {
        self.action(Action::RemoveComponent {
            component: component.to_owned(),
        })
    }

    /// Detach `component` and mount `replacement` under the node.
    pub fn replace(self, component: &str, replacement: NodeTemplate) -> Self {
        self.action(Action::ReplaceComponent {
            component: component.to_owned(),
            replacement,
        })
    }

    /// Set a field to a literal value.
    pub fn modify(self, component: &str, field: &str, value: Value) -> Self {
        self.push_update(component, field, FieldUpdate::literal(value))
    }

    /// Set a field to a function of its original value.
    pub fn modify_with<F>(self, component: &str, field: &str, f: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.push_update(component, field, FieldUpdate::functional(f))
    }

    // Updates to one component are grouped into a single ModifyComponent so
    // the component resolves as a unit.
    fn push_update(mut self, component: &str, field: &str, update: FieldUpdate) -> Self {
        let existing = self.actions.iter().position(|a| {
            matches!(a, Action::ModifyComponent { component: c, .. } if c == component)
        });
        match existing.map(|i| &mut self.actions[i]) {
            Some(Action::ModifyComponent { updates, .. }) => {
                updates.retain(|(f, _)| f != field);
                updates.push((field.to_owned(), update));
            }
            _ => self.actions.push(Action::ModifyComponent {
                component: component.to_owned(),
                updates: vec![(field.to_owned(), update)],
            }),
        }
        self
    }
}
