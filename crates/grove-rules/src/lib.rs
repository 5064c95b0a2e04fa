//! Grove Rules -- declarative modification of an instantiated scene tree.
//!
//! Callers register [`Rule`](rule::Rule)s that pair a path-like
//! [`Pattern`](pattern::Pattern) (`"Body.*[light]"`, `"**"`, or a predicate)
//! with [`Action`](rule::Action)s (remove, modify or replace a component, add
//! or clear children). Each pass:
//!
//! 1. indexes the tree once ([`index`]), giving every node a dot-joined path,
//! 2. resolves, for every node, all matching rules into one
//!    [`MergedEffect`](resolve::MergedEffect), letting the most specific rule
//!    win per component type ([`resolve`]),
//! 3. applies each merged effect to its node ([`apply`]).
//!
//! The [`ModifierEngine`](engine::ModifierEngine) drives the whole cycle.
//!
//! # Quick Start
//!
//! ```
//! use grove_rules::prelude::*;
//! use serde_json::json;
//!
//! let template = NodeTemplate::new("Body").with_child(
//!     NodeTemplate::new("Head")
//!         .with_component("light", Component::new().with("intensity", json!(1.0))),
//! );
//! let mut tree = SceneTree::new();
//! let root = tree.instantiate(&template, None).unwrap();
//!
//! let schemas = SchemaRegistry::new().with(
//!     ComponentSchema::new("light").field("intensity", FieldSchema::number(1.0)),
//! );
//!
//! let mut engine = ModifierEngine::new(tree, root, schemas, EngineConfig::default());
//! engine.register_rule(Rule::new("dim", "**").unwrap().remove("light"));
//! engine.register_rule(
//!     Rule::new("bright-head", "Body.Head").unwrap().modify("light", "intensity", json!(2.0)),
//! );
//! engine.run_pass().unwrap();
//!
//! let head = engine.tree().children(root)[0];
//! assert_eq!(engine.tree().field(head, "light", "intensity"), Some(&json!(2.0)));
//! ```

#![deny(unsafe_code)]

pub mod apply;
pub mod config;
pub mod engine;
pub mod index;
pub mod journal;
pub mod pattern;
pub mod query;
pub mod registry;
pub mod resolve;
pub mod rule;

/// Re-export the scene crate for convenience.
pub use grove_scene;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced while compiling patterns or applying effects.
///
/// Every variant is a configuration or programming error. Patterns that match
/// nothing and field values that fail validation are not errors.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// A pattern string could not be parsed.
    #[error("malformed pattern '{pattern}': {reason}")]
    MalformedPattern { pattern: String, reason: String },

    /// A rule modifies a component type that has no registered schema.
    #[error("no schema registered for component '{component}'. Registered schemas: [{registered}]")]
    MissingSchema {
        component: String,
        registered: String,
    },

    /// Engine configuration could not be deserialized.
    #[error("invalid engine configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// A node recorded as mounted does not sit under the parent that asked
    /// for it.
    #[error("node {node} is not a child of {parent}")]
    MountMismatch {
        node: grove_scene::node::NodeId,
        parent: grove_scene::node::NodeId,
    },

    /// A scene tree operation failed.
    #[error(transparent)]
    Scene(#[from] grove_scene::SceneError),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use grove_scene::prelude::*;

    pub use crate::apply::{
        ApplyContext, ApplyOutcome, EffectApplier, OriginalValueCache, PendingMount,
        PendingReplacement,
    };
    pub use crate::config::EngineConfig;
    pub use crate::engine::{ModifierEngine, MountKey, MountLedger, MountSlot, PassReport};
    pub use crate::index::{index, HierarchyIndex, NodeMetadata};
    pub use crate::journal::{ChangeKind, EffectJournal, NodeChange};
    pub use crate::pattern::{MatchOptions, NodePredicate, PathPattern, Pattern, Segment};
    pub use crate::query::{find_nodes, find_nodes_str, FindResult};
    pub use crate::registry::{RegisteredRule, RuleRegistry};
    pub use crate::resolve::{
        resolve, ComponentAction, ComponentOp, MergedEffect, PendingChild, ResolvedEffects,
    };
    pub use crate::rule::{Action, FieldUpdate, Rule, RuleId};
    pub use crate::RuleError;
}
