//! Grove Scene -- the node tree that rules operate on.
//!
//! This crate provides the concrete scene substrate: generational node ids,
//! a [`SceneTree`](tree::SceneTree) of named nodes with JSON-backed
//! components, detachable [`NodeTemplate`](template::NodeTemplate) sub-trees,
//! and the [`SchemaRegistry`](schema::SchemaRegistry) describing which fields
//! each component type has.
//!
//! # Quick Start
//!
//! ```
//! use grove_scene::prelude::*;
//! use serde_json::json;
//!
//! let template = NodeTemplate::new("Body")
//!     .with_child(NodeTemplate::new("Head").with_component(
//!         "light",
//!         Component::new().with("intensity", json!(1.0)),
//!     ));
//!
//! let mut tree = SceneTree::new();
//! let root = tree.instantiate(&template, None).unwrap();
//! let head = tree.children(root)[0];
//!
//! assert_eq!(tree.name(head), Some("Head"));
//! assert!(tree.has_component(head, "light"));
//! ```

#![deny(unsafe_code)]

pub mod component;
pub mod node;
pub mod schema;
pub mod template;
pub mod tree;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by scene tree operations.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    /// The node does not exist (destroyed, stale generation or never allocated).
    #[error("node {node} does not exist (stale or never allocated)")]
    StaleNode { node: node::NodeId },

    /// The node exists but carries no component of the requested type.
    #[error("node {node} has no '{component}' component")]
    MissingComponent {
        node: node::NodeId,
        component: String,
    },

    /// A field value failed schema validation.
    #[error("invalid value {value} for field '{field}': {reason}")]
    InvalidFieldValue {
        field: String,
        value: String,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::component::Component;
    pub use crate::node::NodeId;
    pub use crate::schema::{ComponentSchema, FieldKind, FieldSchema, SchemaRegistry};
    pub use crate::template::NodeTemplate;
    pub use crate::tree::SceneTree;
    pub use crate::SceneError;
}
