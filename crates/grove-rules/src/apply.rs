//! Effect application: turn a [`MergedEffect`] into mutations of the live
//! tree.
//!
//! Application order per node is fixed: clear original children, then
//! component actions (in component-name order), then expose the templates to
//! mount. Mounting itself belongs to whoever owns instantiation, so additions
//! and replacements come back as [`PendingMount`]s and
//! [`PendingReplacement`]s.
//!
//! # Functional updates
//!
//! A functional field update is always evaluated against the field's value as
//! it was before any rule touched it. That value is captured the first time a
//! functional update targets a `(node, component, field)` triple and kept in
//! the [`OriginalValueCache`]; it is never overwritten, so re-applying the same
//! effect any number of times yields the same field value.

use std::collections::HashMap;

use grove_scene::node::NodeId;
use grove_scene::schema::{ComponentSchema, SchemaRegistry};
use grove_scene::template::NodeTemplate;
use grove_scene::tree::SceneTree;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::index::HierarchyIndex;
use crate::journal::{ChangeKind, EffectJournal, NodeChange};
use crate::resolve::{ComponentAction, ComponentOp, MergedEffect};
use crate::rule::{FieldUpdate, RuleId};
use crate::RuleError;

// ---------------------------------------------------------------------------
// OriginalValueCache
// ---------------------------------------------------------------------------

/// Pre-rule field values, keyed by `(node, component, field)`.
#[derive(Debug, Clone, Default)]
pub struct OriginalValueCache {
    values: HashMap<(NodeId, String, String), Value>,
}

impl OriginalValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached original, capturing it with `current` on first access.
    pub fn get_or_capture(
        &mut self,
        node: NodeId,
        component: &str,
        field: &str,
        current: impl FnOnce() -> Value,
    ) -> &Value {
        self.values
            .entry((node, component.to_owned(), field.to_owned()))
            .or_insert_with(current)
    }

    /// Captured original of one field, if any.
    pub fn get(&self, node: NodeId, component: &str, field: &str) -> Option<&Value> {
        self.values
            .get(&(node, component.to_owned(), field.to_owned()))
    }

    /// Drop entries belonging to destroyed nodes.
    pub fn retain_alive(&mut self, tree: &SceneTree) {
        self.values.retain(|(node, _, _), _| tree.is_alive(*node));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// A template waiting to be mounted under `parent`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingMount {
    pub parent: NodeId,
    pub rule: RuleId,
    pub ordinal: usize,
    pub template: NodeTemplate,
}

/// A template to mount on `node` in place of a detached component.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingReplacement {
    pub node: NodeId,
    pub component: String,
    pub rule: RuleId,
    pub template: NodeTemplate,
}

/// What applying one effect did.
#[derive(Debug, Clone, Default)]
pub struct ApplyOutcome {
    /// The node was dead; nothing was applied.
    pub dropped: bool,
    pub destroyed_children: Vec<NodeId>,
    pub components_removed: usize,
    pub components_replaced: usize,
    pub fields_modified: usize,
    pub fields_defaulted: usize,
    pub mounts: Vec<PendingMount>,
    pub replacements: Vec<PendingReplacement>,
}

// ---------------------------------------------------------------------------
// ApplyContext
// ---------------------------------------------------------------------------

/// Everything an effect is applied against.
pub struct ApplyContext<'a> {
    pub tree: &'a mut SceneTree,
    pub schemas: &'a SchemaRegistry,
    pub index: &'a HierarchyIndex,
    /// Where to record mutations; `None` disables journaling.
    pub journal: Option<&'a mut EffectJournal>,
    /// Pass number stamped on journal entries.
    pub pass: u64,
}

impl ApplyContext<'_> {
    fn record(&mut self, node: NodeId, rule: &RuleId, change: ChangeKind) {
        if let Some(journal) = self.journal.as_deref_mut() {
            journal.record(NodeChange {
                node,
                rule: rule.clone(),
                pass: self.pass,
                change,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// EffectApplier
// ---------------------------------------------------------------------------

/// Applies merged effects, remembering original field values across passes.
#[derive(Debug, Default)]
pub struct EffectApplier {
    originals: OriginalValueCache,
}

impl EffectApplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field values captured before the first functional update.
    pub fn originals(&self) -> &OriginalValueCache {
        &self.originals
    }

    /// Forget originals of destroyed nodes.
    pub fn prune(&mut self, tree: &SceneTree) {
        self.originals.retain_alive(tree);
    }

    /// Fail if `effect` modifies a component type with no registered schema.
    ///
    /// Run over every effect of a pass before applying any of them so a
    /// configuration error never leaves a pass half applied.
    pub fn check_schemas(schemas: &SchemaRegistry, effect: &MergedEffect) -> Result<(), RuleError> {
        for (component, action) in &effect.component_actions {
            if matches!(action.op, ComponentOp::Modify(_)) {
                require_schema(schemas, component)?;
            }
        }
        Ok(())
    }

    /// Apply one node's effect.
    pub fn apply(
        &mut self,
        ctx: &mut ApplyContext<'_>,
        effect: &MergedEffect,
    ) -> Result<ApplyOutcome, RuleError> {
        let node = effect.node;
        let mut outcome = ApplyOutcome::default();

        if !ctx.tree.is_alive(node) {
            debug!(node = %node, "effect dropped: node no longer exists");
            outcome.dropped = true;
            return Ok(outcome);
        }
        Self::check_schemas(ctx.schemas, effect)?;

        if effect.clear_children {
            self.clear_original_children(ctx, effect, &mut outcome)?;
        }

        for (component, action) in &effect.component_actions {
            match &action.op {
                ComponentOp::Remove => {
                    if let Some(old) = ctx.tree.remove_component(node, component)? {
                        outcome.components_removed += 1;
                        ctx.record(
                            node,
                            &action.rule,
                            ChangeKind::ComponentRemoved {
                                component: component.clone(),
                                old,
                            },
                        );
                    }
                }
                ComponentOp::Replace(template) => {
                    // The replacement is requested on every pass; only the
                    // first detach is a change.
                    if let Some(old) = ctx.tree.remove_component(node, component)? {
                        outcome.components_replaced += 1;
                        ctx.record(
                            node,
                            &action.rule,
                            ChangeKind::ComponentReplaced {
                                component: component.clone(),
                                old,
                            },
                        );
                    }
                    outcome.replacements.push(PendingReplacement {
                        node,
                        component: component.clone(),
                        rule: action.rule.clone(),
                        template: template.clone(),
                    });
                }
                ComponentOp::Modify(updates) => {
                    let schema = require_schema(ctx.schemas, component)?;
                    self.modify(ctx, node, component, schema, action, updates, &mut outcome)?;
                }
            }
        }

        outcome.mounts = effect
            .add_children
            .iter()
            .map(|c| PendingMount {
                parent: node,
                rule: c.rule.clone(),
                ordinal: c.ordinal,
                template: c.template.clone(),
            })
            .collect();

        Ok(outcome)
    }

    fn clear_original_children(
        &mut self,
        ctx: &mut ApplyContext<'_>,
        effect: &MergedEffect,
        outcome: &mut ApplyOutcome,
    ) -> Result<(), RuleError> {
        let node = effect.node;
        let index = ctx.index;
        let Some(meta) = index.get(node) else {
            return Ok(());
        };
        let Some(rule) = effect.clear_children_rule.as_ref() else {
            return Ok(());
        };
        for &child in &meta.original_child_ids {
            // Already gone, or re-parented since indexing.
            if !ctx.tree.is_alive(child) || ctx.tree.parent(child) != Some(node) {
                continue;
            }
            ctx.tree.destroy(child)?;
            outcome.destroyed_children.push(child);
            ctx.record(node, rule, ChangeKind::ChildDestroyed { child });
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn modify(
        &mut self,
        ctx: &mut ApplyContext<'_>,
        node: NodeId,
        component: &str,
        schema: &ComponentSchema,
        action: &ComponentAction,
        updates: &[(String, FieldUpdate)],
        outcome: &mut ApplyOutcome,
    ) -> Result<(), RuleError> {
        if !ctx.tree.has_component(node, component) {
            debug!(node = %node, component = %component, "modify skipped: component absent");
            return Ok(());
        }

        for (field, update) in updates {
            let Some(field_schema) = schema.field_schema(field) else {
                warn!(
                    node = %node,
                    component = %component,
                    field = %field,
                    rule = %action.rule,
                    "modify skipped: field not declared in schema"
                );
                continue;
            };

            let candidate = match update {
                FieldUpdate::Literal(v) => v.clone(),
                FieldUpdate::Functional(f) => {
                    let tree = &*ctx.tree;
                    let original = self.originals.get_or_capture(node, component, field, || {
                        tree.field(node, component, field)
                            .cloned()
                            .unwrap_or_else(|| field_schema.default.clone())
                    });
                    f(original)
                }
            };

            let Some((value, error)) = schema.coerce_or_default(field, &candidate) else {
                continue;
            };
            let defaulted = error.is_some();
            if let Some(e) = error {
                warn!(
                    node = %node,
                    component = %component,
                    rule = %action.rule,
                    error = %e,
                    "invalid field value; using schema default"
                );
                outcome.fields_defaulted += 1;
            }

            if ctx.tree.field(node, component, field) == Some(&value) {
                continue;
            }
            let old = ctx.tree.set_field(node, component, field, value.clone())?;
            outcome.fields_modified += 1;
            ctx.record(
                node,
                &action.rule,
                ChangeKind::FieldModified {
                    component: component.to_owned(),
                    field: field.clone(),
                    old,
                    new: value,
                    defaulted,
                },
            );
        }
        Ok(())
    }
}

fn require_schema<'s>(
    schemas: &'s SchemaRegistry,
    component: &str,
) -> Result<&'s ComponentSchema, RuleError> {
    schemas
        .schema_for(component)
        .ok_or_else(|| RuleError::MissingSchema {
            component: component.to_owned(),
            registered: schemas.registered_names().join(", "),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
