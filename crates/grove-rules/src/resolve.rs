//! Rule resolution: fold every rule matching a node into one
//! [`MergedEffect`].
//!
//! Matching rules are visited in precedence order (specificity descending,
//! then most recently registered first) and folded with these policies:
//!
//! - **clear children**: set by the first rule that declares it, never unset.
//! - **component actions** (modify / remove / replace): per component type the
//!   first action encountered wins outright; fields are not merged across
//!   rules. Different component types never conflict.
//! - **add children**: never conflict; every rule's templates are concatenated
//!   from highest to lowest precedence.
//!
//! Within a single rule, remove beats replace beats modify for the same
//! component type.

use std::collections::BTreeMap;

use grove_scene::node::NodeId;
use grove_scene::template::NodeTemplate;
use grove_scene::tree::SceneTree;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::index::HierarchyIndex;
use crate::pattern::MatchOptions;
use crate::registry::{RegisteredRule, RuleRegistry};
use crate::rule::{Action, FieldUpdate, RuleId};

// ---------------------------------------------------------------------------
// Effect types
// ---------------------------------------------------------------------------

/// What happens to one component type on a node.
#[derive(Debug, Clone)]
pub enum ComponentOp {
    Modify(Vec<(String, FieldUpdate)>),
    Remove,
    Replace(NodeTemplate),
}

impl ComponentOp {
    // Lower wins when one rule targets the same component more than once.
    fn rank(&self) -> u8 {
        match self {
            ComponentOp::Remove => 0,
            ComponentOp::Replace(_) => 1,
            ComponentOp::Modify(_) => 2,
        }
    }
}

/// The winning action for one component type, with its provenance.
#[derive(Debug, Clone)]
pub struct ComponentAction {
    pub rule: RuleId,
    pub specificity: u32,
    pub op: ComponentOp,
}

/// A template to mount under the node, with its provenance.
#[derive(Debug, Clone)]
pub struct PendingChild {
    pub rule: RuleId,
    pub specificity: u32,
    /// Position within the rule's own add-children list.
    pub ordinal: usize,
    pub template: NodeTemplate,
}

/// The net modification of one node after resolving all matching rules.
#[derive(Debug, Clone)]
pub struct MergedEffect {
    pub node: NodeId,
    pub clear_children: bool,
    /// Rule that won `clear_children`, if set.
    pub clear_children_rule: Option<RuleId>,
    pub component_actions: BTreeMap<String, ComponentAction>,
    pub add_children: Vec<PendingChild>,
    /// Every matching rule, in precedence order.
    pub matched_rules: Vec<RuleId>,
}

impl MergedEffect {
    fn new(node: NodeId) -> Self {
        Self {
            node,
            clear_children: false,
            clear_children_rule: None,
            component_actions: BTreeMap::new(),
            add_children: Vec::new(),
            matched_rules: Vec::new(),
        }
    }

    /// `true` if applying this effect would change nothing.
    pub fn is_noop(&self) -> bool {
        !self.clear_children && self.component_actions.is_empty() && self.add_children.is_empty()
    }
}

/// Output of one [`resolve`] pass.
#[derive(Debug, Clone, Default)]
pub struct ResolvedEffects {
    effects: BTreeMap<NodeId, MergedEffect>,
    order: Vec<NodeId>,
    /// Component types on which more than one rule competed.
    pub conflicts: usize,
    /// Conflicts between rules of equal specificity.
    pub ambiguous_conflicts: usize,
}

impl ResolvedEffects {
    /// The merged effect for `node`, if any rule matched it.
    pub fn get(&self, node: NodeId) -> Option<&MergedEffect> {
        self.effects.get(&node)
    }

    /// Number of matched nodes.
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Effects in hierarchy pre-order.
    pub fn iter(&self) -> impl Iterator<Item = &MergedEffect> {
        self.order.iter().filter_map(|id| self.effects.get(id))
    }

    /// BLAKE3 hex digest of a canonical summary of every effect.
    ///
    /// Functional field updates hash by field name only, since closures have
    /// no observable identity.
    pub fn fingerprint(&self) -> String {
        let summary: Vec<EffectSummary<'_>> = self.iter().map(EffectSummary::from).collect();
        match serde_json::to_vec(&summary) {
            Ok(bytes) => blake3::hash(&bytes).to_hex().to_string(),
            Err(e) => {
                warn!(error = %e, "failed to serialize effect summary for fingerprint");
                String::new()
            }
        }
    }
}

#[derive(Serialize)]
struct EffectSummary<'a> {
    node: u64,
    clear_children: Option<&'a RuleId>,
    components: Vec<(&'a str, &'a RuleId, u32, serde_json::Value)>,
    add_children: Vec<(&'a RuleId, usize, &'a NodeTemplate)>,
}

impl<'a> From<&'a MergedEffect> for EffectSummary<'a> {
    fn from(effect: &'a MergedEffect) -> Self {
        let components = effect
            .component_actions
            .iter()
            .map(|(name, action)| {
                let op = match &action.op {
                    ComponentOp::Remove => serde_json::json!("remove"),
                    ComponentOp::Replace(t) => serde_json::json!({ "replace": t }),
                    ComponentOp::Modify(updates) => {
                        let fields: serde_json::Map<String, serde_json::Value> = updates
                            .iter()
                            .map(|(field, update)| {
                                let v = match update {
                                    FieldUpdate::Literal(v) => v.clone(),
                                    FieldUpdate::Functional(_) => serde_json::json!("<fn>"),
                                };
                                (field.clone(), v)
                            })
                            .collect();
                        serde_json::json!({ "modify": fields })
                    }
                };
                (name.as_str(), &action.rule, action.specificity, op)
            })
            .collect();
        Self {
            node: effect.node.to_raw(),
            clear_children: effect.clear_children_rule.as_ref(),
            components,
            add_children: effect
                .add_children
                .iter()
                .map(|c| (&c.rule, c.ordinal, &c.template))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// resolve
// ---------------------------------------------------------------------------

/// Resolve every registered rule against every indexed node.
///
/// Nodes matched by no rule have no entry in the result.
pub fn resolve(
    tree: &SceneTree,
    index: &HierarchyIndex,
    registry: &RuleRegistry,
    options: MatchOptions,
) -> ResolvedEffects {
    let ordered = registry.ordered();
    let mut out = ResolvedEffects::default();

    for meta in index.iter() {
        let matching: Vec<&RegisteredRule> = ordered
            .iter()
            .copied()
            .filter(|r| r.rule.pattern.matches(tree, meta, options))
            .collect();
        if matching.is_empty() {
            continue;
        }
        trace!(node = %meta.id, path = %meta.path, rules = matching.len(), "rules matched");

        let effect = merge(meta.id, &matching, &mut out);
        out.order.push(meta.id);
        out.effects.insert(meta.id, effect);
    }

    debug!(
        nodes = index.len(),
        matched = out.effects.len(),
        conflicts = out.conflicts,
        "resolve complete"
    );
    out
}

/// Fold precedence-ordered rules into one effect.
fn merge(node: NodeId, rules: &[&RegisteredRule], stats: &mut ResolvedEffects) -> MergedEffect {
    let mut effect = MergedEffect::new(node);

    for registered in rules {
        let rule = &registered.rule;
        effect.matched_rules.push(rule.id.clone());

        let mut component_ops: Vec<(&str, ComponentOp)> = Vec::new();
        for action in &rule.actions {
            trace!(node = %node, rule = %rule.id, action = action.kind_name(), "merging action");
            match action {
                Action::ClearChildren => {
                    if !effect.clear_children {
                        effect.clear_children = true;
                        effect.clear_children_rule = Some(rule.id.clone());
                    }
                }
                Action::AddChildren(templates) => {
                    let base = effect
                        .add_children
                        .iter()
                        .filter(|c| c.rule == rule.id)
                        .count();
                    effect.add_children.extend(templates.iter().enumerate().map(|(i, t)| {
                        PendingChild {
                            rule: rule.id.clone(),
                            specificity: rule.specificity,
                            ordinal: base + i,
                            template: t.clone(),
                        }
                    }));
                }
                Action::ModifyComponent { component, updates } => {
                    component_ops.push((component.as_str(), ComponentOp::Modify(updates.clone())));
                }
                Action::RemoveComponent { component } => {
                    component_ops.push((component.as_str(), ComponentOp::Remove));
                }
                Action::ReplaceComponent {
                    component,
                    replacement,
                } => {
                    component_ops.push((component.as_str(), ComponentOp::Replace(replacement.clone())));
                }
            }
        }

        // Stable sort keeps declaration order among equal ranks.
        component_ops.sort_by_key(|(_, op)| op.rank());
        for (component, op) in component_ops {
            match effect.component_actions.get(component) {
                Some(winner) if winner.rule == rule.id => {}
                Some(winner) => {
                    stats.conflicts += 1;
                    if winner.specificity == rule.specificity {
                        stats.ambiguous_conflicts += 1;
                        warn!(
                            node = %node,
                            component = %component,
                            winner = %winner.rule,
                            loser = %rule.id,
                            specificity = rule.specificity,
                            "equal-specificity rules conflict; most recently registered wins"
                        );
                    } else {
                        debug!(
                            node = %node,
                            component = %component,
                            winner = %winner.rule,
                            loser = %rule.id,
                            "component action overridden by more specific rule"
                        );
                    }
                }
                None => {
                    effect.component_actions.insert(
                        component.to_owned(),
                        ComponentAction {
                            rule: rule.id.clone(),
                            specificity: rule.specificity,
                            op,
                        },
                    );
                }
            }
        }
    }
    effect
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
