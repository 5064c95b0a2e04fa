//! The modifier engine: owns a scene tree and the live rule table, and runs
//! resolve/apply passes over it.
//!
//! Each [`run_pass`](ModifierEngine::run_pass):
//!
//! 1. Re-indexes the tree if its structure changed since the last index.
//! 2. Resolves every registered rule against every indexed node.
//! 3. Checks that every modified component type has a schema. A missing
//!    schema fails the pass before anything is mutated.
//! 4. Applies each node's merged effect in hierarchy pre-order.
//! 5. Reconciles the templates the effects asked for against the mount
//!    ledger. With `auto_mount` the engine mounts them itself; otherwise the
//!    ones not yet mounted come back in the report.
//!
//! Passes are synchronous and complete; there is no partial or cancelled
//! pass.
//!
//! # Mount ledger
//!
//! Every node the engine mounts is recorded under `(parent, rule, slot)`. On
//! the next pass a slot that is requested again with the same template keeps
//! its node; a slot that is no longer requested (rule unregistered, pattern
//! stops matching) has its node destroyed. Ledger nodes are pruned from the
//! index, so rules never match rule-mounted content and "clear children"
//! never destroys it.
//!
//! With `auto_mount` off the caller mounts [`PassReport::pending_mounts`]
//! and [`PassReport::pending_replacements`] itself and hands each new node
//! back through [`record_mount`](ModifierEngine::record_mount) or
//! [`record_replacement`](ModifierEngine::record_replacement). Recorded
//! nodes are treated exactly like engine-mounted ones, including being
//! unmounted once no rule asks for them. Unrecorded nodes count as
//! ordinary content.
//!
//! # Example
//!
//! ```
//! use grove_rules::prelude::*;
//!
//! let mut tree = SceneTree::new();
//! let root = tree
//!     .instantiate(&NodeTemplate::new("Body").with_child(NodeTemplate::new("Head")), None)
//!     .unwrap();
//!
//! let mut engine = ModifierEngine::new(tree, root, SchemaRegistry::new(), EngineConfig::default());
//! engine.register_rule(Rule::new("hat", "Body.Head").unwrap().add_child(NodeTemplate::new("Hat")));
//!
//! let report = engine.run_pass().unwrap();
//! assert_eq!(report.mounted, 1);
//! assert!(!engine.needs_pass());
//!
//! engine.unregister_rule("hat");
//! let report = engine.run_pass().unwrap();
//! assert_eq!(report.unmounted, 1);
//! ```

use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use grove_scene::node::NodeId;
use grove_scene::schema::{ComponentSchema, SchemaRegistry};
use grove_scene::template::NodeTemplate;
use grove_scene::tree::SceneTree;
use grove_scene::SceneError;
use serde::Serialize;
use tracing::{debug, info};

use crate::apply::{ApplyContext, ApplyOutcome, EffectApplier, PendingMount, PendingReplacement};
use crate::config::EngineConfig;
use crate::index::HierarchyIndex;
use crate::journal::{ChangeKind, EffectJournal, NodeChange};
use crate::pattern::Pattern;
use crate::query::{self, FindResult};
use crate::registry::RuleRegistry;
use crate::resolve::{resolve, ResolvedEffects};
use crate::rule::{Rule, RuleId};
use crate::RuleError;

// ---------------------------------------------------------------------------
// PassReport
// ---------------------------------------------------------------------------

/// Summary of one [`ModifierEngine::run_pass`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    /// 1-based pass number.
    pub pass: u64,
    pub nodes_indexed: usize,
    /// Nodes matched by at least one rule.
    pub nodes_matched: usize,
    pub effects_applied: usize,
    /// Effects whose node died before they could be applied.
    pub effects_dropped: usize,
    pub components_removed: usize,
    pub components_replaced: usize,
    pub fields_modified: usize,
    pub fields_defaulted: usize,
    pub children_destroyed: usize,
    pub mounted: usize,
    pub unmounted: usize,
    pub conflicts: usize,
    pub ambiguous_conflicts: usize,
    /// Fingerprint of the resolved effects.
    pub fingerprint: String,
    /// Additions left for the caller to mount (only when `auto_mount` is
    /// off). Slots already recorded in the ledger are not repeated.
    pub pending_mounts: Vec<PendingMount>,
    /// Replacements left for the caller to mount, as above.
    pub pending_replacements: Vec<PendingReplacement>,
    /// Wall-clock time of the pass.
    pub elapsed: Duration,
}

impl PassReport {
    fn absorb(&mut self, outcome: ApplyOutcome) -> (Vec<PendingMount>, Vec<PendingReplacement>) {
        if outcome.dropped {
            self.effects_dropped += 1;
            return (Vec::new(), Vec::new());
        }
        self.effects_applied += 1;
        self.children_destroyed += outcome.destroyed_children.len();
        self.components_removed += outcome.components_removed;
        self.components_replaced += outcome.components_replaced;
        self.fields_modified += outcome.fields_modified;
        self.fields_defaulted += outcome.fields_defaulted;
        (outcome.mounts, outcome.replacements)
    }
}

// ---------------------------------------------------------------------------
// Mount ledger
// ---------------------------------------------------------------------------

/// Which of a rule's requested templates a mounted node stands for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum MountSlot {
    /// Position in the rule's add-children list.
    Child(usize),
    /// Replacement for the named component type.
    Replacement(String),
}

/// Ledger key: the node that asked, the rule that asked, and for what.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MountKey {
    pub parent: NodeId,
    pub rule: RuleId,
    pub slot: MountSlot,
}

#[derive(Debug, Clone)]
struct MountEntry {
    node: NodeId,
    template: NodeTemplate,
}

/// Nodes mounted by the engine, keyed by what requested them.
#[derive(Debug, Default)]
pub struct MountLedger {
    entries: BTreeMap<MountKey, MountEntry>,
}

impl MountKey {
    fn for_mount(mount: &PendingMount) -> Self {
        Self {
            parent: mount.parent,
            rule: mount.rule.clone(),
            slot: MountSlot::Child(mount.ordinal),
        }
    }

    fn for_replacement(replacement: &PendingReplacement) -> Self {
        Self {
            parent: replacement.node,
            rule: replacement.rule.clone(),
            slot: MountSlot::Replacement(replacement.component.clone()),
        }
    }

    fn pending(self, template: NodeTemplate) -> Pending {
        match self.slot {
            MountSlot::Child(ordinal) => Pending::Mount(PendingMount {
                parent: self.parent,
                rule: self.rule,
                ordinal,
                template,
            }),
            MountSlot::Replacement(component) => Pending::Replacement(PendingReplacement {
                node: self.parent,
                component,
                rule: self.rule,
                template,
            }),
        }
    }
}

enum Pending {
    Mount(PendingMount),
    Replacement(PendingReplacement),
}

impl MountLedger {
    /// Number of mounted slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The node mounted for `key`, if any.
    pub fn node(&self, key: &MountKey) -> Option<NodeId> {
        self.entries.get(key).map(|e| e.node)
    }

    /// Every mounted node.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.values().map(|e| e.node)
    }
}

// ---------------------------------------------------------------------------
// ModifierEngine
// ---------------------------------------------------------------------------

/// Owns a tree, its schemas and the rule table, and keeps the tree in step
/// with the rules.
#[derive(Debug)]
pub struct ModifierEngine {
    tree: SceneTree,
    root: NodeId,
    schemas: SchemaRegistry,
    registry: RuleRegistry,
    config: EngineConfig,
    index: HierarchyIndex,
    /// Tree structure version the index was built from.
    indexed_version: u64,
    applier: EffectApplier,
    journal: EffectJournal,
    ledger: MountLedger,
    last_resolved: Option<ResolvedEffects>,
    /// Registry generation seen by the last pass.
    last_generation: Option<u64>,
    /// Tree structure version right after the last pass.
    settled_version: u64,
    tree_dirty: bool,
    pass_count: u64,
}

impl ModifierEngine {
    /// Take ownership of `tree` and index the subtree at `root`.
    pub fn new(tree: SceneTree, root: NodeId, schemas: SchemaRegistry, config: EngineConfig) -> Self {
        let index = HierarchyIndex::build(&tree, root);
        let version = tree.structure_version();
        Self {
            tree,
            root,
            schemas,
            registry: RuleRegistry::new(),
            config,
            index,
            indexed_version: version,
            applier: EffectApplier::new(),
            journal: EffectJournal::new(),
            ledger: MountLedger::default(),
            last_resolved: None,
            last_generation: None,
            settled_version: version,
            tree_dirty: false,
            pass_count: 0,
        }
    }

    // -- rules --------------------------------------------------------------

    /// Register a rule, replacing any rule with the same id.
    pub fn register_rule(&mut self, rule: Rule) -> Option<Rule> {
        self.registry.register(rule)
    }

    /// Unregister a rule. Its effects stay in place except for the nodes it
    /// mounted, which the next pass unmounts.
    pub fn unregister_rule(&mut self, id: impl Into<RuleId>) -> Option<Rule> {
        self.registry.unregister(&id.into())
    }

    /// The live rule table.
    pub fn rules(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Register or replace a component schema.
    pub fn register_schema(&mut self, schema: ComponentSchema) -> Option<ComponentSchema> {
        self.schemas.register(schema)
    }

    /// Registered component schemas.
    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    // -- change tracking ----------------------------------------------------

    /// Rebuild the hierarchy index from the current tree.
    pub fn reindex(&mut self) {
        let excluded: HashSet<NodeId> = self.ledger.nodes().collect();
        self.index = HierarchyIndex::build_excluding(&self.tree, self.root, &excluded);
        self.indexed_version = self.tree.structure_version();
        debug!(root = %self.root, nodes = self.index.len(), "reindexed");
    }

    /// Flag the tree as changed so the next pass re-indexes and
    /// [`needs_pass`](Self::needs_pass) reports `true`.
    pub fn mark_tree_changed(&mut self) {
        self.tree_dirty = true;
    }

    /// `true` if rules or the tree changed since the last pass.
    pub fn needs_pass(&self) -> bool {
        self.tree_dirty
            || self.last_generation != Some(self.registry.generation())
            || self.tree.structure_version() != self.settled_version
    }

    // -- passes -------------------------------------------------------------

    /// Resolve and apply every rule once.
    pub fn run_pass(&mut self) -> Result<PassReport, RuleError> {
        let start = Instant::now();
        if self.tree_dirty || self.tree.structure_version() != self.indexed_version {
            self.reindex();
        }

        let resolved = resolve(&self.tree, &self.index, &self.registry, self.config.match_options());
        for effect in resolved.iter() {
            EffectApplier::check_schemas(&self.schemas, effect)?;
        }

        let pass = self.pass_count + 1;
        let mut report = PassReport {
            pass,
            nodes_indexed: self.index.len(),
            nodes_matched: resolved.len(),
            conflicts: resolved.conflicts,
            ambiguous_conflicts: resolved.ambiguous_conflicts,
            fingerprint: resolved.fingerprint(),
            ..PassReport::default()
        };

        let mut mounts = Vec::new();
        let mut replacements = Vec::new();
        {
            let mut ctx = ApplyContext {
                tree: &mut self.tree,
                schemas: &self.schemas,
                index: &self.index,
                journal: self.config.journal.then_some(&mut self.journal),
                pass,
            };
            for effect in resolved.iter().filter(|e| !e.is_noop()) {
                let outcome = self.applier.apply(&mut ctx, effect)?;
                let (m, r) = report.absorb(outcome);
                mounts.extend(m);
                replacements.extend(r);
            }
        }

        self.reconcile_mounts(pass, mounts, replacements, &mut report)?;

        self.applier.prune(&self.tree);
        self.pass_count = pass;
        self.last_generation = Some(self.registry.generation());
        self.settled_version = self.tree.structure_version();
        self.tree_dirty = false;
        self.last_resolved = Some(resolved);
        report.elapsed = start.elapsed();

        info!(
            pass,
            matched = report.nodes_matched,
            applied = report.effects_applied,
            dropped = report.effects_dropped,
            fields = report.fields_modified,
            mounted = report.mounted,
            unmounted = report.unmounted,
            conflicts = report.conflicts,
            elapsed_us = report.elapsed.as_micros() as u64,
            "modifier pass complete"
        );
        Ok(report)
    }

    /// Run a pass only if [`needs_pass`](Self::needs_pass).
    pub fn run_if_needed(&mut self) -> Result<Option<PassReport>, RuleError> {
        if self.needs_pass() {
            self.run_pass().map(Some)
        } else {
            Ok(None)
        }
    }

    fn reconcile_mounts(
        &mut self,
        pass: u64,
        mounts: Vec<PendingMount>,
        replacements: Vec<PendingReplacement>,
        report: &mut PassReport,
    ) -> Result<(), RuleError> {
        let requested: Vec<(MountKey, NodeTemplate)> = mounts
            .into_iter()
            .map(|m| (MountKey::for_mount(&m), m.template))
            .chain(
                replacements
                    .into_iter()
                    .map(|r| (MountKey::for_replacement(&r), r.template)),
            )
            .collect();
        let wanted: HashSet<&MountKey> = requested.iter().map(|(k, _)| k).collect();

        let stale: Vec<MountKey> = self
            .ledger
            .entries
            .keys()
            .filter(|k| !wanted.contains(k))
            .cloned()
            .collect();
        for key in stale {
            if let Some(entry) = self.ledger.entries.remove(&key) {
                self.unmount(pass, &key, entry.node, report)?;
            }
        }

        for (key, template) in requested {
            let existing = self.ledger.entries.get(&key).map(|e| (e.node, e.template == template));
            match existing {
                Some((node, same))
                    if same
                        && self.tree.is_alive(node)
                        && self.tree.parent(node) == Some(key.parent) =>
                {
                    continue;
                }
                // Template changed or the node was destroyed externally.
                Some((node, _)) => self.unmount(pass, &key, node, report)?,
                None => {}
            }
            self.ledger.entries.remove(&key);
            if !self.tree.is_alive(key.parent) {
                continue;
            }
            if !self.config.auto_mount {
                match key.pending(template) {
                    Pending::Mount(m) => report.pending_mounts.push(m),
                    Pending::Replacement(r) => report.pending_replacements.push(r),
                }
                continue;
            }

            let node = self.tree.instantiate(&template, Some(key.parent))?;
            report.mounted += 1;
            debug!(parent = %key.parent, rule = %key.rule, child = %node, "mounted");
            self.record(pass, key.parent, &key.rule, ChangeKind::ChildMounted { child: node });
            self.ledger.entries.insert(key, MountEntry { node, template });
        }
        Ok(())
    }

    /// Record `node` as the caller's mount of a pending addition.
    ///
    /// From here on the node is pruned from the index and is unmounted by the
    /// engine once no rule asks for it. `node` must be alive and a child of
    /// `mount.parent`.
    pub fn record_mount(&mut self, mount: &PendingMount, node: NodeId) -> Result<(), RuleError> {
        self.record_external(MountKey::for_mount(mount), mount.template.clone(), node)
    }

    /// Record `node` as the caller's mount of a pending replacement.
    pub fn record_replacement(
        &mut self,
        replacement: &PendingReplacement,
        node: NodeId,
    ) -> Result<(), RuleError> {
        self.record_external(
            MountKey::for_replacement(replacement),
            replacement.template.clone(),
            node,
        )
    }

    fn record_external(
        &mut self,
        key: MountKey,
        template: NodeTemplate,
        node: NodeId,
    ) -> Result<(), RuleError> {
        if !self.tree.is_alive(node) {
            return Err(SceneError::StaleNode { node }.into());
        }
        if self.tree.parent(node) != Some(key.parent) {
            return Err(RuleError::MountMismatch {
                node,
                parent: key.parent,
            });
        }
        debug!(parent = %key.parent, rule = %key.rule, child = %node, "recorded external mount");
        let pass = self.pass_count;
        self.record(pass, key.parent, &key.rule, ChangeKind::ChildMounted { child: node });
        self.index.exclude_from_originals([node]);
        self.ledger.entries.insert(key, MountEntry { node, template });
        // The next pass must re-index so the node is pruned, not just hidden
        // from original children.
        self.tree_dirty = true;
        Ok(())
    }

    fn unmount(
        &mut self,
        pass: u64,
        key: &MountKey,
        node: NodeId,
        report: &mut PassReport,
    ) -> Result<(), RuleError> {
        if !self.tree.is_alive(node) {
            return Ok(());
        }
        self.tree.destroy(node)?;
        report.unmounted += 1;
        debug!(parent = %key.parent, rule = %key.rule, child = %node, "unmounted");
        self.record(pass, key.parent, &key.rule, ChangeKind::ChildUnmounted { child: node });
        Ok(())
    }

    fn record(&mut self, pass: u64, node: NodeId, rule: &RuleId, change: ChangeKind) {
        if self.config.journal {
            self.journal.record(NodeChange {
                node,
                rule: rule.clone(),
                pass,
                change,
            });
        }
    }

    // -- queries ------------------------------------------------------------

    /// Find nodes under the engine root matching a pattern string.
    pub fn find_nodes(&self, pattern: &str) -> Result<FindResult, RuleError> {
        Ok(self.find_nodes_with(&Pattern::parse(pattern)?))
    }

    /// Find nodes under the engine root matching a compiled pattern.
    pub fn find_nodes_with(&self, pattern: &Pattern) -> FindResult {
        query::find_nodes(&self.tree, pattern, self.root, self.config.match_options())
    }

    // -- accessors ----------------------------------------------------------

    /// The tree being modified.
    pub fn tree(&self) -> &SceneTree {
        &self.tree
    }

    /// Mutable access to the tree. Structural changes are picked up by the
    /// next pass; call [`mark_tree_changed`](Self::mark_tree_changed) after
    /// component-only edits that rules should see again.
    pub fn tree_mut(&mut self) -> &mut SceneTree {
        &mut self.tree
    }

    /// Root of the indexed subtree.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Index built by the most recent re-index.
    pub fn index(&self) -> &HierarchyIndex {
        &self.index
    }

    /// Changes recorded so far, across all passes.
    pub fn journal(&self) -> &EffectJournal {
        &self.journal
    }

    /// Nodes mounted for rules, by engine or caller.
    pub fn ledger(&self) -> &MountLedger {
        &self.ledger
    }

    /// Effects resolved by the most recent pass.
    pub fn last_resolved(&self) -> Option<&ResolvedEffects> {
        self.last_resolved.as_ref()
    }

    /// Passes run so far.
    pub fn pass_count(&self) -> u64 {
        self.pass_count
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use grove_scene::component::Component;
    use grove_scene::schema::FieldSchema;
    use serde_json::json;

    fn engine(config: EngineConfig) -> ModifierEngine {
        let mut tree = SceneTree::new();
        let root = tree
            .instantiate(
                &NodeTemplate::new("Body")
                    .with_child(
                        NodeTemplate::new("Head")
                            .with_component("light", Component::new().with("intensity", json!(1.0))),
                    )
                    .with_child(NodeTemplate::new("LeftArm"))
                    .with_child(NodeTemplate::new("RightArm")),
                None,
            )
            .unwrap();
        let schemas = SchemaRegistry::new().with(
            ComponentSchema::new("light").field("intensity", FieldSchema::number(1.0)),
        );
        ModifierEngine::new(tree, root, schemas, config)
    }

    fn head(engine: &ModifierEngine) -> NodeId {
        engine.tree().children(engine.root())[0]
    }

    #[test]
    fn needs_pass_tracks_rules_and_tree() {
        let mut e = engine(EngineConfig::default());
        assert!(e.needs_pass(), "never run");
        e.run_pass().unwrap();
        assert!(!e.needs_pass());
        assert!(e.run_if_needed().unwrap().is_none());

        e.register_rule(Rule::new("r", "**").unwrap().remove("mesh"));
        assert!(e.needs_pass());
        e.run_pass().unwrap();
        assert!(!e.needs_pass());

        let root = e.root();
        e.tree_mut().spawn("Tail", Some(root)).unwrap();
        assert!(e.needs_pass());
        assert_eq!(e.run_if_needed().unwrap().map(|r| r.pass), Some(3));
        assert_eq!(e.pass_count(), 3);
    }

    #[test]
    fn mounted_children_are_stable_across_passes() {
        let mut e = engine(EngineConfig::default());
        e.register_rule(
            Rule::new("hat", "Body.Head")
                .unwrap()
                .add_children(vec![NodeTemplate::new("Hat"), NodeTemplate::new("Feather")]),
        );
        let first = e.run_pass().unwrap();
        assert_eq!(first.mounted, 2);
        let children = e.tree().children(head(&e)).to_vec();

        let second = e.run_pass().unwrap();
        assert_eq!(second.mounted, 0);
        assert_eq!(second.unmounted, 0);
        assert_eq!(e.tree().children(head(&e)), children.as_slice());
        assert_eq!(first.fingerprint, second.fingerprint);
    }

    #[test]
    fn rules_never_match_mounted_content() {
        let mut e = engine(EngineConfig::default());
        e.register_rule(Rule::new("grow", "**").unwrap().add_child(NodeTemplate::new("Leaf")));
        let first = e.run_pass().unwrap();
        assert_eq!(first.mounted, 4);
        let count = e.tree().node_count();
        e.run_pass().unwrap();
        assert_eq!(e.tree().node_count(), count);
    }

    #[test]
    fn changed_template_is_remounted() {
        let mut e = engine(EngineConfig::default());
        e.register_rule(Rule::new("hat", "Body.Head").unwrap().add_child(NodeTemplate::new("Cap")));
        e.run_pass().unwrap();
        e.register_rule(Rule::new("hat", "Body.Head").unwrap().add_child(NodeTemplate::new("Crown")));
        let report = e.run_pass().unwrap();
        assert_eq!((report.mounted, report.unmounted), (1, 1));
        let names: Vec<_> = e
            .tree()
            .children(head(&e))
            .iter()
            .filter_map(|&c| e.tree().name(c))
            .collect();
        assert_eq!(names, vec!["Crown"]);
    }

    #[test]
    fn replacement_is_mounted_under_node() {
        let mut e = engine(EngineConfig::default());
        e.register_rule(Rule::new("lamp", "Body.Head").unwrap().replace("light", NodeTemplate::new("Lamp")));
        let report = e.run_pass().unwrap();
        assert_eq!(report.components_replaced, 1);
        assert_eq!(report.mounted, 1);
        let h = head(&e);
        assert!(!e.tree().has_component(h, "light"));
        assert_eq!(e.tree().name(e.tree().children(h)[0]), Some("Lamp"));
    }

    #[test]
    fn manual_mount_mode_returns_pending_work() {
        let config = EngineConfig {
            auto_mount: false,
            ..EngineConfig::default()
        };
        let mut e = engine(config);
        e.register_rule(Rule::new("hat", "Body.Head").unwrap().add_child(NodeTemplate::new("Hat")));
        let report = e.run_pass().unwrap();
        assert_eq!(report.mounted, 0);
        assert_eq!(report.pending_mounts.len(), 1);
        assert_eq!(report.pending_mounts[0].parent, head(&e));
        assert!(e.tree().children(head(&e)).is_empty());
        assert!(e.ledger().is_empty());
    }

    #[test]
    fn recorded_mount_is_kept_and_not_requested_again() {
        let config = EngineConfig {
            auto_mount: false,
            ..EngineConfig::default()
        };
        let mut e = engine(config);
        e.register_rule(Rule::new("hat", "Body.Head").unwrap().add_child(NodeTemplate::new("Hat")));
        let first = e.run_pass().unwrap();
        let pending = first.pending_mounts[0].clone();
        let hat = e.tree_mut().instantiate(&pending.template, Some(pending.parent)).unwrap();
        e.record_mount(&pending, hat).unwrap();
        assert_eq!(e.ledger().len(), 1);
        assert!(e.index().get(head(&e)).unwrap().original_child_ids.is_empty());

        let second = e.run_pass().unwrap();
        assert!(second.pending_mounts.is_empty());
        assert!(!e.index().contains(hat), "recorded mounts are pruned from the index");

        e.unregister_rule("hat");
        let third = e.run_pass().unwrap();
        assert_eq!(third.unmounted, 1);
        assert!(!e.tree().is_alive(hat));
    }

    #[test]
    fn recording_checks_node_and_parent() {
        let config = EngineConfig {
            auto_mount: false,
            ..EngineConfig::default()
        };
        let mut e = engine(config);
        e.register_rule(Rule::new("lamp", "Body.Head").unwrap().replace("light", NodeTemplate::new("Lamp")));
        let report = e.run_pass().unwrap();
        let pending = report.pending_replacements[0].clone();

        let root = e.root();
        let stray = e.tree_mut().instantiate(&pending.template, Some(root)).unwrap();
        assert!(matches!(
            e.record_replacement(&pending, stray),
            Err(RuleError::MountMismatch { .. })
        ));
        e.tree_mut().destroy(stray).unwrap();
        assert!(matches!(
            e.record_replacement(&pending, stray),
            Err(RuleError::Scene(SceneError::StaleNode { .. }))
        ));
        assert!(e.ledger().is_empty());

        let lamp = e.tree_mut().instantiate(&pending.template, Some(pending.node)).unwrap();
        e.record_replacement(&pending, lamp).unwrap();
        let journaled = e
            .journal()
            .changes_for_node(pending.node)
            .filter(|c| matches!(c.change, ChangeKind::ChildMounted { child } if child == lamp))
            .count();
        assert_eq!(journaled, 1);
    }

    #[test]
    fn rule_without_actions_matches_but_applies_nothing() {
        let mut e = engine(EngineConfig::default());
        e.register_rule(Rule::new("watch", "Body.Head").unwrap());
        let report = e.run_pass().unwrap();
        assert_eq!(report.nodes_matched, 1);
        assert_eq!(report.effects_applied, 0);
    }

    #[test]
    fn journal_can_be_disabled() {
        let config = EngineConfig {
            journal: false,
            ..EngineConfig::default()
        };
        let mut e = engine(config);
        e.register_rule(Rule::new("r", "**").unwrap().remove("light"));
        let report = e.run_pass().unwrap();
        assert_eq!(report.components_removed, 1);
        assert!(e.journal().is_empty());
    }

    #[test]
    fn journal_attributes_changes_to_rules_and_passes() {
        let mut e = engine(EngineConfig::default());
        e.register_rule(Rule::new("bright", "Body.Head").unwrap().modify("light", "intensity", json!(3.0)));
        e.register_rule(Rule::new("hat", "Body.Head").unwrap().add_child(NodeTemplate::new("Hat")));
        e.run_pass().unwrap();
        let h = head(&e);
        assert_eq!(e.journal().changes_for_node(h).count(), 2);
        assert_eq!(e.journal().changes_by_rule(&RuleId::from("bright")).count(), 1);
        assert_eq!(e.journal().changes_in_pass(1).count(), 2);
    }

    #[test]
    fn case_insensitive_config_applies_to_matching() {
        let config = EngineConfig {
            case_sensitive: false,
            ..EngineConfig::default()
        };
        let mut e = engine(config);
        e.register_rule(Rule::new("r", "body.head").unwrap().remove("light"));
        e.run_pass().unwrap();
        assert!(!e.tree().has_component(head(&e), "light"));
        assert!(matches!(e.find_nodes("BODY.HEAD").unwrap(), FindResult::One(_)));
    }
}
