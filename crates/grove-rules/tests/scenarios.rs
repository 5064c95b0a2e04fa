//! End-to-end scenarios over a small humanoid scene.
//!
//! Run with `RUST_LOG=grove_rules=debug` to see conflict resolution.

use grove_rules::prelude::*;
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Body
/// ├── Head   [light]
/// ├── LeftArm
/// └── RightArm [light]
fn body() -> NodeTemplate {
    let light = || {
        Component::new()
            .with("intensity", json!(1.0))
            .with("color", json!("#ffffff"))
    };
    NodeTemplate::new("Body")
        .with_child(NodeTemplate::new("Head").with_component("light", light()))
        .with_child(NodeTemplate::new("LeftArm"))
        .with_child(NodeTemplate::new("RightArm").with_component("light", light()))
}

fn schemas() -> SchemaRegistry {
    SchemaRegistry::new().with(
        ComponentSchema::new("light")
            .field("intensity", FieldSchema::number(1.0).with_range(0.0, 10.0))
            .field("color", FieldSchema::color("#ffffff")),
    )
}

fn engine() -> ModifierEngine {
    init_tracing();
    let mut tree = SceneTree::new();
    let root = tree.instantiate(&body(), None).unwrap();
    ModifierEngine::new(tree, root, schemas(), EngineConfig::default())
}

fn manual_engine() -> ModifierEngine {
    init_tracing();
    let mut tree = SceneTree::new();
    let root = tree.instantiate(&body(), None).unwrap();
    let config = EngineConfig {
        auto_mount: false,
        ..EngineConfig::default()
    };
    ModifierEngine::new(tree, root, schemas(), config)
}

/// Mount everything a manual-mode pass asked for and hand it back.
fn mount_pending(engine: &mut ModifierEngine, report: &PassReport) {
    for pending in &report.pending_mounts {
        let node = engine
            .tree_mut()
            .instantiate(&pending.template, Some(pending.parent))
            .unwrap();
        engine.record_mount(pending, node).unwrap();
    }
    for pending in &report.pending_replacements {
        let node = engine
            .tree_mut()
            .instantiate(&pending.template, Some(pending.node))
            .unwrap();
        engine.record_replacement(pending, node).unwrap();
    }
}

fn child(engine: &ModifierEngine, name: &str) -> NodeId {
    engine
        .tree()
        .children(engine.root())
        .iter()
        .copied()
        .find(|&c| engine.tree().name(c) == Some(name))
        .unwrap()
}

#[test]
fn literal_path_matches_exactly_one_node() {
    let e = engine();
    let head = child(&e, "Head");
    let pattern = Pattern::parse("Body.Head").unwrap();
    let options = MatchOptions::default();

    assert!(pattern.matches(e.tree(), e.index().get(head).unwrap(), options));
    let arm = child(&e, "LeftArm");
    assert!(!pattern.matches(e.tree(), e.index().get(arm).unwrap(), options));
}

#[test]
fn double_star_matches_every_node() {
    let e = engine();
    let pattern = Pattern::parse("**").unwrap();
    let options = MatchOptions::default();
    assert!(e.index().iter().all(|m| pattern.matches(e.tree(), m, options)));
    assert_eq!(e.find_nodes("**").unwrap().len(), 4);
    assert!(matches!(e.find_nodes("Body.["), Err(RuleError::MalformedPattern { .. })));
}

#[test]
fn component_filter_restricts_direct_children() {
    let e = engine();
    let hits = e.find_nodes("Body.*[light]").unwrap().into_vec();
    assert_eq!(hits, vec![child(&e, "Head"), child(&e, "RightArm")]);
}

#[test]
fn specific_modify_beats_catch_all_remove() {
    let mut e = engine();
    e.register_rule(Rule::new("strip", "**").unwrap().remove("light"));
    e.register_rule(
        Rule::new("head-glow", "Body.Head")
            .unwrap()
            .modify("light", "intensity", json!(2)),
    );
    let report = e.run_pass().unwrap();

    let head = child(&e, "Head");
    let effect = e.last_resolved().unwrap().get(head).unwrap();
    let action = &effect.component_actions["light"];
    assert_eq!(action.rule, RuleId::from("head-glow"));
    assert!(matches!(action.op, ComponentOp::Modify(_)));

    assert_eq!(e.tree().field(head, "light", "intensity"), Some(&json!(2.0)));
    assert!(!e.tree().has_component(child(&e, "RightArm"), "light"));
    assert_eq!(report.components_removed, 1);
    assert_eq!(report.conflicts, 1);
}

#[test]
fn clear_children_keeps_rule_added_child() {
    let mut e = engine();
    e.register_rule(Rule::new("badge", "Body").unwrap().add_child(NodeTemplate::new("Badge")));
    e.run_pass().unwrap();
    assert_eq!(e.tree().children(e.root()).len(), 4);

    e.register_rule(Rule::new("strip", "Body").unwrap().clear_children());
    let report = e.run_pass().unwrap();
    assert_eq!(report.children_destroyed, 3);
    assert_eq!(report.unmounted, 0);

    let remaining = e.tree().children(e.root());
    assert_eq!(remaining.len(), 1);
    assert_eq!(e.tree().name(remaining[0]), Some("Badge"));
}

#[test]
fn clear_children_keeps_caller_mounted_child() {
    let mut e = manual_engine();
    e.register_rule(Rule::new("badge", "Body").unwrap().add_child(NodeTemplate::new("Badge")));
    let first = e.run_pass().unwrap();
    assert_eq!(first.pending_mounts.len(), 1);
    mount_pending(&mut e, &first);
    let badge = child(&e, "Badge");

    e.register_rule(Rule::new("strip", "Body").unwrap().clear_children());
    let report = e.run_pass().unwrap();
    assert_eq!(report.children_destroyed, 3);
    assert!(report.pending_mounts.is_empty());
    assert!(e.tree().is_alive(badge));
    assert_eq!(e.tree().children(e.root()), &[badge]);
}

#[test]
fn caller_mounted_children_settle_in_manual_mode() {
    let mut e = manual_engine();
    e.register_rule(Rule::new("grow", "**").unwrap().add_child(NodeTemplate::new("Leaf")));

    let mut pending_per_pass = Vec::new();
    let mut node_counts = Vec::new();
    for _ in 0..3 {
        let report = e.run_pass().unwrap();
        pending_per_pass.push(report.pending_mounts.len());
        mount_pending(&mut e, &report);
        node_counts.push(e.tree().node_count());
    }
    assert_eq!(pending_per_pass, vec![4, 0, 0]);
    assert_eq!(node_counts, vec![8, 8, 8]);
    assert_eq!(e.find_nodes("**.Leaf").unwrap().len(), 4, "no leaf grew a leaf");
}

#[test]
fn add_and_remove_on_same_node_both_apply() {
    let mut e = engine();
    e.register_rule(Rule::new("strip", "Body.Head").unwrap().remove("light"));
    e.register_rule(Rule::new("lamp", "Body.*").unwrap().add_child(NodeTemplate::new("Lamp")));
    let report = e.run_pass().unwrap();

    let head = child(&e, "Head");
    assert!(!e.tree().has_component(head, "light"));
    assert_eq!(e.tree().children(head).len(), 1);
    assert_eq!(report.mounted, 3);
}

#[test]
fn repeated_passes_are_idempotent() {
    let mut e = engine();
    e.register_rule(
        Rule::new("dim", "**[light]")
            .unwrap()
            .modify_with("light", "intensity", |v| json!(v.as_f64().unwrap_or(0.0) * 0.5)),
    );
    e.register_rule(Rule::new("hat", "Body.Head").unwrap().add_child(NodeTemplate::new("Hat")));

    let first = e.run_pass().unwrap();
    let snapshot = e.tree().snapshot(e.root()).unwrap();
    for _ in 0..3 {
        let again = e.run_pass().unwrap();
        assert_eq!(again.fingerprint, first.fingerprint);
        assert_eq!(again.fields_modified, 0);
        assert_eq!(again.mounted, 0);
    }
    assert_eq!(e.tree().snapshot(e.root()).unwrap(), snapshot);
    assert_eq!(e.tree().field(child(&e, "Head"), "light", "intensity"), Some(&json!(0.5)));
}

#[test]
fn missing_schema_fails_before_any_mutation() {
    let mut e = engine();
    e.register_rule(Rule::new("strip", "**").unwrap().remove("light"));
    e.register_rule(Rule::new("mesh", "Body.Head").unwrap().modify("mesh", "visible", json!(false)));

    let err = e.run_pass().unwrap_err();
    assert!(matches!(err, RuleError::MissingSchema { ref component, .. } if component == "mesh"));
    assert!(e.tree().has_component(child(&e, "Head"), "light"), "no partial pass");
    assert_eq!(e.pass_count(), 0);

    e.register_schema(ComponentSchema::new("mesh").field("visible", FieldSchema::boolean(true)));
    assert!(e.run_pass().is_ok());
}

#[test]
fn invalid_value_falls_back_to_default() {
    let mut e = engine();
    e.register_rule(
        Rule::new("bad", "Body.Head")
            .unwrap()
            .modify("light", "color", json!("not-a-color"))
            .modify("light", "intensity", json!(7)),
    );
    let report = e.run_pass().unwrap();
    let head = child(&e, "Head");
    assert_eq!(e.tree().field(head, "light", "color"), Some(&json!("#ffffff")));
    assert_eq!(e.tree().field(head, "light", "intensity"), Some(&json!(7.0)));
    assert_eq!(report.fields_defaulted, 1);
}

#[test]
fn unregistering_unmounts_added_children_only() {
    let mut e = engine();
    e.register_rule(
        Rule::new("hat", "Body.Head")
            .unwrap()
            .add_child(NodeTemplate::new("Hat"))
            .modify("light", "intensity", json!(4)),
    );
    e.run_pass().unwrap();
    let head = child(&e, "Head");
    assert_eq!(e.tree().children(head).len(), 1);

    assert!(e.unregister_rule("hat").is_some());
    let report = e.run_pass().unwrap();
    assert_eq!(report.unmounted, 1);
    assert!(e.tree().children(head).is_empty());
    // Field changes are not reverted.
    assert_eq!(e.tree().field(head, "light", "intensity"), Some(&json!(4.0)));
    let unmounts = e
        .journal()
        .changes_by_rule(&RuleId::from("hat"))
        .filter(|c| matches!(c.change, ChangeKind::ChildUnmounted { .. }))
        .count();
    assert_eq!(unmounts, 1);
}

#[test]
fn effect_for_destroyed_node_is_dropped() {
    init_tracing();
    let mut tree = SceneTree::new();
    let root = tree.instantiate(&body(), None).unwrap();
    let head = tree.children(root)[0];

    let mut rules = RuleRegistry::new();
    rules.register(Rule::new("strip", "Body.*").unwrap().remove("light"));
    let idx = index(&tree, root);
    let resolved = resolve(&tree, &idx, &rules, MatchOptions::default());
    tree.destroy(head).unwrap();

    let schemas = schemas();
    let mut journal = EffectJournal::new();
    let mut ctx = ApplyContext {
        tree: &mut tree,
        schemas: &schemas,
        index: &idx,
        journal: Some(&mut journal),
        pass: 1,
    };
    let mut applier = EffectApplier::new();
    let outcomes: Vec<ApplyOutcome> = resolved
        .iter()
        .map(|effect| applier.apply(&mut ctx, effect).unwrap())
        .collect();

    assert_eq!(outcomes.iter().filter(|o| o.dropped).count(), 1);
    assert_eq!(journal.len(), 1, "only RightArm lost its light");
}

#[test]
fn predicate_rule_loses_to_any_path_rule() {
    let mut e = engine();
    e.register_rule(
        Rule::with_predicate("named-head", |_: &SceneTree, _: NodeId, meta: &NodeMetadata| {
            meta.name == "Head"
        })
        .modify("light", "intensity", json!(9)),
    );
    e.register_rule(Rule::new("all", "**").unwrap().modify("light", "intensity", json!(3)));
    e.run_pass().unwrap();
    assert_eq!(e.tree().field(child(&e, "Head"), "light", "intensity"), Some(&json!(3.0)));
}

#[test]
fn structural_change_triggers_reindex() {
    let mut e = engine();
    e.register_rule(Rule::new("tails", "Body.Tail").unwrap().add_child(NodeTemplate::new("Tip")));
    let report = e.run_pass().unwrap();
    assert_eq!(report.nodes_matched, 0);

    let root = e.root();
    let tail = e.tree_mut().spawn("Tail", Some(root)).unwrap();
    let report = e.run_if_needed().unwrap().unwrap();
    assert_eq!(report.mounted, 1);
    assert_eq!(e.tree().children(tail).len(), 1);
}
