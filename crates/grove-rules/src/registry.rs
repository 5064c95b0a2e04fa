//! The live rule table.
//!
//! Rules are registered and unregistered by the declaring layer at arbitrary
//! times. The registry is an explicit table owned by whoever drives the
//! engine; every change bumps a generation counter so the driver can tell
//! that a new resolve pass is due.

use std::collections::HashMap;

use crate::rule::{Rule, RuleId};

/// A rule together with the order in which it was registered.
#[derive(Debug, Clone)]
pub struct RegisteredRule {
    pub rule: Rule,
    /// Monotonic registration sequence; re-registering an id assigns a new one.
    pub sequence: u64,
}

/// Table of live rules keyed by id.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    rules: HashMap<RuleId, RegisteredRule>,
    next_sequence: u64,
    generation: u64,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a rule, replacing any rule with the same id.
    ///
    /// Returns the replaced rule.
    pub fn register(&mut self, rule: Rule) -> Option<Rule> {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.generation += 1;
        tracing::debug!(
            rule = %rule.id,
            pattern = %rule.pattern,
            specificity = rule.specificity,
            sequence,
            "rule registered"
        );
        self.rules
            .insert(rule.id.clone(), RegisteredRule { rule, sequence })
            .map(|old| old.rule)
    }

    /// Remove a rule. Unknown ids are a no-op and leave the generation as is.
    pub fn unregister(&mut self, id: &RuleId) -> Option<Rule> {
        let removed = self.rules.remove(id)?;
        self.generation += 1;
        tracing::debug!(rule = %id, "rule unregistered");
        Some(removed.rule)
    }

    /// The registered rule with this id.
    pub fn get(&self, id: &RuleId) -> Option<&Rule> {
        self.rules.get(id).map(|r| &r.rule)
    }

    /// `true` if a rule with this id is registered.
    pub fn contains(&self, id: &RuleId) -> bool {
        self.rules.contains_key(id)
    }

    /// Number of registered rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Counter bumped on every effective register/unregister.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Force a new generation without changing the table, e.g. after a
    /// predicate's captured state changed.
    pub fn bump_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// All rules in precedence order: specificity descending, then most
    /// recently registered first.
    pub fn ordered(&self) -> Vec<&RegisteredRule> {
        let mut out: Vec<&RegisteredRule> = self.rules.values().collect();
        out.sort_by(|a, b| {
            b.rule
                .specificity
                .cmp(&a.rule.specificity)
                .then(b.sequence.cmp(&a.sequence))
        });
        out
    }
}
