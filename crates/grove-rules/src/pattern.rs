//! Pattern compilation, matching and specificity.
//!
//! # Syntax
//!
//! A string pattern is a dot-separated list of segments matched against a
//! node's full indexed path:
//!
//! | segment | matches |
//! |---|---|
//! | `Head` | exactly the segment `Head` |
//! | `*` | exactly one arbitrary segment |
//! | `**` | zero or more whole segments, anywhere in the pattern |
//!
//! A component filter `[light]` may appear anywhere in the string. It is
//! stripped before path matching and additionally requires the node to carry
//! a `light` component. A pattern consisting only of a filter matches every
//! node with that component.
//!
//! # Specificity
//!
//! Each literal segment scores [`LITERAL_WEIGHT`], each `*` scores
//! [`SINGLE_WILDCARD_WEIGHT`], each `**` scores [`ANY_WILDCARD_WEIGHT`] and a
//! component filter adds [`FILTER_WEIGHT`]. Predicate patterns always score
//! [`PREDICATE_SPECIFICITY`] and lose every conflict with a path pattern.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use grove_scene::node::NodeId;
use grove_scene::tree::SceneTree;
use serde::{Deserialize, Serialize};

use crate::index::NodeMetadata;
use crate::RuleError;

pub const LITERAL_WEIGHT: u32 = 100;
pub const SINGLE_WILDCARD_WEIGHT: u32 = 10;
pub const ANY_WILDCARD_WEIGHT: u32 = 1;
pub const FILTER_WEIGHT: u32 = 50;
pub const PREDICATE_SPECIFICITY: u32 = 0;

// ---------------------------------------------------------------------------
// MatchOptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOptions {
    /// Compare literal segments case-sensitively.
    pub case_sensitive: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Segment / PathPattern
// ---------------------------------------------------------------------------

/// One compiled path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Segment {
    Literal(String),
    /// `*`
    Single,
    /// `**`
    Any,
}

impl Segment {
    fn weight(&self) -> u32 {
        match self {
            Segment::Literal(_) => LITERAL_WEIGHT,
            Segment::Single => SINGLE_WILDCARD_WEIGHT,
            Segment::Any => ANY_WILDCARD_WEIGHT,
        }
    }
}

/// A compiled string pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathPattern {
    source: String,
    segments: Vec<Segment>,
    component_filter: Option<String>,
}

impl PathPattern {
    /// Compile a pattern string.
    pub fn parse(source: &str) -> Result<Self, RuleError> {
        let malformed = |reason: &str| RuleError::MalformedPattern {
            pattern: source.to_owned(),
            reason: reason.to_owned(),
        };

        let trimmed = source.trim();
        let (path, component_filter) = split_filter(trimmed).map_err(malformed)?;

        let segments = if path.is_empty() {
            if component_filter.is_none() {
                return Err(malformed("pattern is empty"));
            }
            Vec::new()
        } else {
            path.split('.')
                .map(|raw| parse_segment(raw.trim()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(malformed)?
        };

        Ok(Self {
            source: source.to_owned(),
            segments,
            component_filter,
        })
    }

    /// The pattern text as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Path segments, empty for a filter-only pattern.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Component type named by the `[component]` filter.
    pub fn component_filter(&self) -> Option<&str> {
        self.component_filter.as_deref()
    }

    /// `true` if any segment is `*` or `**`, or the pattern is filter-only.
    pub fn is_wildcard(&self) -> bool {
        self.segments.is_empty()
            || self
                .segments
                .iter()
                .any(|s| !matches!(s, Segment::Literal(_)))
    }

    /// Sum of the segment weights plus the filter bonus.
    pub fn specificity(&self) -> u32 {
        let path: u32 = self.segments.iter().map(Segment::weight).sum();
        path + if self.component_filter.is_some() {
            FILTER_WEIGHT
        } else {
            0
        }
    }

    /// Path-only match (ignores the component filter).
    pub fn matches_path(&self, path: &str, options: MatchOptions) -> bool {
        if self.segments.is_empty() {
            return true;
        }
        let path: Vec<&str> = path.split('.').collect();
        segments_match(&self.segments, &path, options)
    }

    /// Full match: component filter and path.
    pub fn matches(&self, tree: &SceneTree, meta: &NodeMetadata, options: MatchOptions) -> bool {
        if let Some(filter) = &self.component_filter {
            if !tree.has_component(meta.id, filter) {
                return false;
            }
        }
        self.matches_path(&meta.path, options)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for PathPattern {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Remove the `[component]` filter from `pattern`, returning the remaining
/// path text and the filter name.
fn split_filter(pattern: &str) -> Result<(String, Option<String>), &'static str> {
    let Some(open) = pattern.find('[') else {
        if pattern.contains(']') {
            return Err("']' without matching '['");
        }
        return Ok((pattern.to_owned(), None));
    };
    let close = pattern[open..]
        .find(']')
        .map(|offset| open + offset)
        .ok_or("unclosed component filter")?;

    let name = pattern[open + 1..close].trim();
    if name.is_empty() {
        return Err("empty component filter");
    }
    if name.contains(['[', '.', '*']) {
        return Err("component filter must be a plain component name");
    }

    let mut prefix = &pattern[..open];
    let mut suffix = &pattern[close + 1..];
    if suffix.contains('[') {
        return Err("more than one component filter");
    }
    if suffix.contains(']') {
        return Err("']' without matching '['");
    }

    // A filter written as its own segment ("Body.*.[light]") leaves a dangling
    // separator behind; drop it. A separator with no segment on its other
    // side ("[light].", ".[light]") is left in place and fails as an empty
    // segment.
    let dangling_before = prefix.len() > 1 && prefix.ends_with('.');
    if dangling_before && (suffix.is_empty() || suffix.starts_with('.')) {
        prefix = &prefix[..prefix.len() - 1];
    } else if prefix.is_empty() && suffix.len() > 1 && suffix.starts_with('.') {
        suffix = &suffix[1..];
    }

    Ok((format!("{prefix}{suffix}"), Some(name.to_owned())))
}

fn parse_segment(raw: &str) -> Result<Segment, &'static str> {
    match raw {
        "" => Err("empty path segment"),
        "*" => Ok(Segment::Single),
        "**" => Ok(Segment::Any),
        s if s.contains('*') => Err("'*' must make up a whole segment"),
        s => Ok(Segment::Literal(s.to_owned())),
    }
}

fn literal_eq(pattern: &str, segment: &str, options: MatchOptions) -> bool {
    if options.case_sensitive {
        pattern == segment
    } else {
        pattern.to_lowercase() == segment.to_lowercase()
    }
}

/// Anchored match of compiled segments against path segments.
///
/// `table[i * (n + 1) + j]` records whether `pattern[i..]` matches
/// `path[j..]`; filled back to front.
fn segments_match(pattern: &[Segment], path: &[&str], options: MatchOptions) -> bool {
    let (m, n) = (pattern.len(), path.len());
    let width = n + 1;
    let mut table = vec![false; (m + 1) * width];
    table[m * width + n] = true;

    for i in (0..m).rev() {
        for j in (0..=n).rev() {
            let next_both = j < n && table[(i + 1) * width + j + 1];
            let value = match &pattern[i] {
                Segment::Any => table[(i + 1) * width + j] || (j < n && table[i * width + j + 1]),
                Segment::Single => next_both,
                Segment::Literal(lit) => next_both && literal_eq(lit, path[j], options),
            };
            table[i * width + j] = value;
        }
    }
    table[0]
}

// ---------------------------------------------------------------------------
// NodePredicate / Pattern
// ---------------------------------------------------------------------------

/// A caller-supplied node test used in place of a path pattern.
pub trait NodePredicate: Send + Sync {
    fn matches(&self, tree: &SceneTree, node: NodeId, meta: &NodeMetadata) -> bool;
}

impl<F> NodePredicate for F
where
    F: Fn(&SceneTree, NodeId, &NodeMetadata) -> bool + Send + Sync,
{
    fn matches(&self, tree: &SceneTree, node: NodeId, meta: &NodeMetadata) -> bool {
        self(tree, node, meta)
    }
}

/// Selects the nodes a rule applies to.
#[derive(Clone)]
pub enum Pattern {
    Path(PathPattern),
    Predicate(Arc<dyn NodePredicate>),
}

impl Pattern {
    /// Compile a pattern string.
    pub fn parse(source: &str) -> Result<Self, RuleError> {
        PathPattern::parse(source).map(Pattern::Path)
    }

    /// Wrap a predicate.
    pub fn predicate<P: NodePredicate + 'static>(predicate: P) -> Self {
        Pattern::Predicate(Arc::new(predicate))
    }

    pub fn specificity(&self) -> u32 {
        match self {
            Pattern::Path(p) => p.specificity(),
            Pattern::Predicate(_) => PREDICATE_SPECIFICITY,
        }
    }

    /// Predicates count as wildcards: they can select any number of nodes.
    pub fn is_wildcard(&self) -> bool {
        match self {
            Pattern::Path(p) => p.is_wildcard(),
            Pattern::Predicate(_) => true,
        }
    }

    /// `true` if the pattern selects the node described by `meta`.
    pub fn matches(&self, tree: &SceneTree, meta: &NodeMetadata, options: MatchOptions) -> bool {
        match self {
            Pattern::Path(p) => p.matches(tree, meta, options),
            Pattern::Predicate(pred) => pred.matches(tree, meta.id, meta),
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Path(p) => f.debug_tuple("Path").field(&p.source).finish(),
            Pattern::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Path(p) => p.fmt(f),
            Pattern::Predicate(_) => f.write_str("<predicate>"),
        }
    }
}

impl From<PathPattern> for Pattern {
    fn from(p: PathPattern) -> Self {
        Pattern::Path(p)
    }
}

impl FromStr for Pattern {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
