//! Tree queries with regex and fuzzy criteria
//!
//! Criteria keys are interpreted by prefix:
//! - `tag`, `tag_2`, ... test the tag name
//! - `text`, `text_2`, ... test the text content
//! - `*`, `*_1`, ... test the tag name, the text and every attribute value
//! - anything else tests the attribute of that exact name
//!
//! The first three forms match when the pattern regex matches or the fuzzy
//! similarity is above 0.5. Plain attribute keys only use the regex. A
//! pattern that is not a valid regex is compared for case-insensitive
//! equality instead of matched, and plain attribute keys stop there.
//!
//! Every criterion that holds on a node emits that node once, so overlapping
//! criteria produce duplicates. Callers that need unique nodes dedupe.

use std::collections::{HashMap, HashSet};

use regex::Regex;

use crate::fuzzy::similarity;
use crate::tree::{ExclusionSet, Node, NodeId, Tree};

/// Similarity a value must exceed to count as a fuzzy match
pub const FUZZY_THRESHOLD: f64 = 0.5;

/// What a criterion key tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criterion {
    Tag,
    Text,
    Wildcard,
    Attribute(String),
}

impl Criterion {
    pub fn parse(key: &str) -> Self {
        if key.starts_with('*') {
            Criterion::Wildcard
        } else if key.starts_with("tag") {
            Criterion::Tag
        } else if key.starts_with("text") {
            Criterion::Text
        } else {
            Criterion::Attribute(key.to_string())
        }
    }
}

/// Criterion pattern, compiled once
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    regex: Option<Regex>,
}

impl Pattern {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let regex = match Regex::new(&raw) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::debug!(pattern = %raw, error = %e, "invalid pattern, using exact match");
                None
            }
        };
        Self { raw, regex }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Regex match, or case-insensitive equality for an invalid regex
    pub fn matches_exact(&self, value: &str) -> bool {
        match &self.regex {
            Some(re) => re.is_match(value),
            None => self.raw.to_lowercase() == value.to_lowercase(),
        }
    }

    /// [`Pattern::matches_exact`], then fuzzy similarity
    pub fn matches_fuzzy(&self, value: &str) -> bool {
        self.matches_exact(value) || similarity(&self.raw, value) > FUZZY_THRESHOLD
    }
}

/// Restricts which tags a query looks at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TagFilter {
    #[default]
    Any,
    Names(HashSet<String>),
}

impl TagFilter {
    /// Build a filter from tag names; no names means any tag
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: HashSet<String> = names
            .into_iter()
            .map(|n| n.as_ref().to_lowercase())
            .collect();
        if names.is_empty() {
            TagFilter::Any
        } else {
            TagFilter::Names(names)
        }
    }

    pub fn allows(&self, tag: &str) -> bool {
        match self {
            TagFilter::Any => true,
            TagFilter::Names(names) => names.contains(&tag.to_lowercase()),
        }
    }
}

/// A tag filter plus criteria, ready to run
#[derive(Debug, Clone, Default)]
pub struct Query {
    filter: TagFilter,
    criteria: Vec<(Criterion, Pattern)>,
}

impl Query {
    /// Build a query; criteria are evaluated in the order given
    pub fn new<I, K, V>(filter: TagFilter, criteria: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            filter,
            criteria: criteria
                .into_iter()
                .map(|(k, v)| (Criterion::parse(k.as_ref()), Pattern::new(v)))
                .collect(),
        }
    }

    /// Match every node whose tag passes the filter
    pub fn tags<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            filter: TagFilter::names(names),
            criteria: Vec::new(),
        }
    }

    pub fn filter(&self) -> &TagFilter {
        &self.filter
    }

    /// How many times `node` is emitted by this query
    fn emissions(&self, node: &Node) -> usize {
        if !self.filter.allows(node.tag()) {
            return 0;
        }
        if self.criteria.is_empty() {
            return 1;
        }
        self.criteria
            .iter()
            .filter(|(criterion, pattern)| criterion_holds(node, criterion, pattern))
            .count()
    }
}

fn criterion_holds(node: &Node, criterion: &Criterion, pattern: &Pattern) -> bool {
    match criterion {
        Criterion::Tag => pattern.matches_fuzzy(node.tag()),
        Criterion::Text => pattern.matches_fuzzy(node.text()),
        Criterion::Wildcard => {
            pattern.matches_fuzzy(node.tag())
                || pattern.matches_fuzzy(node.text())
                || node.attributes().values().any(|v| pattern.matches_fuzzy(v))
        }
        Criterion::Attribute(key) => node
            .attr(key)
            .map(|v| pattern.matches_exact(v))
            .unwrap_or(false),
    }
}

/// Pre-order search from `from`.
///
/// Excluded nodes are never emitted but their subtrees are still visited.
pub fn search(tree: &Tree, from: NodeId, query: &Query, exclusions: &ExclusionSet) -> Vec<NodeId> {
    let mut output = Vec::new();
    for id in tree.preorder(from) {
        if exclusions.contains(id) {
            continue;
        }
        let count = query.emissions(tree.node(id));
        output.extend(std::iter::repeat(id).take(count));
    }
    output
}

#[derive(Default)]
struct Merged {
    text: String,
    attributes: HashMap<String, String>,
}

impl Merged {
    fn absorb(&mut self, node: &Node) {
        if !node.text().is_empty() {
            if !self.text.is_empty() {
                self.text.push_str("---");
            }
            self.text.push_str(node.text());
        }
        for (key, value) in node.attributes() {
            if value.is_empty() {
                continue;
            }
            let slot = self.attributes.entry(key.clone()).or_default();
            if !slot.is_empty() {
                slot.push(',');
            }
            slot.push_str(value);
        }
    }

    fn walk(&mut self, tree: &Tree, from: NodeId, filter: &TagFilter, exclusions: &ExclusionSet) {
        for id in tree.preorder(from) {
            let node = tree.node(id);
            if id != from && (!filter.allows(node.tag()) || exclusions.contains(id)) {
                continue;
            }
            self.absorb(node);
        }
    }
}

/// Merge a subtree into one node.
///
/// Texts are joined with `---` and same-named attribute values with `,`, in
/// pre-order. The start node always contributes; excluded descendants and
/// tags outside the filter do not.
pub fn flatten(tree: &Tree, from: NodeId, filter: &TagFilter, exclusions: &ExclusionSet) -> Tree {
    let mut merged = Merged::default();
    merged.walk(tree, from, filter, exclusions);
    Tree::detached(tree.node(from).tag(), merged.attributes, merged.text)
}

/// Merge several subtrees into one untagged node
pub fn flatten_all(
    tree: &Tree,
    roots: &[NodeId],
    filter: &TagFilter,
    exclusions: &ExclusionSet,
) -> Tree {
    let mut merged = Merged::default();
    for &root in roots {
        if exclusions.contains(root) {
            continue;
        }
        merged.walk(tree, root, filter, exclusions);
    }
    Tree::detached("", merged.attributes, merged.text)
}

/// All nodes with exactly this tag name
pub fn find_by_tag(tree: &Tree, from: NodeId, tag: &str) -> Vec<NodeId> {
    tree.preorder(from)
        .filter(|&id| tree.node(id).tag() == tag)
        .collect()
}

/// All nodes carrying `key` whose value contains `value` (any value when empty)
pub fn find_by_attribute(tree: &Tree, from: NodeId, key: &str, value: &str) -> Vec<NodeId> {
    tree.preorder(from)
        .filter(|&id| attribute_contains(tree.node(id), key, value))
        .collect()
}

/// [`find_by_tag`] and [`find_by_attribute`] combined
pub fn find(tree: &Tree, from: NodeId, tag: &str, key: &str, value: &str) -> Vec<NodeId> {
    tree.preorder(from)
        .filter(|&id| {
            let node = tree.node(id);
            node.tag() == tag && attribute_contains(node, key, value)
        })
        .collect()
}

fn attribute_contains(node: &Node, key: &str, value: &str) -> bool {
    match node.attr(key) {
        Some(found) => value.is_empty() || found.contains(value),
        None => false,
    }
}
