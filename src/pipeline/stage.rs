//! Stage specifications and their per-order combination

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::query::{Query, TagFilter};

/// Whether a spec adds a tag name or an attribute criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Tag,
    Attribute,
}

/// One declarative search step, as stored or transported by callers.
///
/// Field names on the wire follow the stored search records:
/// `type`, `tag`, `tag_value`, `search_order`, `internal_tag_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchStageSpec {
    #[serde(rename = "type")]
    pub kind: StageKind,
    /// Tag name for tag specs, criterion key for attribute specs
    #[serde(rename = "tag")]
    pub key: String,
    #[serde(rename = "tag_value", default)]
    pub pattern: String,
    #[serde(rename = "search_order", default)]
    pub order: u32,
    /// Next stage searches only inside this stage's matches
    #[serde(default)]
    pub forward_data: bool,
    /// When forwarding, hand over the matches' children instead of the matches
    #[serde(default)]
    pub use_child_data: bool,
    /// Replace each match with its flattened form
    #[serde(default)]
    pub flatten: bool,
    /// Produce no output records for this stage's matches
    #[serde(default)]
    pub skip_remap: bool,
    /// Contribute only the remap entry, no criterion or flags
    #[serde(default)]
    pub only_remap: bool,
    /// Output key to use instead of `key`
    #[serde(
        rename = "internal_tag_name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub remap_to: Option<String>,
}

impl SearchStageSpec {
    fn new(kind: StageKind, key: impl Into<String>, pattern: impl Into<String>, order: u32) -> Self {
        Self {
            kind,
            key: key.into(),
            pattern: pattern.into(),
            order,
            forward_data: false,
            use_child_data: false,
            flatten: false,
            skip_remap: false,
            only_remap: false,
            remap_to: None,
        }
    }

    /// Match elements with this tag name
    pub fn tag(name: impl Into<String>, order: u32) -> Self {
        Self::new(StageKind::Tag, name, "", order)
    }

    /// Match elements where criterion `key` holds for `pattern`
    pub fn attribute(key: impl Into<String>, pattern: impl Into<String>, order: u32) -> Self {
        Self::new(StageKind::Attribute, key, pattern, order)
    }

    /// Rename output key `key` to `to` for the stage at `order`
    pub fn remap_only(key: impl Into<String>, to: impl Into<String>, order: u32) -> Self {
        let mut spec = Self::new(StageKind::Attribute, key, "", order);
        spec.only_remap = true;
        spec.remap_to = Some(to.into());
        spec
    }

    pub fn forward(mut self) -> Self {
        self.forward_data = true;
        self
    }

    pub fn with_child_data(mut self) -> Self {
        self.use_child_data = true;
        self
    }

    pub fn flattened(mut self) -> Self {
        self.flatten = true;
        self
    }

    pub fn without_remap(mut self) -> Self {
        self.skip_remap = true;
        self
    }

    pub fn remap_to(mut self, to: impl Into<String>) -> Self {
        self.remap_to = Some(to.into());
        self
    }

    fn remap_target(&self) -> Option<&str> {
        self.remap_to.as_deref().filter(|t| !t.is_empty())
    }
}

/// Union of every spec sharing one order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombinedStage {
    pub order: u32,
    pub tags: Vec<String>,
    /// Criterion key to pattern; a later spec with the same key replaces the pattern
    pub attributes: Vec<(String, String)>,
    pub remap: HashMap<String, String>,
    pub forward_data: bool,
    pub use_child_data: bool,
    pub flatten: bool,
    pub skip_remap: bool,
}

impl CombinedStage {
    pub fn new(order: u32) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }

    pub(crate) fn absorb(&mut self, spec: &SearchStageSpec) {
        if spec.only_remap {
            if let Some(target) = spec.remap_target() {
                self.remap.insert(spec.key.clone(), target.to_string());
            }
            return;
        }

        match spec.kind {
            StageKind::Tag => self.tags.push(spec.key.clone()),
            StageKind::Attribute => {
                match self.attributes.iter_mut().find(|(k, _)| *k == spec.key) {
                    Some((_, pattern)) => *pattern = spec.pattern.clone(),
                    None => self
                        .attributes
                        .push((spec.key.clone(), spec.pattern.clone())),
                }
            }
        }

        self.forward_data |= spec.forward_data;
        self.use_child_data |= spec.use_child_data;
        self.flatten |= spec.flatten;
        self.skip_remap |= spec.skip_remap;

        if let Some(target) = spec.remap_target() {
            self.remap.insert(spec.key.clone(), target.to_string());
        }
    }

    /// The query this stage runs against its scope
    pub fn query(&self) -> Query {
        Query::new(
            TagFilter::names(&self.tags),
            self.attributes
                .iter()
                .map(|(k, v)| (k.as_str(), v.clone())),
        )
    }

    /// Output key for an extracted key
    pub fn remap_key<'a>(&'a self, key: &'a str) -> &'a str {
        self.remap.get(key).map(String::as_str).unwrap_or(key)
    }
}
