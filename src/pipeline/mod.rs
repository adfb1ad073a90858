//! Declarative multi-stage extraction
//!
//! Stage specs are grouped by order. Each order becomes one combined query
//! that runs against the current scope. A forwarding stage narrows the scope
//! of the next stage to its own matches; any other stage adds its matches to
//! the final node output. Every match also yields an output record unless
//! the stage skips remapping.

mod remap;
mod stage;

pub use remap::*;
pub use stage::*;

use serde::Serialize;
use url::Url;

use crate::links::origin;
use crate::query::{flatten, search, TagFilter};
use crate::tree::{ExclusionSet, Node, NodeId, NodeView, Slot, Tree};

/// Result of a pipeline run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineOutput {
    /// Matches of every non-forwarding stage, in stage order
    pub nodes: Vec<NodeView>,
    /// One record per match of every stage that does not skip remapping
    pub records: Vec<OutputRecord>,
}

/// Compiled stage list, indexed by order
#[derive(Debug, Clone, Default)]
pub struct SearchPipeline {
    stages: Vec<CombinedStage>,
}

/// A stage match: a node of the scope tree, or a flattened copy of one
enum Matched {
    Scope(NodeId),
    Detached(Tree),
}

impl Matched {
    fn source<'a>(&'a self, scope: &'a Tree) -> (&'a Tree, NodeId) {
        match self {
            Matched::Scope(id) => (scope, *id),
            Matched::Detached(tree) => (tree, tree.root()),
        }
    }

    fn node<'a>(&'a self, scope: &'a Tree) -> &'a Node {
        let (tree, id) = self.source(scope);
        tree.node(id)
    }
}

impl SearchPipeline {
    /// Group specs by order. Every order from 0 up to the highest one gets a
    /// stage, even when no spec uses it.
    pub fn new(specs: &[SearchStageSpec]) -> Self {
        if specs.is_empty() {
            return Self::default();
        }

        // Stable sorts keep the input order among specs of the same order
        let mut tags: Vec<&SearchStageSpec> =
            specs.iter().filter(|s| s.kind == StageKind::Tag).collect();
        let mut attributes: Vec<&SearchStageSpec> = specs
            .iter()
            .filter(|s| s.kind == StageKind::Attribute)
            .collect();
        tags.sort_by_key(|s| s.order);
        attributes.sort_by_key(|s| s.order);

        let max_order = specs.iter().map(|s| s.order).max().unwrap_or(0);

        let stages = (0..=max_order)
            .map(|order| {
                let mut stage = CombinedStage::new(order);
                for spec in tags.iter().chain(attributes.iter()) {
                    if spec.order == order {
                        stage.absorb(spec);
                    }
                }
                stage
            })
            .collect();

        Self { stages }
    }

    /// Build from a JSON array of stage specs
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let specs: Vec<SearchStageSpec> = serde_json::from_str(json)?;
        Ok(Self::new(&specs))
    }

    pub fn stages(&self) -> &[CombinedStage] {
        &self.stages
    }

    /// Run every stage over `tree`. Links in records resolve against the
    /// scheme and host of `page_url`.
    pub fn run(&self, tree: &Tree, page_url: &Url) -> PipelineOutput {
        let page_origin = origin(page_url);
        let mut output = PipelineOutput::default();
        let mut forwarded: Option<Tree> = None;
        let last = self.stages.len().saturating_sub(1);

        for (index, stage) in self.stages.iter().enumerate() {
            let scope = forwarded.as_ref().unwrap_or(tree);
            let query = stage.query();

            let matched: Vec<Matched> = search(scope, scope.root(), &query, &ExclusionSet::new())
                .into_iter()
                .map(|id| {
                    if stage.flatten {
                        Matched::Detached(flatten(scope, id, &TagFilter::Any, &ExclusionSet::new()))
                    } else {
                        Matched::Scope(id)
                    }
                })
                .collect();

            let before = output.records.len();
            for m in &matched {
                let record = remap(m.node(scope), stage, &page_origin);
                if !record.is_empty() {
                    output.records.push(record);
                }
            }

            let forwarding = stage.forward_data && index != last;
            tracing::debug!(
                order = stage.order,
                matches = matched.len(),
                records = output.records.len() - before,
                forwarding,
                "pipeline stage finished"
            );

            if forwarding {
                let next = forward_scope(scope, &matched, stage.use_child_data);
                forwarded = Some(next);
            } else {
                output
                    .nodes
                    .extend(matched.iter().map(|m| {
                        let (tree, id) = m.source(scope);
                        tree.to_view(id)
                    }));
            }
        }

        output
    }
}

/// New scope whose root holds copies of the matches (or of their children)
fn forward_scope(scope: &Tree, matched: &[Matched], use_child_data: bool) -> Tree {
    let mut next = Tree::new();
    let root = next.root();
    for m in matched {
        let (source, id) = m.source(scope);
        if use_child_data {
            let node = source.node(id);
            for &child in node.children() {
                next.graft(root, Slot::Child, source, child);
            }
            for &flat in node.flat() {
                next.graft(root, Slot::Flat, source, flat);
            }
        } else {
            next.graft(root, Slot::Child, source, id);
        }
    }
    next
}
