//! Tree construction from a linear stream of markup events
//!
//! Recursive descent: an opening tag starts a new frame, a closing tag ends
//! the current one, self-closing tags become flat leaves of the current frame.
//! A truncated or malformed stream never fails the build; whatever was read
//! so far is kept.

use std::collections::HashMap;

use crate::tree::{NodeId, Tree};

/// Structural event produced by a markup scanner
#[derive(Debug, Clone, PartialEq)]
pub enum MarkupEvent {
    Open {
        name: String,
        attributes: HashMap<String, String>,
    },
    Close {
        name: String,
    },
    SelfClose {
        name: String,
        attributes: HashMap<String, String>,
    },
    Text(String),
    /// Scanner failure; ends the current frame
    Malformed(String),
}

/// Builds a [`Tree`] from [`MarkupEvent`]s
pub struct TreeBuilder<I> {
    events: I,
    tree: Tree,
    max_depth: usize,
}

impl<I> TreeBuilder<I>
where
    I: Iterator<Item = MarkupEvent>,
{
    pub fn new<E>(events: E) -> Self
    where
        E: IntoIterator<Item = MarkupEvent, IntoIter = I>,
    {
        Self {
            events: events.into_iter(),
            tree: Tree::new(),
            max_depth: 0,
        }
    }

    /// Consume the event stream and return the tree
    pub fn build(mut self) -> Tree {
        let root = self.tree.root();
        self.build_frame(root, 0);
        tracing::trace!(
            nodes = self.tree.len(),
            max_depth = self.max_depth,
            "built markup tree"
        );
        self.tree
    }

    fn build_frame(&mut self, frame: NodeId, depth: usize) {
        self.max_depth = self.max_depth.max(depth);

        while let Some(event) = self.events.next() {
            match event {
                MarkupEvent::Open { name, attributes } => {
                    let child = self.tree.append_child(frame, name, attributes);
                    self.build_frame(child, depth + 1);
                }
                MarkupEvent::SelfClose { name, attributes } => {
                    self.tree.append_flat(frame, name, attributes);
                }
                MarkupEvent::Close { .. } => return,
                MarkupEvent::Text(text) => self.tree.append_text(frame, &text),
                MarkupEvent::Malformed(message) => {
                    tracing::warn!(depth, %message, "malformed markup, keeping partial tree");
                    return;
                }
            }
        }
    }
}

/// Build a tree from any event sequence
pub fn build_tree<E>(events: E) -> Tree
where
    E: IntoIterator<Item = MarkupEvent>,
{
    TreeBuilder::new(events).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(name: &str, attrs: &[(&str, &str)]) -> MarkupEvent {
        MarkupEvent::Open {
            name: name.to_string(),
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn close(name: &str) -> MarkupEvent {
        MarkupEvent::Close {
            name: name.to_string(),
        }
    }

    fn text(t: &str) -> MarkupEvent {
        MarkupEvent::Text(t.to_string())
    }

    #[test]
    fn test_nested_frames() {
        let tree = build_tree(vec![
            open("div", &[("class", "list")]),
            text(" Title "),
            open("a", &[("href", "/one")]),
            text("One"),
            close("a"),
            MarkupEvent::SelfClose {
                name: "img".to_string(),
                attributes: HashMap::from([("src".to_string(), "x.png".to_string())]),
            },
            close("div"),
        ]);

        let root = tree.node(tree.root());
        assert_eq!(root.tag(), "");
        assert_eq!(root.children().len(), 1);

        let div = tree.node(root.children()[0]);
        assert_eq!(div.tag(), "div");
        assert_eq!(div.text(), "Title");
        assert_eq!(div.attr("class"), Some("list"));
        assert_eq!(div.children().len(), 1);
        assert_eq!(div.flat().len(), 1);

        let a = tree.node(div.children()[0]);
        assert_eq!(a.text(), "One");
        assert_eq!(a.parent(), Some(root.children()[0]));

        let img = tree.node(div.flat()[0]);
        assert_eq!(img.tag(), "img");
        assert!(img.children().is_empty());
    }

    #[test]
    fn test_text_fragments_concatenate() {
        let tree = build_tree(vec![open("p", &[]), text("a "), text("b"), close("p")]);
        let p = tree.node(tree.node(tree.root()).children()[0]);
        // Trailing space is trimmed before the next fragment arrives
        assert_eq!(p.text(), "ab");

        let tree = build_tree(vec![open("p", &[]), text("a"), text(" b"), close("p")]);
        let p = tree.node(tree.node(tree.root()).children()[0]);
        assert_eq!(p.text(), "a b");
    }

    #[test]
    fn test_truncated_stream_keeps_partial_tree() {
        let tree = build_tree(vec![open("div", &[]), open("span", &[]), text("partial")]);
        let div = tree.node(tree.node(tree.root()).children()[0]);
        let span = tree.node(div.children()[0]);
        assert_eq!(span.text(), "partial");
    }

    #[test]
    fn test_malformed_event_ends_frame() {
        let tree = build_tree(vec![
            open("div", &[]),
            text("before"),
            MarkupEvent::Malformed("bad token".to_string()),
            text("after"),
        ]);
        let root = tree.node(tree.root());
        let div = tree.node(root.children()[0]);
        assert_eq!(div.text(), "before");
        // The parent frame keeps reading after the failed frame returns
        assert_eq!(root.text(), "after");
    }
}
