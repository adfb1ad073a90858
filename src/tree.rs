//! Markup tree model
//!
//! Nodes live in an arena owned by [`Tree`] and refer to each other through
//! [`NodeId`] handles. A node keeps two ordered lists: `children` for
//! elements nested inside its body and `flat` for self-closing elements
//! met at its nesting level. The parent link is a plain handle used only to
//! walk upward.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Handle of a node inside a [`Tree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Which list of the parent a node is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Child,
    Flat,
}

/// Single element of a parsed document
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub(crate) tag: String,
    pub(crate) attributes: HashMap<String, String>,
    pub(crate) text: String,
    pub(crate) children: Vec<NodeId>,
    pub(crate) flat: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
}

impl Node {
    /// Tag name, empty for the synthetic root
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Trimmed, concatenated text of this element's own text fragments
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn flat(&self) -> &[NodeId] {
        &self.flat
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

/// Arena-backed document tree. Index 0 is always the root.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// Create a tree holding only an empty root
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
        }
    }

    /// Create a single-node tree, used for merged/flattened results
    pub fn detached(
        tag: impl Into<String>,
        attributes: HashMap<String, String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            nodes: vec![Node {
                tag: tag.into(),
                attributes,
                text: text.into(),
                ..Node::default()
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Access a node by handle.
    ///
    /// Handles are only valid for the tree that issued them; a foreign handle
    /// past the end of this arena panics like an out-of-bounds slice index.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Mutable access to a node's attributes (used for in-place link rewriting)
    pub fn attributes_mut(&mut self, id: NodeId) -> &mut HashMap<String, String> {
        &mut self.nodes[id.0].attributes
    }

    /// Add a node under `parent` in the given slot and return its handle
    pub fn append(
        &mut self,
        parent: NodeId,
        slot: Slot,
        tag: impl Into<String>,
        attributes: HashMap<String, String>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            tag: tag.into(),
            attributes,
            parent: Some(parent),
            ..Node::default()
        });
        let owner = &mut self.nodes[parent.0];
        match slot {
            Slot::Child => owner.children.push(id),
            Slot::Flat => owner.flat.push(id),
        }
        id
    }

    pub fn append_child(
        &mut self,
        parent: NodeId,
        tag: impl Into<String>,
        attributes: HashMap<String, String>,
    ) -> NodeId {
        self.append(parent, Slot::Child, tag, attributes)
    }

    pub fn append_flat(
        &mut self,
        parent: NodeId,
        tag: impl Into<String>,
        attributes: HashMap<String, String>,
    ) -> NodeId {
        self.append(parent, Slot::Flat, tag, attributes)
    }

    /// Concatenate a text fragment onto a node and re-trim the result
    pub fn append_text(&mut self, id: NodeId, fragment: &str) {
        let node = &mut self.nodes[id.0];
        node.text.push_str(fragment);
        let trimmed = node.text.trim();
        if trimmed.len() != node.text.len() {
            node.text = trimmed.to_string();
        }
    }

    /// Deep-copy the subtree at `src_id` of `src` under `parent` of this tree
    pub fn graft(&mut self, parent: NodeId, slot: Slot, src: &Tree, src_id: NodeId) -> NodeId {
        let source = src.node(src_id);
        let id = self.append(parent, slot, source.tag.clone(), source.attributes.clone());
        self.nodes[id.0].text = source.text.clone();
        for &child in &source.children {
            self.graft(id, Slot::Child, src, child);
        }
        for &flat in &source.flat {
            self.graft(id, Slot::Flat, src, flat);
        }
        id
    }

    /// Copy the subtree at `id` into a standalone tree rooted at that node
    pub fn subtree(&self, id: NodeId) -> Tree {
        let source = self.node(id);
        let mut tree = Tree::detached(
            source.tag.clone(),
            source.attributes.clone(),
            source.text.clone(),
        );
        let root = tree.root();
        for &child in &source.children {
            tree.graft(root, Slot::Child, self, child);
        }
        for &flat in &source.flat {
            tree.graft(root, Slot::Flat, self, flat);
        }
        tree
    }

    /// Walk upward from `id`, nearest parent first
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.node(id).parent,
        }
    }

    /// Pre-order walk starting at `from`: the node, then each child subtree,
    /// then each flat subtree
    pub fn preorder(&self, from: NodeId) -> Preorder<'_> {
        Preorder {
            tree: self,
            stack: vec![from],
        }
    }

    /// Serializable snapshot of the subtree at `id`
    pub fn to_view(&self, id: NodeId) -> NodeView {
        let node = self.node(id);
        NodeView {
            tag: node.tag.clone(),
            attributes: node
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            text: node.text.clone(),
            children: node.children.iter().map(|&c| self.to_view(c)).collect(),
            flat: node.flat.iter().map(|&f| self.to_view(f)).collect(),
        }
    }
}

/// Iterator over the ancestors of a node
pub struct Ancestors<'a> {
    tree: &'a Tree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.node(current).parent;
        Some(current)
    }
}

/// Pre-order iterator over a subtree
pub struct Preorder<'a> {
    tree: &'a Tree,
    stack: Vec<NodeId>,
}

impl Iterator for Preorder<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.stack.pop()?;
        let node = self.tree.node(current);
        // Reversed so children pop first, in order, followed by flat nodes
        self.stack.extend(node.flat.iter().rev());
        self.stack.extend(node.children.iter().rev());
        Some(current)
    }
}

/// Owned, serializable copy of a subtree (parent links are dropped)
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct NodeView {
    pub tag: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flat: Vec<NodeView>,
}

/// Node handles to skip during a re-entrant search. Never mutates the tree.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet(HashSet<NodeId>);

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: NodeId) -> bool {
        self.0.insert(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.0.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<NodeId> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_append_sets_parent_and_slot() {
        let mut tree = Tree::new();
        let root = tree.root();
        let div = tree.append_child(root, "div", attrs(&[("class", "list")]));
        let img = tree.append_flat(div, "img", attrs(&[("src", "a.png")]));

        assert_eq!(tree.node(div).parent(), Some(root));
        assert_eq!(tree.node(img).parent(), Some(div));
        assert!(tree.node(div).children().is_empty());
        assert_eq!(tree.node(div).flat(), &[img]);
        assert_eq!(tree.node(root).children(), &[div]);
        assert_eq!(tree.node(img).attr("src"), Some("a.png"));
    }

    #[test]
    fn test_append_text_trims() {
        let mut tree = Tree::new();
        let p = tree.append_child(tree.root(), "p", HashMap::new());
        tree.append_text(p, "  hello ");
        tree.append_text(p, " world\n");
        assert_eq!(tree.node(p).text(), "hello world");
    }

    #[test]
    fn test_ancestors_walk_to_root() {
        let mut tree = Tree::new();
        let a = tree.append_child(tree.root(), "a", HashMap::new());
        let b = tree.append_child(a, "b", HashMap::new());
        let c = tree.append_flat(b, "c", HashMap::new());

        let up: Vec<NodeId> = tree.ancestors(c).collect();
        assert_eq!(up, vec![b, a, tree.root()]);
    }

    #[test]
    fn test_subtree_keeps_child_flat_split() {
        let mut tree = Tree::new();
        let div = tree.append_child(tree.root(), "div", HashMap::new());
        let span = tree.append_child(div, "span", HashMap::new());
        tree.append_text(span, "x");
        tree.append_flat(div, "br", HashMap::new());

        let copy = tree.subtree(div);
        let view = copy.to_view(copy.root());
        assert_eq!(view.tag, "div");
        assert_eq!(view.children.len(), 1);
        assert_eq!(view.children[0].text, "x");
        assert_eq!(view.flat.len(), 1);
        assert_eq!(view.flat[0].tag, "br");
        assert_eq!(copy.node(copy.root()).parent(), None);
    }

    #[test]
    fn test_preorder_children_before_flat() {
        let mut tree = Tree::new();
        let div = tree.append_child(tree.root(), "div", HashMap::new());
        let img = tree.append_flat(div, "img", HashMap::new());
        let a = tree.append_child(div, "a", HashMap::new());
        let b = tree.append_child(a, "b", HashMap::new());
        let p = tree.append_child(tree.root(), "p", HashMap::new());

        let order: Vec<NodeId> = tree.preorder(tree.root()).collect();
        assert_eq!(order, vec![tree.root(), div, a, b, img, p]);
    }

    #[test]
    fn test_exclusion_set() {
        let mut tree = Tree::new();
        let a = tree.append_child(tree.root(), "a", HashMap::new());
        let mut skip = ExclusionSet::new();
        assert!(skip.insert(a));
        assert!(!skip.insert(a));
        assert!(skip.contains(a));
        assert!(!skip.contains(tree.root()));
        assert_eq!(skip.len(), 1);
    }
}
