//! Schema-less extraction heuristics
//!
//! Every heuristic follows the same shape: find anchor nodes with a fuzzy
//! query (a "Description" heading, a "Genres" label, a `chapter` class),
//! then walk upward from the anchor a few levels until a search below the
//! current node finds the content nodes. Visited anchors go into an
//! [`ExclusionSet`] so the next search does not find them again.

use std::collections::HashSet;

use regex::Regex;
use serde::Serialize;

use crate::links::{absolutize, rewrite_links, LinkRewrite};
use crate::query::{flatten_all, search, Query, TagFilter};
use crate::tree::{ExclusionSet, NodeId, NodeView, Tree};

/// Walking upward stops at these tags
const STOP_TAGS: &[&str] = &["head", "meta"];

/// Pattern for links that end in a number, such as `/chapter/12`
const NUMBERED_PATH: &str = "^/.*[0-9]+";

const IMAGE_EXTENSIONS: &str = "jpg|png|jpeg";

const URL_PATTERN: &str = r"((http|https)://)(www.)?[a-zA-Z0-9@:%._\+~#?&//=]{2,256}\.[a-z]{2,6}\b([-a-zA-Z0-9@:%._\+~#?&//=]*)";

/// Levels walked upward by [`AutoExtractor::summarize`] when looking for tags
pub const DEFAULT_TAG_PARENTS: usize = 3;

/// Everything the heuristics find on one page
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AutoSummary {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub chapters: Vec<NodeView>,
    pub images: Vec<String>,
    pub pages: Vec<String>,
}

/// Heuristic extractor bound to the base link (`scheme://host`) of a site
#[derive(Debug, Clone)]
pub struct AutoExtractor {
    base: String,
}

impl AutoExtractor {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn summarize(&self, tree: &Tree) -> AutoSummary {
        AutoSummary {
            title: self.title(tree),
            description: self.description(tree),
            tags: self.tags(tree, DEFAULT_TAG_PARENTS),
            chapters: self.chapters(tree),
            images: self.images(tree),
            pages: self.pages(tree),
        }
    }

    /// Text of the first title-like element that has any
    pub fn title(&self, tree: &Tree) -> String {
        let query = Query::new(TagFilter::Any, [("tag", "title")]);
        search(tree, tree.root(), &query, &ExclusionSet::new())
            .into_iter()
            .map(|id| tree.node(id).text())
            .find(|text| !text.is_empty())
            .unwrap_or_default()
            .to_string()
    }

    /// Paragraph text near the last description-like label, on one line
    pub fn description(&self, tree: &Tree) -> String {
        let labels = Query::new(
            TagFilter::Any,
            [
                ("text", "description"),
                ("text_2", "summary"),
                ("text_3", "synopsis"),
            ],
        );
        let blocks = Query::tags(["p", "span"]);
        let mut skip = ExclusionSet::new();

        for &label in search(tree, tree.root(), &labels, &ExclusionSet::new()).iter().rev() {
            let mut current = label;
            for _ in 0..3 {
                skip.insert(current);
                let found = search(tree, current, &blocks, &skip);
                if found.is_empty() {
                    match tree.node(current).parent() {
                        Some(parent) => {
                            current = parent;
                            continue;
                        }
                        None => break,
                    }
                }
                let merged = flatten_all(tree, &found, &TagFilter::Any, &skip);
                return single_line(merged.node(merged.root()).text());
            }
        }
        String::new()
    }

    /// Short labels (genres, tags) near a genre-like label.
    ///
    /// Entries are unique and never start with a digit, which drops counters
    /// such as "12 chapters".
    pub fn tags(&self, tree: &Tree, parents: usize) -> Vec<String> {
        let labels = Query::new(
            TagFilter::Any,
            [
                ("text", "genre"),
                ("text_2", "tags"),
                ("text_3", "genres"),
                ("*", "tag"),
            ],
        );
        let items = Query::tags(["p", "span", "a"]);
        let mut skip = ExclusionSet::new();

        for label in search(tree, tree.root(), &labels, &ExclusionSet::new()) {
            let mut current = label;
            for _ in 0..parents {
                skip.insert(current);
                let found = search(tree, current, &items, &skip);
                if found.is_empty() {
                    match tree.node(current).parent() {
                        Some(parent) => {
                            current = parent;
                            continue;
                        }
                        None => break,
                    }
                }

                let mut seen = HashSet::new();
                return found
                    .into_iter()
                    .map(|id| tree.node(id).text())
                    .filter(|text| !text.is_empty())
                    .filter(|text| !text.starts_with(|c: char| c.is_ascii_digit()))
                    .filter(|text| seen.insert(*text))
                    .map(str::to_string)
                    .collect();
            }
        }
        Vec::new()
    }

    /// Numbered links near a chapter-like anchor, rewritten onto the base host
    pub fn chapters(&self, tree: &Tree) -> Vec<NodeView> {
        let anchors = Query::new(
            TagFilter::Any,
            [("text", "chapter"), ("class", "chapter"), ("*", "thumbnail")],
        );
        let links = Query::new(
            TagFilter::names(["a"]),
            [("href", NUMBERED_PATH), ("src", NUMBERED_PATH)],
        );

        let mut skip = ExclusionSet::new();
        for anchor in search(tree, tree.root(), &anchors, &ExclusionSet::new()) {
            let found = self.walk_up(tree, anchor, 2, &links, &mut skip, true);
            if found.is_empty() {
                continue;
            }
            return found
                .into_iter()
                .map(|id| {
                    let mut copy = tree.subtree(id);
                    self.force_base_host(&mut copy, &["href", "src"]);
                    copy.to_view(copy.root())
                })
                .collect();
        }
        Vec::new()
    }

    /// Image URLs, taken from inline scripts when they mention any, otherwise
    /// from image links near image-like nodes
    pub fn images(&self, tree: &Tree) -> Vec<String> {
        let scripts = Query::new(
            TagFilter::names(["script"]),
            [("text", "jpg"), ("text_1", "jpeg"), ("text_2", "png")],
        );
        if let Some(&script) = search(tree, tree.root(), &scripts, &ExclusionSet::new()).first() {
            return urls_in_script(tree.node(script).text());
        }

        let anchors = Query::new(
            TagFilter::names(["img", "a"]),
            [("*", "jpg"), ("*_1", "jpeg"), ("*_2", "png")],
        );
        let links = Query::new(
            TagFilter::names(["a", "img"]),
            [
                ("href", IMAGE_EXTENSIONS),
                ("src", IMAGE_EXTENSIONS),
                ("data-src", IMAGE_EXTENSIONS),
            ],
        );

        let mut skip = ExclusionSet::new();
        let mut seen = HashSet::new();
        let mut output = Vec::new();
        for anchor in search(tree, tree.root(), &anchors, &ExclusionSet::new()) {
            for id in self.walk_up(tree, anchor, 2, &links, &mut skip, false) {
                let link = self.resolved_link(tree, id, &["href", "src", "data-src"], &["href", "data-src", "src"]);
                if !link.is_empty() && seen.insert(link.clone()) {
                    output.push(link);
                }
            }
        }
        output
    }

    /// Other numbered pages of the same listing, as absolute links under the base
    pub fn pages(&self, tree: &Tree) -> Vec<String> {
        let anchors = Query::new(TagFilter::Any, [("*", "page")]);
        let links = Query::new(
            TagFilter::names(["a", "option"]),
            [
                ("href", NUMBERED_PATH),
                ("src", NUMBERED_PATH),
                ("value", NUMBERED_PATH),
            ],
        );
        let keys = &["href", "src", "value"];

        let mut skip = ExclusionSet::new();
        let mut seen = HashSet::new();
        let mut output = Vec::new();
        for anchor in search(tree, tree.root(), &anchors, &ExclusionSet::new()) {
            for id in self.walk_up(tree, anchor, 2, &links, &mut skip, false) {
                let link = self.resolved_link(tree, id, keys, keys);
                if link.is_empty() || link == self.base || !link.contains(&self.base) {
                    continue;
                }
                if seen.insert(link.clone()) {
                    output.push(link);
                }
            }
        }
        output
    }

    /// Search below `start`, moving to the parent while nothing is found.
    ///
    /// Stops after `levels` tries or at a head/meta node. With
    /// `exclude_first` the current node is excluded before its own search,
    /// otherwise after it.
    fn walk_up(
        &self,
        tree: &Tree,
        start: NodeId,
        levels: usize,
        query: &Query,
        skip: &mut ExclusionSet,
        exclude_first: bool,
    ) -> Vec<NodeId> {
        let mut current = start;
        for _ in 0..levels {
            if STOP_TAGS.contains(&tree.node(current).tag()) {
                break;
            }
            if exclude_first {
                skip.insert(current);
            }
            let found = search(tree, current, query, skip);
            if !exclude_first {
                skip.insert(current);
            }
            if !found.is_empty() {
                return dedup_ids(found);
            }
            match tree.node(current).parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Vec::new()
    }

    /// Copy of the node with links forced onto the base host, then resolved
    fn resolved_link(&self, tree: &Tree, id: NodeId, rewrite: &[&str], lookup: &[&str]) -> String {
        let mut copy = tree.subtree(id);
        self.force_base_host(&mut copy, rewrite);
        match absolutize(&self.base, lookup, copy.node(copy.root()).attributes()) {
            Ok(link) => link,
            Err(e) => {
                tracing::debug!(base = %self.base, error = %e, "cannot resolve link");
                String::new()
            }
        }
    }

    fn force_base_host(&self, copy: &mut Tree, keys: &[&str]) {
        let root = copy.root();
        if let Err(e) = rewrite_links(&self.base, keys, copy.attributes_mut(root), LinkRewrite::ForceBaseHost) {
            tracing::debug!(base = %self.base, error = %e, "keeping links as written");
        }
    }
}

/// Node handles in first-seen order without repeats
fn dedup_ids(ids: Vec<NodeId>) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

fn single_line(text: &str) -> String {
    text.replace("---", " ")
        .replace(|c| c == '\n' || c == '\t', " ")
}

/// URL-looking tokens of a script body, with `\/` unescaped
fn urls_in_script(script: &str) -> Vec<String> {
    let Ok(url) = Regex::new(URL_PATTERN) else {
        return Vec::new();
    };
    script
        .split(|c| matches!(c, ',' | ' ' | '\n' | '"'))
        .filter(|token| !token.trim().is_empty())
        .map(|token| token.replace("\\/", "/"))
        .filter(|token| url.is_match(token))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::parse_markup;
    use pretty_assertions::assert_eq;

    const BASE: &str = "https://books.example.com";

    const BOOK: &str = r#"
    <html>
        <head>
            <title>The Long Road</title>
        </head>
        <body>
            <div class="info">
                <h3>Description</h3>
                <div class="body">
                    <p>A long	road</p>
                    <p>with many turns.</p>
                </div>
            </div>
            <div class="genres">
                <h4>Genres</h4>
                <div class="list">
                    <a href="/g/fantasy">Fantasy</a>
                    <a href="/g/drama">Drama</a>
                    <a href="/g/fantasy">Fantasy</a>
                    <a href="/g/count">12 titles</a>
                </div>
            </div>
            <ul class="chapter-list">
                <li class="chapter"><a href="/read/1">Chapter 1</a></li>
                <li class="chapter"><a href="/read/2">Chapter 2</a></li>
            </ul>
        </body>
    </html>
    "#;

    fn extractor() -> AutoExtractor {
        AutoExtractor::new(BASE)
    }

    #[test]
    fn test_title() {
        let tree = parse_markup(BOOK);
        assert_eq!(extractor().title(&tree), "The Long Road");
    }

    #[test]
    fn test_title_missing() {
        let tree = parse_markup("<div>no title</div>");
        assert_eq!(extractor().title(&tree), "");
    }

    #[test]
    fn test_description_walks_up_to_paragraphs() {
        let tree = parse_markup(BOOK);
        assert_eq!(
            extractor().description(&tree),
            "A long road with many turns."
        );
    }

    #[test]
    fn test_tags_dedupe_and_skip_counters() {
        let tree = parse_markup(BOOK);
        assert_eq!(extractor().tags(&tree, 3), vec!["Fantasy", "Drama"]);
    }

    #[test]
    fn test_tags_none_without_label() {
        let tree = parse_markup("<p>nothing here</p>");
        assert!(extractor().tags(&tree, 3).is_empty());
    }

    #[test]
    fn test_chapters_are_rewritten() {
        let tree = parse_markup(BOOK);
        let chapters = extractor().chapters(&tree);
        let links: Vec<&str> = chapters
            .iter()
            .map(|c| c.attributes["href"].as_str())
            .collect();
        assert_eq!(
            links,
            vec![
                "https://books.example.com/read/1",
                "https://books.example.com/read/2",
            ]
        );
        assert_eq!(chapters[0].text, "Chapter 1");
    }

    #[test]
    fn test_images_from_script() {
        let tree = parse_markup(
            r#"<script>var pages = ["https:\/\/cdn.example.com\/p\/1.jpg","https:\/\/cdn.example.com\/p\/2.jpg", "x"];</script>"#,
        );
        assert_eq!(
            extractor().images(&tree),
            vec![
                "https://cdn.example.com/p/1.jpg",
                "https://cdn.example.com/p/2.jpg",
            ]
        );
    }

    #[test]
    fn test_images_from_markup() {
        let tree = parse_markup(
            r#"<div class="reader">
                <img src="/p/1.jpg">
                <img data-src="//cdn.example.com/p/2.png">
                <img src="/p/1.jpg">
            </div>"#,
        );
        assert_eq!(
            extractor().images(&tree),
            vec![
                "https://books.example.com/p/1.jpg",
                "https://books.example.com/p/2.png",
            ]
        );
    }

    #[test]
    fn test_pages_keep_other_numbered_pages() {
        let tree = parse_markup(
            r#"<div class="pages">
                <a href="/list/1">1</a>
                <a href="/list/2">2</a>
                <a href="/list/2">next</a>
                <a href="/about">about</a>
            </div>"#,
        );
        assert_eq!(
            extractor().pages(&tree),
            vec![
                "https://books.example.com/list/1",
                "https://books.example.com/list/2",
            ]
        );
    }

    #[test]
    fn test_summarize_serializes() {
        let tree = parse_markup(BOOK);
        let summary = extractor().summarize(&tree);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["title"], "The Long Road");
        assert_eq!(json["chapters"].as_array().map(Vec::len), Some(2));
    }
}
