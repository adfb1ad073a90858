//! Markup scanners producing [`MarkupEvent`] streams
//!
//! Two flavours:
//! - [`scan_markup`] is a token-level scan with quick-xml in a lenient mode.
//!   It reports the document as written, so unbalanced markup yields the
//!   same odd nesting a browser-less tokenizer would give.
//! - [`scan_document`] goes through scraper's html5ever parser first and
//!   replays the normalised DOM.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use scraper::{ElementRef, Html};

use crate::builder::{build_tree, MarkupEvent};
use crate::tree::Tree;

/// HTML elements that never have a body
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose content is raw text rather than markup
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

pub fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

/// Scan raw markup into events without building a DOM first
pub fn scan_markup(markup: &str) -> Vec<MarkupEvent> {
    let mut events = Vec::new();
    let mut offset = 0;

    // The reader is restarted after every raw-text element because their
    // bodies are sliced out of the input by hand.
    'segments: loop {
        let mut reader = lenient_reader(&markup[offset..]);

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let name = tag_name(&e);
                    let attributes = tag_attributes(&e);
                    if is_void_element(&name) {
                        events.push(MarkupEvent::SelfClose { name, attributes });
                        continue;
                    }
                    if !RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
                        events.push(MarkupEvent::Open { name, attributes });
                        continue;
                    }

                    events.push(MarkupEvent::Open {
                        name: name.clone(),
                        attributes,
                    });
                    let body_start = offset + reader.buffer_position() as usize;
                    let body = &markup[body_start..];
                    match find_closing_tag(body, &name) {
                        Some((text_end, resume)) => {
                            events.push(MarkupEvent::Text(body[..text_end].to_string()));
                            events.push(MarkupEvent::Close { name });
                            offset = body_start + resume;
                            continue 'segments;
                        }
                        None => {
                            events.push(MarkupEvent::Text(body.to_string()));
                            events.push(MarkupEvent::Malformed(format!("unterminated <{}>", name)));
                            break 'segments;
                        }
                    }
                }
                Ok(Event::Empty(e)) => {
                    events.push(MarkupEvent::SelfClose {
                        name: tag_name(&e),
                        attributes: tag_attributes(&e),
                    });
                }
                Ok(Event::End(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                    // Void elements were already emitted as self-closing
                    if !is_void_element(&name) {
                        events.push(MarkupEvent::Close { name });
                    }
                }
                Ok(Event::Text(e)) => {
                    let text = match e.unescape() {
                        Ok(t) => t.into_owned(),
                        Err(_) => String::from_utf8_lossy(&e).into_owned(),
                    };
                    events.push(MarkupEvent::Text(text));
                }
                Ok(Event::CData(e)) => {
                    events.push(MarkupEvent::Text(
                        String::from_utf8_lossy(&e.into_inner()).into_owned(),
                    ));
                }
                Ok(Event::Eof) => break 'segments,
                // Comments, doctype, declarations, processing instructions
                Ok(_) => {}
                Err(e) => {
                    events.push(MarkupEvent::Malformed(format!(
                        "{} at position {}",
                        e,
                        offset + reader.error_position() as usize
                    )));
                    break 'segments;
                }
            }
        }
    }

    events
}

fn lenient_reader(markup: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(markup);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    reader
}

/// Locate `</name ...>` in a raw-text body.
/// Returns the end of the text and the offset just past the closing tag.
fn find_closing_tag(body: &str, name: &str) -> Option<(usize, usize)> {
    let needle = format!("</{}", name);
    let start = body.to_ascii_lowercase().find(&needle)?;
    let resume = body[start..]
        .find('>')
        .map(|i| start + i + 1)
        .unwrap_or(body.len());
    Some((start, resume))
}

fn tag_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase()
}

fn tag_attributes(e: &BytesStart<'_>) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    for attr in e.html_attributes().with_checks(false) {
        let Ok(attr) = attr else {
            continue;
        };
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
        let value = match attr.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attributes.insert(key, value);
    }
    attributes
}

/// Parse with html5ever (via scraper) and replay the normalised DOM as events
pub fn scan_document(markup: &str) -> Vec<MarkupEvent> {
    let document = Html::parse_document(markup);
    let mut events = Vec::new();
    replay_element(document.root_element(), &mut events);
    events
}

fn replay_element(element: ElementRef<'_>, events: &mut Vec<MarkupEvent>) {
    let value = element.value();
    let name = value.name().to_string();
    let attributes: HashMap<String, String> = value
        .attrs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    if is_void_element(&name) && !element.has_children() {
        events.push(MarkupEvent::SelfClose { name, attributes });
        return;
    }

    events.push(MarkupEvent::Open {
        name: name.clone(),
        attributes,
    });
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            replay_element(child_element, events);
        } else if let Some(text) = child.value().as_text() {
            events.push(MarkupEvent::Text(String::from(&**text)));
        }
    }
    events.push(MarkupEvent::Close { name });
}

/// Scan and build in one step using the token-level scanner
pub fn parse_markup(markup: &str) -> Tree {
    build_tree(scan_markup(markup))
}

/// Scan and build in one step using the html5ever scanner
pub fn parse_document(markup: &str) -> Tree {
    build_tree(scan_document(markup))
}

/// Which scanner turns fetched or passed-in markup into a [`Tree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    #[default]
    Markup,
    Document,
}

impl ParseMode {
    pub fn parse(self, markup: &str) -> Tree {
        match self {
            ParseMode::Markup => parse_markup(markup),
            ParseMode::Document => parse_document(markup),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_markup_events() {
        let events = scan_markup(r#"<div class="a"><img src="x.png"><br/>Hi &amp; bye</div>"#);
        assert_eq!(
            events,
            vec![
                MarkupEvent::Open {
                    name: "div".to_string(),
                    attributes: HashMap::from([("class".to_string(), "a".to_string())]),
                },
                MarkupEvent::SelfClose {
                    name: "img".to_string(),
                    attributes: HashMap::from([("src".to_string(), "x.png".to_string())]),
                },
                MarkupEvent::SelfClose {
                    name: "br".to_string(),
                    attributes: HashMap::new(),
                },
                MarkupEvent::Text("Hi & bye".to_string()),
                MarkupEvent::Close {
                    name: "div".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_markup_tree_shape() {
        let html = r#"
        <html>
            <body>
                <div class="list">
                    <a href="/one">One</a>
                    <img src="/a.png" />
                </div>
            </body>
        </html>
        "#;

        let tree = parse_markup(html);
        let html_el = tree.node(tree.node(tree.root()).children()[0]);
        assert_eq!(html_el.tag(), "html");
        let body = tree.node(html_el.children()[0]);
        let div = tree.node(body.children()[0]);
        assert_eq!(div.attr("class"), Some("list"));
        assert_eq!(tree.node(div.children()[0]).text(), "One");
        assert_eq!(tree.node(div.flat()[0]).attr("src"), Some("/a.png"));
    }

    #[test]
    fn test_script_body_is_raw_text() {
        let tree = parse_markup(r#"<script>var a = 1 < 2 && "x.png";</script><p>after</p>"#);
        let root = tree.node(tree.root());
        let script = tree.node(root.children()[0]);
        assert_eq!(script.tag(), "script");
        assert_eq!(script.text(), r#"var a = 1 < 2 && "x.png";"#);
        assert_eq!(tree.node(root.children()[1]).text(), "after");
    }

    #[test]
    fn test_valueless_attribute() {
        let events = scan_markup("<input disabled name=q>");
        match &events[0] {
            MarkupEvent::SelfClose { name, attributes } => {
                assert_eq!(name, "input");
                assert!(attributes.contains_key("disabled"));
                assert_eq!(attributes.get("name").map(String::as_str), Some("q"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_document_normalises() {
        let tree = parse_document("<p>one<p>two<img src=a.png>");
        let html = tree.node(tree.node(tree.root()).children()[0]);
        assert_eq!(html.tag(), "html");
        let body = html
            .children()
            .iter()
            .map(|&id| tree.node(id))
            .find(|n| n.tag() == "body")
            .unwrap();
        assert_eq!(body.children().len(), 2);
        let second = tree.node(body.children()[1]);
        assert_eq!(second.text(), "two");
        assert_eq!(tree.node(second.flat()[0]).attr("src"), Some("a.png"));
    }

    #[test]
    fn test_parse_mode_from_json() {
        let mode: ParseMode = serde_json::from_str(r#""document""#).unwrap();
        assert_eq!(mode, ParseMode::Document);
        let tree = ParseMode::default().parse("<b>x</b>");
        assert_eq!(tree.node(tree.node(tree.root()).children()[0]).tag(), "b");
    }
}
