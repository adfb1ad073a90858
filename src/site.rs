//! Site parsers: a stored stage list bound to one website

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::pipeline::{PipelineOutput, SearchPipeline, SearchStageSpec};
use crate::source::{Method, SourceProvider};
use crate::tree::Tree;

/// Extraction recipe for pages of one host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteParser {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    pub website_url: String,
    #[serde(rename = "search_list", default)]
    pub stages: Vec<SearchStageSpec>,
}

fn parse_url(url: &str) -> Result<Url, PipelineError> {
    Url::parse(url).map_err(|source| PipelineError::InvalidUrl {
        url: url.to_string(),
        source,
    })
}

/// `host[:port]`
fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

impl SiteParser {
    pub fn new(
        name: impl Into<String>,
        website_url: impl Into<String>,
        stages: Vec<SearchStageSpec>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            website_url: website_url.into(),
            stages,
        }
    }

    /// Parse `url` and check it belongs to this parser's website
    fn page_url(&self, url: &str) -> Result<Url, PipelineError> {
        let page = parse_url(url)?;
        let site = parse_url(&self.website_url)?;
        let (expected, actual) = (authority(&site), authority(&page));
        if expected != actual {
            return Err(PipelineError::HostMismatch { expected, actual });
        }
        Ok(page)
    }

    /// Fetch `url` through `provider` and run the stages over it
    pub fn parse<P>(&self, provider: &P, url: &str) -> Result<PipelineOutput, PipelineError>
    where
        P: SourceProvider + ?Sized,
    {
        let page = self.page_url(url)?;
        let tree = provider.fetch(url, Method::Get, None)?;
        Ok(self.run(&tree, &page))
    }

    /// Run the stages over an already parsed page
    pub fn parse_tree(&self, tree: &Tree, url: &str) -> Result<PipelineOutput, PipelineError> {
        let page = self.page_url(url)?;
        Ok(self.run(tree, &page))
    }

    fn run(&self, tree: &Tree, page: &Url) -> PipelineOutput {
        tracing::debug!(parser = %self.name, url = %page, stages = self.stages.len(), "running site parser");
        SearchPipeline::new(&self.stages).run(tree, page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::source::MemorySource;

    const CATALOG: &str = r#"
        <ul class="books">
            <li><a href="/book/1">Dune</a></li>
            <li><a href="/book/2">Emma</a></li>
        </ul>
    "#;

    fn books_parser() -> SiteParser {
        SiteParser::new(
            "books",
            "https://books.example.com",
            vec![
                SearchStageSpec::attribute("class", "^books$", 0)
                    .forward()
                    .without_remap(),
                SearchStageSpec::tag("a", 1),
                SearchStageSpec::remap_only("text", "title", 1),
            ],
        )
    }

    #[test]
    fn test_parse_through_provider() {
        let source = MemorySource::new().with_page("https://books.example.com/list", CATALOG);
        let output = books_parser()
            .parse(&source, "https://books.example.com/list")
            .unwrap();

        assert_eq!(output.records.len(), 2);
        assert_eq!(output.records[0]["title"], "Dune");
        assert_eq!(output.records[1]["link"], "https://books.example.com/book/2");
    }

    #[test]
    fn test_host_mismatch() {
        let source = MemorySource::new();
        let err = books_parser()
            .parse(&source, "https://other.example.com/list")
            .unwrap_err();
        match err {
            PipelineError::HostMismatch { expected, actual } => {
                assert_eq!(expected, "books.example.com");
                assert_eq!(actual, "other.example.com");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_port_is_part_of_host() {
        let parser = SiteParser::new("local", "http://localhost:8080", vec![]);
        let tree = Tree::new();
        assert!(parser.parse_tree(&tree, "http://localhost:8080/a").is_ok());
        assert!(parser.parse_tree(&tree, "http://localhost:9090/a").is_err());
    }

    #[test]
    fn test_invalid_url() {
        let err = books_parser()
            .parse_tree(&Tree::new(), "::not a url")
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidUrl { .. }));
    }

    #[test]
    fn test_source_error_propagates() {
        let source = MemorySource::new();
        let err = books_parser()
            .parse(&source, "https://books.example.com/missing")
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Source(SourceError::Status { status: 404, .. })
        ));
    }

    #[test]
    fn test_deserialize_stored_parser() {
        let json = r#"{
            "name": "books",
            "website_url": "https://books.example.com",
            "search_list": [
                {"type": "tag", "tag": "a", "search_order": 0}
            ]
        }"#;
        let parser: SiteParser = serde_json::from_str(json).unwrap();
        assert_eq!(parser.stages.len(), 1);
        assert!(!parser.id.is_nil());
    }
}
