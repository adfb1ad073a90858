//! Fuzzy structured-data extraction from loosely formed markup
//!
//! Pages are turned into a lightweight tree and queried with tag names,
//! regex and fuzzy text criteria:
//! - Markup scanning into a tree (token-level or html5ever normalised)
//! - Fuzzy/regex node search, flattening and link resolution
//! - Declarative multi-stage search pipelines and per-site parsers
//! - Schema-less heuristics (title, description, tags, chapters, images, pages)
//! - Blocking page source with caching, and an FFI interface for C/C++ hosts

pub mod analyzer;
pub mod builder;
pub mod config;
pub mod error;
pub mod ffi;
pub mod fuzzy;
pub mod links;
pub mod pipeline;
pub mod query;
pub mod scanner;
pub mod site;
pub mod source;
pub mod tree;

pub use analyzer::{AutoExtractor, AutoSummary};
pub use builder::{build_tree, MarkupEvent, TreeBuilder};
pub use config::SourceConfig;
pub use error::{LinkError, PipelineError, SourceError};
pub use ffi::*;
pub use fuzzy::similarity;
pub use links::{absolutize, rewrite_links, LinkRewrite};
pub use pipeline::{PipelineOutput, SearchPipeline, SearchStageSpec};
pub use query::{flatten, search, Query, TagFilter};
pub use scanner::{parse_document, parse_markup, ParseMode};
pub use site::SiteParser;
pub use source::{HttpSource, MemorySource, Method, SourceProvider};
pub use tree::{ExclusionSet, Node, NodeId, NodeView, Tree};
