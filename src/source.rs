//! Fetching pages and files
//!
//! [`SourceProvider`] is the seam between the extraction code and the
//! network. [`HttpSource`] is the blocking ureq implementation with a short
//! lived page cache, a politeness delay and an optional proxy fallback.
//! [`MemorySource`] serves fixed pages and is what tests use.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use url::Url;

use crate::config::SourceConfig;
use crate::error::SourceError;
use crate::scanner::ParseMode;
use crate::tree::Tree;

/// Characters stripped from file names taken from response headers
const UNSAFE_FILENAME_CHARS: &[char] = &['/', '?', '%', '*', ':', '|', '"', '<', '>'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
}

/// Anything that can turn a URL into a parsed page
pub trait SourceProvider {
    fn fetch(&self, url: &str, method: Method, body: Option<&[u8]>) -> Result<Tree, SourceError>;
}

#[derive(Debug)]
struct CachedPage {
    tree: Tree,
    fetched_at: Instant,
}

/// Blocking HTTP page source
pub struct HttpSource {
    agent: ureq::Agent,
    config: SourceConfig,
    mode: ParseMode,
    cache: RwLock<HashMap<String, CachedPage>>,
    rng: Mutex<StdRng>,
}

impl std::fmt::Debug for HttpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSource")
            .field("config", &self.config)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl HttpSource {
    pub fn new(config: SourceConfig) -> Self {
        Self::with_mode(config, ParseMode::default())
    }

    pub fn with_mode(config: SourceConfig, mode: ParseMode) -> Self {
        let agent = ureq::Agent::new_with_config(
            ureq::Agent::config_builder()
                .timeout_global(Some(config.timeout()))
                .user_agent(config.user_agent.as_str())
                .http_status_as_error(false)
                .build(),
        );
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            agent,
            config,
            mode,
            cache: RwLock::new(HashMap::new()),
            rng: Mutex::new(rng),
        }
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn cached(&self, url: &str) -> Option<Tree> {
        let cache = self.cache.read().ok()?;
        let page = cache.get(url)?;
        if page.fetched_at.elapsed() < self.config.cache_ttl() {
            Some(page.tree.clone())
        } else {
            None
        }
    }

    fn store(&self, url: &str, tree: &Tree) {
        let ttl = self.config.cache_ttl();
        if let Ok(mut cache) = self.cache.write() {
            cache.retain(|_, page| page.fetched_at.elapsed() < ttl);
            cache.insert(
                url.to_string(),
                CachedPage {
                    tree: tree.clone(),
                    fetched_at: Instant::now(),
                },
            );
        }
    }

    /// Send one request, treating non-2xx as an error
    fn request(
        &self,
        url: &str,
        method: Method,
        body: Option<&[u8]>,
    ) -> Result<ureq::http::Response<ureq::Body>, SourceError> {
        let response = match method {
            Method::Get => self.agent.get(url).call(),
            Method::Post => self.agent.post(url).send(body.unwrap_or_default()),
        }
        .map_err(|e| SourceError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }

    fn read_text(
        &self,
        url: &str,
        method: Method,
        body: Option<&[u8]>,
    ) -> Result<String, SourceError> {
        self.request(url, method, body)?
            .into_body()
            .read_to_string()
            .map_err(|e| SourceError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })
    }

    /// Delay to wait after a network fetch
    fn next_delay(&self) -> Duration {
        let (min, max) = self.config.delay_range();
        if max <= 0.0 {
            return Duration::ZERO;
        }
        if min == max {
            return Duration::from_secs_f64(max);
        }
        match self.rng.lock() {
            Ok(mut rng) => Duration::from_secs_f64(rng.gen_range(min..=max)),
            Err(_) => Duration::from_secs_f64(max),
        }
    }

    fn pause(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tracing::debug!(delay_ms = delay.as_millis() as u64, "waiting before next request");
            std::thread::sleep(delay);
        }
    }

    /// Download `url` into `path`.
    ///
    /// Returns `None` when `path` is an existing file. A `path` ending in `/`
    /// is a directory and the file name comes from the response headers.
    pub fn download(&self, url: &str, path: &str) -> Result<Option<PathBuf>, SourceError> {
        if Path::new(path).is_file() {
            tracing::debug!(path, "file already downloaded");
            return Ok(None);
        }

        let into_dir = path.ends_with('/');
        let dir = if into_dir {
            Some(Path::new(path))
        } else {
            Path::new(path).parent()
        };
        if let Some(dir) = dir.filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let response = self.request(url, Method::Get, None)?;

        let target = if into_dir {
            let name = response
                .headers()
                .get("content-disposition")
                .and_then(|v| v.to_str().ok())
                .and_then(filename_from_disposition)
                .or_else(|| {
                    response
                        .headers()
                        .get("filename")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string)
                })
                .or_else(|| filename_from_url(url))
                .ok_or_else(|| SourceError::InvalidUrl(url.to_string()))?;
            Path::new(path).join(name)
        } else {
            PathBuf::from(path)
        };

        let mut file = File::create(&target)?;
        let bytes = std::io::copy(&mut response.into_body().into_reader(), &mut file)?;
        tracing::debug!(url, path = %target.display(), bytes, "downloaded file");

        self.pause();
        Ok(Some(target))
    }
}

impl SourceProvider for HttpSource {
    fn fetch(&self, url: &str, method: Method, body: Option<&[u8]>) -> Result<Tree, SourceError> {
        Url::parse(url).map_err(|_| SourceError::InvalidUrl(url.to_string()))?;

        // Only GET responses are cached
        if method == Method::Get {
            if let Some(tree) = self.cached(url) {
                tracing::debug!(url, "page cache hit");
                return Ok(tree);
            }
        }

        let text = match self.read_text(url, method, body) {
            Ok(text) => text,
            Err(e) => match &self.config.proxy_url {
                Some(proxy) => {
                    tracing::debug!(url, error = %e, "direct fetch failed, trying proxy");
                    let target = proxy_target(proxy, url)?;
                    self.read_text(&target, Method::Get, None)?
                }
                None => return Err(e),
            },
        };
        tracing::debug!(url, bytes = text.len(), "fetched page");

        let tree = self.mode.parse(&text);
        if method == Method::Get {
            self.store(url, &tree);
        }
        self.pause();
        Ok(tree)
    }
}

/// Proxy endpoint with the page URL as its only `u` query parameter
fn proxy_target(proxy: &str, url: &str) -> Result<String, SourceError> {
    let mut target = Url::parse(proxy).map_err(|_| SourceError::InvalidUrl(proxy.to_string()))?;
    target.query_pairs_mut().clear().append_pair("u", url);
    Ok(target.to_string())
}

/// File name from a `Content-Disposition` header value
fn filename_from_disposition(header: &str) -> Option<String> {
    let start = header.find("filename")?;
    let value = header[start..].split('=').nth(1)?;
    let value = value.split(';').next().unwrap_or_default();
    let name: String = value
        .chars()
        .filter(|c| !UNSAFE_FILENAME_CHARS.contains(c))
        .collect();
    let name = name.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let name = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Some(name.to_string())
}

/// Fixed set of pages keyed by URL
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    pages: HashMap<String, String>,
    mode: ParseMode,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, markup: impl Into<String>) -> Self {
        self.pages.insert(url.into(), markup.into());
        self
    }

    pub fn with_mode(mut self, mode: ParseMode) -> Self {
        self.mode = mode;
        self
    }
}

impl SourceProvider for MemorySource {
    fn fetch(&self, url: &str, _method: Method, _body: Option<&[u8]>) -> Result<Tree, SourceError> {
        match self.pages.get(url) {
            Some(markup) => Ok(self.mode.parse(markup)),
            None => Err(SourceError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}
