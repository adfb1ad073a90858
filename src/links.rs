//! Turning href/src style attribute values into absolute URLs

use std::collections::HashMap;

use url::Url;

use crate::error::LinkError;

/// Attributes consulted, in priority order, when synthesizing a record link
pub const LINK_ATTRIBUTES: &[&str] = &["href", "src", "data-src"];

/// How [`rewrite_links`] treats links that already carry a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkRewrite {
    /// Every link is moved onto the base scheme and host, keeping its path,
    /// query and fragment. Absolute links to other hosts are rewritten too.
    #[default]
    ForceBaseHost,
    /// Absolute links keep their own host; relative links are resolved
    /// against the base.
    PreserveHost,
}

fn parse_base(base: &str) -> Result<Url, LinkError> {
    Url::parse(base).map_err(|source| LinkError::InvalidBase {
        url: base.to_string(),
        source,
    })
}

/// `scheme://host[:port]` of a parsed URL
pub fn origin(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    }
}

/// Query-style decode of an attribute value: `+` is a space and every `%`
/// must start a two digit hex escape. Undecodable values count as absent.
fn decode(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    for (i, _) in value.match_indices('%') {
        let escape = bytes.get(i + 1..i + 3)?;
        if !escape.iter().all(u8::is_ascii_hexdigit) {
            tracing::debug!(value, "malformed percent escape");
            return None;
        }
    }
    let decoded = urlencoding::decode(&value.replace('+', " ")).ok()?.into_owned();
    if decoded.is_empty() {
        None
    } else {
        Some(decoded)
    }
}

/// Resolve the first usable attribute into an absolute URL.
///
/// An empty string means there is no resolvable link. The base URL is only
/// parsed when a root-relative path needs it, so an invalid base only fails
/// that case.
pub fn absolutize(
    base: &str,
    keys: &[&str],
    attributes: &HashMap<String, String>,
) -> Result<String, LinkError> {
    let Some(link) = keys
        .iter()
        .filter_map(|key| attributes.get(*key))
        .find_map(|value| decode(value))
    else {
        return Ok(String::new());
    };

    if link.starts_with("//") {
        return Ok(format!("https:{}", link));
    }

    if let Some(start) = link.find("http") {
        // Values wrapped by redirectors carry the real target after the prefix
        let target = &link[start..];
        if !target.contains('?') {
            if let Some(amp) = target.find('&') {
                return Ok(target[..amp].to_string());
            }
        }
        return Ok(target.to_string());
    }

    if !link.starts_with('/') {
        return Ok(String::new());
    }

    let base = parse_base(base)?;
    Ok(format!("{}{}", origin(&base), link))
}

/// Rewrite link attributes in place as absolute URLs.
///
/// Values that are empty, undecodable or cannot be joined onto the base are
/// left untouched.
pub fn rewrite_links(
    base: &str,
    keys: &[&str],
    attributes: &mut HashMap<String, String>,
    mode: LinkRewrite,
) -> Result<(), LinkError> {
    let base = parse_base(base)?;

    for key in keys {
        let Some(value) = attributes.get(*key) else {
            continue;
        };
        let Some(link) = decode(value) else {
            continue;
        };
        let resolved = match base.join(&link) {
            Ok(u) => u,
            Err(e) => {
                tracing::debug!(link = %link, error = %e, "cannot resolve link");
                continue;
            }
        };

        let rewritten = match mode {
            LinkRewrite::PreserveHost => resolved.to_string(),
            LinkRewrite::ForceBaseHost => {
                let mut out = format!("{}{}", origin(&base), resolved.path());
                if let Some(query) = resolved.query() {
                    out.push('?');
                    out.push_str(query);
                }
                if let Some(fragment) = resolved.fragment() {
                    out.push('#');
                    out.push_str(fragment);
                }
                out
            }
        };
        attributes.insert(key.to_string(), rewritten);
    }

    Ok(())
}
