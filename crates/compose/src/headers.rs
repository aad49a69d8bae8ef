//! Response header assembly.

use http::header::{HeaderMap, HeaderValue, SET_COOKIE};
use url::Url;

/// Base headers attached to every composed page. Composed output is always
/// assembled per request, so caches must never hold it.
pub fn base_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(http::header::CACHE_CONTROL, HeaderValue::from_static("no-cache, no-store, must-revalidate"));
    headers.insert(http::header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
    headers
}

/// Merges fragment headers into the page headers.
///
/// Plain headers overwrite; `set-cookie` values accumulate, with a later
/// cookie replacing an earlier one of the same name so the page never sends
/// conflicting values for one cookie.
pub fn merge_headers(target: &mut HeaderMap, source: &HeaderMap) {
    for (name, value) in source {
        if *name == SET_COOKIE {
            let incoming_name = cookie_name(value);
            let mut kept: Vec<HeaderValue> = target
                .get_all(SET_COOKIE)
                .into_iter()
                .filter(|existing| cookie_name(existing) != incoming_name)
                .cloned()
                .collect();
            kept.push(value.clone());

            target.remove(SET_COOKIE);
            for cookie in kept {
                target.append(SET_COOKIE, cookie);
            }
        } else {
            target.insert(name.clone(), value.clone());
        }
    }
}

fn cookie_name(value: &HeaderValue) -> &[u8] {
    let bytes = value.as_bytes();
    let end = bytes.iter().position(|&b| b == b'=').unwrap_or(bytes.len());
    &bytes[..end]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Style,
    Script,
}

impl AssetKind {
    fn as_attr(self) -> &'static str {
        match self {
            Self::Style => "style",
            Self::Script => "script",
        }
    }
}

/// One `rel="preload"` directive for the page's `Link` response header.
/// `crossorigin` is only meaningful for scripts.
pub fn preload_directive(uri: &str, kind: AssetKind, crossorigin: bool) -> String {
    let mut directive = format!("<{uri}>; rel=\"preload\"; as=\"{}\"; nopush", kind.as_attr());
    if crossorigin {
        directive.push_str("; crossorigin");
    }
    directive
}

/// Whether `uri` points at a different origin than the page's `Host`.
///
/// Relative and unparseable URIs count as same-origin; the port is part of
/// the comparison when the `Host` header carries one.
pub fn cross_origin(uri: &str, request_host: &str) -> bool {
    let Ok(url) = Url::parse(uri) else { return false };
    let Some(host) = url.host_str() else { return false };

    let asset_host = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    asset_host != request_host
}
