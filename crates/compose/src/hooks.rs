//! Host collaborator traits.
//!
//! The composer owns the mechanics of a request; everything deployment
//! specific (where templates live, what the page context is, which headers
//! cross the trust boundary, what assets every page preloads) is injected
//! through these traits. Defaults are provided for all of them except the
//! template source.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;
use http::request::Parts;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::config::ComposeConfig;
use crate::error::{ComposeError, TemplateError};
use crate::fragment::FragmentAttributes;
use crate::headers::AssetKind;
use crate::segment::{Segment, TagInfo};
use crate::template::TemplateParser;

/// Maps a request to a parsed template. Implementations load the base (and
/// optional child) markup from wherever templates live and run them through
/// the provided parser, which memoizes.
#[async_trait]
pub trait TemplateFetcher: Send + Sync {
    async fn fetch(&self, request: &Parts, parser: &TemplateParser) -> Result<Arc<[Segment]>, TemplateError>;
}

/// Produces the page context: a JSON object keyed by fragment id whose
/// entries override the authored fragment attributes. Failures never fail
/// the page; the composer falls back to an empty context.
#[async_trait]
pub trait ContextFetcher: Send + Sync {
    async fn fetch(&self, request: &Parts) -> Result<Map<String, Value>, ComposeError>;
}

#[derive(Debug)]
pub struct EmptyContext;

#[async_trait]
impl ContextFetcher for EmptyContext {
    async fn fetch(&self, _request: &Parts) -> Result<Map<String, Value>, ComposeError> {
        Ok(Map::new())
    }
}

/// Selects the inbound headers forwarded to fragment origins.
pub trait RequestHeaderFilter: Send + Sync {
    fn filter(&self, headers: &HeaderMap, public: bool) -> HeaderMap;
}

/// Forwards only headers that are safe on the open internet; public
/// fragments get nothing at all.
#[derive(Debug)]
pub struct DefaultRequestHeaderFilter;

const FORWARDED_REQUEST_HEADERS: &[http::HeaderName] =
    &[http::header::ACCEPT_LANGUAGE, http::header::REFERER, http::header::USER_AGENT];

impl RequestHeaderFilter for DefaultRequestHeaderFilter {
    fn filter(&self, headers: &HeaderMap, public: bool) -> HeaderMap {
        let mut filtered = HeaderMap::new();
        if public {
            return filtered;
        }
        for name in FORWARDED_REQUEST_HEADERS {
            if let Some(value) = headers.get(name) {
                filtered.insert(name.clone(), value.clone());
            }
        }
        filtered
    }
}

/// Selects which fragment response headers a `return-headers` fragment may
/// contribute to the page head.
pub trait ResponseHeaderFilter: Send + Sync {
    fn filter(&self, headers: &HeaderMap) -> HeaderMap;
}

/// Keeps `set-cookie` and `location` only.
#[derive(Debug)]
pub struct DefaultResponseHeaderFilter;

impl ResponseHeaderFilter for DefaultResponseHeaderFilter {
    fn filter(&self, headers: &HeaderMap) -> HeaderMap {
        let mut filtered = HeaderMap::new();
        for value in headers.get_all(http::header::SET_COOKIE) {
            filtered.append(http::header::SET_COOKIE, value.clone());
        }
        if let Some(location) = headers.get(http::header::LOCATION) {
            filtered.insert(http::header::LOCATION, location.clone());
        }
        filtered
    }
}

/// Static assets preloaded on every page via the `Link` response header.
pub trait AssetProvider: Send + Sync {
    fn assets(&self, request: &Parts) -> Vec<(String, AssetKind)>;
}

/// Preloads the configured AMD loader, which fragment client scripts are
/// loaded through.
#[derive(Debug)]
pub struct DefaultAssetProvider {
    amd_loader_url: String,
}

impl DefaultAssetProvider {
    pub fn new(config: &ComposeConfig) -> Self {
        Self { amd_loader_url: config.amd_loader_url.clone() }
    }
}

impl AssetProvider for DefaultAssetProvider {
    fn assets(&self, _request: &Parts) -> Vec<(String, AssetKind)> {
        vec![(self.amd_loader_url.clone(), AssetKind::Script)]
    }
}

/// What a [`TagHandler`] splices into the page in place of a handled tag.
#[derive(Debug)]
pub enum TagOutput {
    /// Literal markup, emitted as-is.
    Literal(Bytes),
    /// A live byte stream piped into the page at the tag's position, the way
    /// a fragment region is. The region ends when the sender drops.
    Stream(mpsc::Receiver<Bytes>),
}

/// Renders the configured handled tags at request time. `None` renders
/// nothing.
#[async_trait]
pub trait TagHandler: Send + Sync {
    async fn handle(&self, request: &Parts, tag: &TagInfo) -> Option<TagOutput>;
}

#[derive(Debug)]
pub struct IgnoreTags;

#[async_trait]
impl TagHandler for IgnoreTags {
    async fn handle(&self, _request: &Parts, _tag: &TagInfo) -> Option<TagOutput> {
        None
    }
}

/// Overrides the markup framing each fragment region. Returning `None`
/// keeps the default asset emission: stylesheet links before the body,
/// scripts (reversed) after it.
pub trait FragmentHooks: Send + Sync {
    fn insert_start(&self, attributes: &FragmentAttributes, styles: &[String], scripts: &[String]) -> Option<String> {
        let _ = (attributes, styles, scripts);
        None
    }

    fn insert_end(&self, attributes: &FragmentAttributes, styles: &[String], scripts: &[String]) -> Option<String> {
        let _ = (attributes, styles, scripts);
        None
    }
}

#[derive(Debug)]
pub struct DefaultFragmentHooks;

impl FragmentHooks for DefaultFragmentHooks {}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn request_filter_whitelists() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::USER_AGENT, HeaderValue::from_static("test"));
        headers.insert(http::header::COOKIE, HeaderValue::from_static("secret=1"));

        let filtered = DefaultRequestHeaderFilter.filter(&headers, false);
        assert!(filtered.contains_key(http::header::USER_AGENT));
        assert!(!filtered.contains_key(http::header::COOKIE));
    }

    #[test]
    fn public_fragments_get_no_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::USER_AGENT, HeaderValue::from_static("test"));

        assert!(DefaultRequestHeaderFilter.filter(&headers, true).is_empty());
    }

    #[test]
    fn response_filter_keeps_cookies_and_location() {
        let mut headers = HeaderMap::new();
        headers.append(http::header::SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(http::header::SET_COOKIE, HeaderValue::from_static("b=2"));
        headers.insert(http::header::LOCATION, HeaderValue::from_static("/next"));
        headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("text/html"));

        let filtered = DefaultResponseHeaderFilter.filter(&headers);
        assert_eq!(filtered.get_all(http::header::SET_COOKIE).into_iter().count(), 2);
        assert!(filtered.contains_key(http::header::LOCATION));
        assert!(!filtered.contains_key(http::header::CONTENT_TYPE));
    }
}
