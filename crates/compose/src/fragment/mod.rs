//! The fragment unit: one placeholder, one origin request, one framed region.
//!
//! Every fragment runs as its own tokio task as soon as the template is
//! parsed. The task reports its outcome (status, headers, asset refs) to the
//! orchestrator through a oneshot as soon as the response head is validated,
//! then streams the framed region bytes through a bounded channel that the
//! output driver drains in document order. The bound is the backpressure
//! seam: a fragment whose turn has not come stalls its origin read instead
//! of buffering its body.

mod attributes;
mod decompress;

pub use attributes::FragmentAttributes;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use http::header::ACCEPT_ENCODING;
use http::{HeaderMap, HeaderValue, StatusCode};
use quilt_http::client::Client;
use quilt_http::connection::FragmentResponse;
use tokio::sync::{mpsc, oneshot};
use url::Url;

use crate::error::FragmentError;
use crate::event::{EventSink, FragmentEvent};
use crate::hooks::{FragmentHooks, RequestHeaderFilter};
use crate::link_header::parse_link_header;
use decompress::Decompressor;

/// Inline stand-in for async fragments. The request is still issued for its
/// side effects, but the body is not woven into the page yet.
pub const ASYNC_PLACEHOLDER: &str = "<!-- Async fragments are not fully implemented yet -->";

/// What a fragment resolved to, available to the orchestrator before the
/// page head is flushed.
#[derive(Debug, Clone)]
pub struct FragmentOutcome {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub style_refs: Vec<String>,
    pub script_refs: Vec<String>,
}

/// Environment shared by all fragment tasks of one request.
pub(crate) struct FragmentEnv {
    pub client: Client,
    pub sink: Arc<dyn EventSink>,
    pub hooks: Arc<dyn FragmentHooks>,
    pub header_filter: Arc<dyn RequestHeaderFilter>,
    pub max_asset_links: usize,
    pub inbound_headers: HeaderMap,
    pub inbound_query: Vec<(String, String)>,
}

/// Region chunks buffered per fragment while the driver is busy with an
/// earlier region.
const REGION_CHANNEL_CAPACITY: usize = 16;

/// The orchestrator's handle on one running fragment.
pub(crate) struct FragmentHandle {
    pub attributes: FragmentAttributes,
    pub output: mpsc::Receiver<Result<Bytes, FragmentError>>,
    /// Taken by the orchestrator when this fragment's outcome gates the page
    /// head.
    pub outcome: Option<oneshot::Receiver<Result<FragmentOutcome, FragmentError>>>,
}

pub(crate) fn spawn(attributes: FragmentAttributes, index: usize, env: Arc<FragmentEnv>) -> FragmentHandle {
    let (output_tx, output_rx) = mpsc::channel(REGION_CHANNEL_CAPACITY);
    let (outcome_tx, outcome_rx) = oneshot::channel();

    let handle_attributes = attributes.clone();
    tokio::spawn(run(attributes, index, env, output_tx, outcome_tx));

    FragmentHandle { attributes: handle_attributes, output: output_rx, outcome: Some(outcome_rx) }
}

async fn run(
    attributes: FragmentAttributes,
    index: usize,
    env: Arc<FragmentEnv>,
    output: mpsc::Sender<Result<Bytes, FragmentError>>,
    outcome: oneshot::Sender<Result<FragmentOutcome, FragmentError>>,
) {
    let id = attributes.id.as_deref();
    env.sink.on_fragment(id, index, &FragmentEvent::Start);

    if attributes.asynchronous {
        let _ = output.send(Ok(Bytes::from_static(ASYNC_PLACEHOLDER.as_bytes()))).await;
    }

    let response = match fetch(&attributes, &env).await {
        Ok(response) => response,
        Err(error) => {
            let event = match &error {
                FragmentError::Timeout { .. } => FragmentEvent::Timeout,
                other => FragmentEvent::Error { error: other },
            };
            env.sink.on_fragment(id, index, &event);
            let _ = outcome.send(Err(error));

            // the failed region keeps its markers so client code can still
            // locate it
            if !attributes.asynchronous {
                let _ = output.send(Ok(Bytes::from(start_marker(index, id)))).await;
                let _ = output.send(Ok(Bytes::from(end_marker(index, id)))).await;
            }
            return;
        }
    };

    env.sink.on_fragment(id, index, &FragmentEvent::Response {
        status: response.head.status,
        headers: &response.head.headers,
    });

    let (style_refs, script_refs) = asset_refs(&response.head.headers, env.max_asset_links);
    let _ = outcome.send(Ok(FragmentOutcome {
        status: response.head.status,
        headers: response.head.headers.clone(),
        style_refs: style_refs.clone(),
        script_refs: script_refs.clone(),
    }));

    if attributes.asynchronous {
        // drain so the connection can go back to the pool
        let mut body = response.body;
        while let Some(item) = body.next().await {
            if item.is_err() {
                break;
            }
        }
        env.sink.on_fragment(id, index, &FragmentEvent::End { content_length: 0 });
        return;
    }

    let content_length =
        stream_region(&attributes, index, &env, &output, response, &style_refs, &script_refs).await;
    env.sink.on_fragment(id, index, &FragmentEvent::End { content_length });
}

/// Emits the full framed region and returns the decoded body length.
async fn stream_region(
    attributes: &FragmentAttributes,
    index: usize,
    env: &FragmentEnv,
    output: &mpsc::Sender<Result<Bytes, FragmentError>>,
    response: FragmentResponse,
    style_refs: &[String],
    script_refs: &[String],
) -> u64 {
    let id = attributes.id.as_deref();
    let _ = output.send(Ok(Bytes::from(start_marker(index, id)))).await;

    let opening = env
        .hooks
        .insert_start(attributes, style_refs, script_refs)
        .unwrap_or_else(|| default_insert_start(style_refs, id));
    if !opening.is_empty() {
        let _ = output.send(Ok(Bytes::from(opening))).await;
    }

    let mut decompressor = Decompressor::from_headers(&response.head.headers);
    let mut body = response.body;
    let mut content_length = 0u64;
    let mut clean = true;

    while let Some(item) = body.next().await {
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(e) => {
                env.sink.on_fragment(id, index, &FragmentEvent::Warn { message: &format!("body stream failed: {e}") });
                let _ = output.send(Err(FragmentError::transport(e))).await;
                clean = false;
                break;
            }
        };
        match decompressor.decode(&chunk) {
            Ok(decoded) => {
                if !decoded.is_empty() {
                    content_length += decoded.len() as u64;
                    let _ = output.send(Ok(decoded)).await;
                }
            }
            Err(e) => {
                env.sink.on_fragment(id, index, &FragmentEvent::Warn { message: &format!("decompression failed: {e}") });
                let _ = output.send(Err(FragmentError::transport(e))).await;
                clean = false;
                break;
            }
        }
    }

    if clean {
        if let Ok(tail) = decompressor.finish()
            && !tail.is_empty()
        {
            content_length += tail.len() as u64;
            let _ = output.send(Ok(tail)).await;
        }

        let closing = env
            .hooks
            .insert_end(attributes, style_refs, script_refs)
            .unwrap_or_else(|| default_insert_end(script_refs, id));
        if !closing.is_empty() {
            let _ = output.send(Ok(Bytes::from(closing))).await;
        }
    }

    let _ = output.send(Ok(Bytes::from(end_marker(index, id)))).await;
    content_length
}

async fn fetch(attributes: &FragmentAttributes, env: &FragmentEnv) -> Result<FragmentResponse, FragmentError> {
    let src = attributes.src.as_deref().ok_or_else(|| FragmentError::transport("fragment has no src"))?;
    let mut url = Url::parse(src).map_err(|e| FragmentError::transport(format!("invalid src {src:?}: {e}")))?;

    if attributes.forward_querystring {
        merge_query(&mut url, &env.inbound_query);
    }

    let mut headers = env.header_filter.filter(&env.inbound_headers, attributes.public);
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));

    let response = tokio::time::timeout(Duration::from_millis(attributes.timeout_ms), env.client.request(&url, headers))
        .await
        .map_err(|_| FragmentError::Timeout { ms: attributes.timeout_ms })?
        .map_err(FragmentError::transport)?;

    let status = response.head.status;
    if status.is_server_error() || (!status.is_success() && !attributes.primary) {
        return Err(FragmentError::Status { status });
    }

    Ok(response)
}

/// Appends the inbound query string. Keys already on the fragment URL win.
fn merge_query(url: &mut Url, inbound: &[(String, String)]) {
    let existing: HashSet<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
    let mut pairs = url.query_pairs_mut();
    for (key, value) in inbound {
        if !existing.contains(key) {
            pairs.append_pair(key, value);
        }
    }
}

/// Collects this fragment's asset references from its `link` headers (and
/// the `x-amz-meta-link` alias some CDNs rewrite into), each kind capped to
/// the first `cap` entries in declaration order.
fn asset_refs(headers: &HeaderMap, cap: usize) -> (Vec<String>, Vec<String>) {
    let mut styles = Vec::new();
    let mut scripts = Vec::new();

    for name in ["link", "x-amz-meta-link"] {
        for value in headers.get_all(name) {
            let Ok(text) = value.to_str() else { continue };
            for record in parse_link_header(text) {
                match record.rel.as_str() {
                    "stylesheet" if styles.len() < cap => styles.push(record.uri),
                    "fragment-script" if scripts.len() < cap => scripts.push(record.uri),
                    _ => {}
                }
            }
        }
    }

    (styles, scripts)
}

fn start_marker(index: usize, id: Option<&str>) -> String {
    match id {
        Some(id) => format!("<!-- Fragment #{index} [\"{id}\"] START -->"),
        None => format!("<!-- Fragment #{index} START -->"),
    }
}

fn end_marker(index: usize, id: Option<&str>) -> String {
    match id {
        Some(id) => format!("<!-- Fragment #{index} [\"{id}\"] END -->"),
        None => format!("<!-- Fragment #{index} END -->"),
    }
}

fn default_insert_start(style_refs: &[String], id: Option<&str>) -> String {
    style_refs
        .iter()
        .map(|uri| match id {
            Some(id) => format!("<link rel=\"stylesheet\" href=\"{uri}\" data-fragment-id=\"{id}\">"),
            None => format!("<link rel=\"stylesheet\" href=\"{uri}\">"),
        })
        .collect()
}

/// Scripts are emitted in reverse declaration order, so the entry point
/// script that names its dependencies comes out last.
fn default_insert_end(script_refs: &[String], id: Option<&str>) -> String {
    script_refs
        .iter()
        .rev()
        .map(|uri| match id {
            Some(id) => format!("<script src=\"{uri}\" data-fragment-id=\"{id}\"></script>"),
            None => format!("<script src=\"{uri}\"></script>"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_format_with_and_without_id() {
        assert_eq!(start_marker(0, Some("hello")), "<!-- Fragment #0 [\"hello\"] START -->");
        assert_eq!(end_marker(3, None), "<!-- Fragment #3 END -->");
    }

    #[test]
    fn asset_refs_cap_each_kind_in_order() {
        let mut headers = HeaderMap::new();
        headers.append(
            "link",
            HeaderValue::from_static(
                "<http://a/1.js>; rel=\"fragment-script\", <http://a/2.js>; rel=\"fragment-script\", \
                 <http://a/3.js>; rel=\"fragment-script\", <http://a/4.js>; rel=\"fragment-script\", \
                 <http://a/1.css>; rel=\"stylesheet\"",
            ),
        );

        let (styles, scripts) = asset_refs(&headers, 3);
        assert_eq!(scripts, ["http://a/1.js", "http://a/2.js", "http://a/3.js"]);
        assert_eq!(styles, ["http://a/1.css"]);
    }

    #[test]
    fn asset_refs_read_the_cdn_alias() {
        let mut headers = HeaderMap::new();
        headers.append("x-amz-meta-link", HeaderValue::from_static("<http://a/1.css>; rel=\"stylesheet\""));

        let (styles, scripts) = asset_refs(&headers, 1);
        assert_eq!(styles, ["http://a/1.css"]);
        assert!(scripts.is_empty());
    }

    #[test]
    fn default_scripts_are_reversed() {
        let scripts = vec!["http://a/1.js".to_string(), "http://a/2.js".to_string()];
        let html = default_insert_end(&scripts, Some("x"));
        assert_eq!(
            html,
            "<script src=\"http://a/2.js\" data-fragment-id=\"x\"></script>\
             <script src=\"http://a/1.js\" data-fragment-id=\"x\"></script>"
        );
    }

    #[test]
    fn default_styles_keep_declaration_order() {
        let styles = vec!["http://a/1.css".to_string(), "http://a/2.css".to_string()];
        let html = default_insert_start(&styles, None);
        assert_eq!(
            html,
            "<link rel=\"stylesheet\" href=\"http://a/1.css\"><link rel=\"stylesheet\" href=\"http://a/2.css\">"
        );
    }

    #[test]
    fn query_merge_keeps_fragment_keys() {
        let mut url = Url::parse("http://origin/frag?tier=1").unwrap();
        merge_query(&mut url, &[("tier".to_string(), "2".to_string()), ("q".to_string(), "rust".to_string())]);
        assert_eq!(url.query(), Some("tier=1&q=rust"));
    }
}
