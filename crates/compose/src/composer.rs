//! The request orchestrator.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, HOST, LINK, USER_AGENT};
use http::request::Parts;
use http::{HeaderValue, Response, StatusCode};
use quilt_http::client::Client;
use serde_json::Map;
use tokio::sync::mpsc;
use tracing::warn;

use crate::body::{BODY_CHANNEL_CAPACITY, BodySender, ComposeBody};
use crate::config::ComposeConfig;
use crate::error::{ComposeError, FragmentError};
use crate::event::{ComposeEvent, EventSink, FragmentEvent, TracingSink};
use crate::fragment::{self, FragmentAttributes, FragmentEnv, FragmentHandle, FragmentOutcome};
use crate::guard::is_search_bot;
use crate::headers::{AssetKind, base_headers, cross_origin, merge_headers, preload_directive};
use crate::hooks::{
    AssetProvider, ContextFetcher, DefaultAssetProvider, DefaultFragmentHooks, DefaultRequestHeaderFilter,
    DefaultResponseHeaderFilter, EmptyContext, FragmentHooks, IgnoreTags, RequestHeaderFilter,
    ResponseHeaderFilter, TagHandler, TagOutput, TemplateFetcher,
};
use crate::segment::{Segment, TagInfo};
use crate::template::TemplateParser;

/// Composes pages out of fragments.
///
/// One composer serves many concurrent requests; all per-request state lives
/// in [`handle`](Self::handle). Collaborators are injected through
/// [`ComposerBuilder`]; only the template source is mandatory.
pub struct Composer {
    config: ComposeConfig,
    client: Client,
    parser: TemplateParser,
    templates: Arc<dyn TemplateFetcher>,
    context: Arc<dyn ContextFetcher>,
    request_filter: Arc<dyn RequestHeaderFilter>,
    response_filter: Arc<dyn ResponseHeaderFilter>,
    assets: Arc<dyn AssetProvider>,
    tags: Arc<dyn TagHandler>,
    hooks: Arc<dyn FragmentHooks>,
    sink: Arc<dyn EventSink>,
}

pub struct ComposerBuilder {
    config: ComposeConfig,
    client: Option<Client>,
    templates: Arc<dyn TemplateFetcher>,
    context: Arc<dyn ContextFetcher>,
    request_filter: Arc<dyn RequestHeaderFilter>,
    response_filter: Arc<dyn ResponseHeaderFilter>,
    assets: Option<Arc<dyn AssetProvider>>,
    tags: Arc<dyn TagHandler>,
    hooks: Arc<dyn FragmentHooks>,
    sink: Arc<dyn EventSink>,
}

impl Composer {
    pub fn builder<T: TemplateFetcher + 'static>(templates: T) -> ComposerBuilder {
        ComposerBuilder {
            config: ComposeConfig::default(),
            client: None,
            templates: Arc::new(templates),
            context: Arc::new(EmptyContext),
            request_filter: Arc::new(DefaultRequestHeaderFilter),
            response_filter: Arc::new(DefaultResponseHeaderFilter),
            assets: None,
            tags: Arc::new(IgnoreTags),
            hooks: Arc::new(DefaultFragmentHooks),
            sink: Arc::new(TracingSink),
        }
    }

    /// Composes the page for one inbound request.
    ///
    /// Resolves once the response head is final: after the primary fragment
    /// (when the template declares one) and all `return-headers` fragments
    /// reported. The body streams while the remaining fragments deliver.
    pub async fn handle(&self, request: Parts) -> Response<ComposeBody> {
        let started = Instant::now();
        self.sink.on_page(&ComposeEvent::Start);

        match self.compose(Arc::new(request), started).await {
            Ok(response) => response,
            Err(error) => {
                self.sink.on_page(&ComposeEvent::Error { error: &error });
                // every composition error is a server error, a missing
                // template included; only the presentable text differs
                let status = StatusCode::INTERNAL_SERVER_ERROR;
                self.sink.on_page(&ComposeEvent::Response { status });
                error_response(status, error.presentable())
            }
        }
    }

    async fn compose(&self, request: Arc<Parts>, started: Instant) -> Result<Response<ComposeBody>, ComposeError> {
        let (segments, context) =
            tokio::join!(self.templates.fetch(request.as_ref(), &self.parser), self.context.fetch(request.as_ref()));

        let segments = segments?;
        let context = match context {
            Ok(map) => map,
            Err(e) => {
                let reason = e.to_string();
                self.sink.on_page(&ComposeEvent::ContextError { reason: &reason });
                Map::new()
            }
        };

        let mut pieces = self.spawn_fragments(segments.as_ref(), &context, request.as_ref());

        let user_agent = request.headers.get(USER_AGENT).and_then(|v| v.to_str().ok()).unwrap_or("");
        let guarded = self.config.bots_guard_enabled && is_search_bot(user_agent);
        let outcomes = await_outcomes(&mut pieces, guarded).await;

        let request_host = request.headers.get(HOST).and_then(|v| v.to_str().ok()).unwrap_or("");
        let mut status = StatusCode::OK;
        let mut headers = base_headers();

        // preloads only make sense on pages that load fragment scripts
        let has_fragments = pieces.iter().any(|piece| matches!(piece, Piece::Fragment(_)));
        let mut preload: Vec<String> = if has_fragments {
            self.assets
                .assets(request.as_ref())
                .into_iter()
                .map(|(uri, kind)| {
                    let crossorigin = kind == AssetKind::Script && cross_origin(&uri, request_host);
                    preload_directive(&uri, kind, crossorigin)
                })
                .collect()
        } else {
            Vec::new()
        };

        // return-headers fragments contribute in declaration order, the
        // primary's headers apply last and control status + location
        let mut primary_headers = None;
        for (position, piece) in pieces.iter().enumerate() {
            let Piece::Fragment(handle) = piece else { continue };
            let Some(outcome) = outcomes.get(&position) else { continue };

            match outcome {
                Ok(success) => {
                    if handle.attributes.primary {
                        status = success.status;
                        push_fragment_preloads(&mut preload, success, request_host);
                        primary_headers = Some(self.response_filter.filter(&success.headers));
                    } else if handle.attributes.return_headers {
                        merge_headers(&mut headers, &self.response_filter.filter(&success.headers));
                    }
                }
                Err(error) => {
                    if handle.attributes.primary {
                        return Err(ComposeError::PrimaryFragment { source: error.clone() });
                    }
                    if guarded {
                        return Err(ComposeError::Guarded { source: error.clone() });
                    }
                    // a failed return-headers fragment contributes nothing
                }
            }
        }
        if let Some(primary_headers) = primary_headers {
            merge_headers(&mut headers, &primary_headers);
        }

        if !preload.is_empty() {
            match HeaderValue::from_str(&preload.join(", ")) {
                Ok(value) => {
                    headers.insert(LINK, value);
                }
                Err(_) => warn!("preload link header contains invalid bytes, skipping"),
            }
        }

        let body = if guarded {
            // crawlers get the finished page in one piece; the driver runs
            // concurrently so the bounded channel never fills for good
            let (tx, mut rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
            let driver = tokio::spawn(drive(pieces, Arc::clone(&self.tags), Arc::clone(&request), tx));

            let mut page = BytesMut::new();
            while let Some(item) = rx.recv().await {
                page.extend_from_slice(&item?);
            }
            let total = driver.await.unwrap_or_default();

            self.sink.on_page(&ComposeEvent::End { content_length: total, duration: started.elapsed() });
            if let Ok(value) = HeaderValue::from_str(&total.to_string()) {
                headers.insert(CONTENT_LENGTH, value);
            }
            ComposeBody::once(page.freeze())
        } else {
            let (sender, body) = ComposeBody::channel();
            let tags = Arc::clone(&self.tags);
            let sink = Arc::clone(&self.sink);
            let request = Arc::clone(&request);
            tokio::spawn(async move {
                let total = drive(pieces, tags, request, sender).await;
                sink.on_page(&ComposeEvent::End { content_length: total, duration: started.elapsed() });
            });
            body
        };

        self.sink.on_page(&ComposeEvent::Response { status });

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }

    /// Starts every fragment request immediately, keeping template document
    /// order in the returned pieces. Only the first primary fragment keeps
    /// the flag; later ones are demoted with a warning.
    fn spawn_fragments(
        &self,
        segments: &[Segment],
        context: &Map<String, serde_json::Value>,
        request: &Parts,
    ) -> Vec<Piece> {
        let env = Arc::new(FragmentEnv {
            client: self.client.clone(),
            sink: Arc::clone(&self.sink),
            hooks: Arc::clone(&self.hooks),
            header_filter: Arc::clone(&self.request_filter),
            max_asset_links: self.config.max_asset_links(),
            inbound_headers: request.headers.clone(),
            inbound_query: inbound_query(request),
        });

        let mut primary_seen = false;
        segments
            .iter()
            .map(|segment| match segment {
                Segment::Content(bytes) => Piece::Content(bytes.clone()),
                Segment::HandledTag(tag) => Piece::Handled(tag.clone()),
                Segment::Fragment(tag) => {
                    let mut attributes = FragmentAttributes::resolve(tag, context);
                    if attributes.primary {
                        if primary_seen {
                            self.sink.on_fragment(attributes.id.as_deref(), tag.index, &FragmentEvent::Warn {
                                message: "multiple primary fragments, only the first controls the response",
                            });
                            attributes.primary = false;
                        } else {
                            primary_seen = true;
                        }
                    }
                    Piece::Fragment(fragment::spawn(attributes, tag.index, Arc::clone(&env)))
                }
            })
            .collect()
    }
}

impl ComposerBuilder {
    pub fn config(mut self, config: ComposeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn context_fetcher<C: ContextFetcher + 'static>(mut self, context: C) -> Self {
        self.context = Arc::new(context);
        self
    }

    pub fn request_header_filter<F: RequestHeaderFilter + 'static>(mut self, filter: F) -> Self {
        self.request_filter = Arc::new(filter);
        self
    }

    pub fn response_header_filter<F: ResponseHeaderFilter + 'static>(mut self, filter: F) -> Self {
        self.response_filter = Arc::new(filter);
        self
    }

    pub fn asset_provider<A: AssetProvider + 'static>(mut self, assets: A) -> Self {
        self.assets = Some(Arc::new(assets));
        self
    }

    pub fn tag_handler<H: TagHandler + 'static>(mut self, tags: H) -> Self {
        self.tags = Arc::new(tags);
        self
    }

    pub fn fragment_hooks<H: FragmentHooks + 'static>(mut self, hooks: H) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn event_sink<S: EventSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn build(self) -> Composer {
        let parser = TemplateParser::new(&self.config);
        let assets = self.assets.unwrap_or_else(|| Arc::new(DefaultAssetProvider::new(&self.config)));
        Composer {
            client: self.client.unwrap_or_default(),
            parser,
            templates: self.templates,
            context: self.context,
            request_filter: self.request_filter,
            response_filter: self.response_filter,
            assets,
            tags: self.tags,
            hooks: self.hooks,
            sink: self.sink,
            config: self.config,
        }
    }
}

impl fmt::Debug for Composer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composer").field("config", &self.config).finish_non_exhaustive()
    }
}

impl fmt::Debug for ComposerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposerBuilder").field("config", &self.config).finish_non_exhaustive()
    }
}

/// One position of the page being written out.
enum Piece {
    Content(Bytes),
    Handled(TagInfo),
    Fragment(FragmentHandle),
}

/// Collects the outcomes that gate the response head: the primary fragment,
/// every `return-headers` fragment, and all of them for a guarded request.
async fn await_outcomes(
    pieces: &mut [Piece],
    guarded: bool,
) -> HashMap<usize, Result<FragmentOutcome, FragmentError>> {
    let mut outcomes = HashMap::new();

    for (position, piece) in pieces.iter_mut().enumerate() {
        let Piece::Fragment(handle) = piece else { continue };
        if !(guarded || handle.attributes.primary || handle.attributes.return_headers) {
            continue;
        }
        let Some(receiver) = handle.outcome.take() else { continue };
        let outcome =
            receiver.await.unwrap_or_else(|_| Err(FragmentError::transport("fragment task dropped")));
        outcomes.insert(position, outcome);
    }

    outcomes
}

fn push_fragment_preloads(preload: &mut Vec<String>, outcome: &FragmentOutcome, request_host: &str) {
    for uri in &outcome.style_refs {
        preload.push(preload_directive(uri, AssetKind::Style, false));
    }
    for uri in &outcome.script_refs {
        preload.push(preload_directive(uri, AssetKind::Script, cross_origin(uri, request_host)));
    }
}

/// Writes the page out in template document order and returns the byte
/// count. Sends block when the client reads slowly, which in turn stalls the
/// fragment tasks at their bounded region channels; a dropped receiver stops
/// the driver. A mid-body failure of the primary fragment aborts the page
/// (the head is long gone, truncation is all that is left); any other
/// fragment's mid-body failure truncates only its own region.
async fn drive(pieces: Vec<Piece>, tags: Arc<dyn TagHandler>, request: Arc<Parts>, sender: BodySender) -> u64 {
    let mut total = 0u64;

    for piece in pieces {
        match piece {
            Piece::Content(bytes) => {
                let len = bytes.len() as u64;
                if sender.send(Ok(bytes)).await.is_err() {
                    return total;
                }
                total += len;
            }
            Piece::Handled(tag) => match tags.handle(request.as_ref(), &tag).await {
                Some(TagOutput::Literal(bytes)) => {
                    let len = bytes.len() as u64;
                    if sender.send(Ok(bytes)).await.is_err() {
                        return total;
                    }
                    total += len;
                }
                Some(TagOutput::Stream(mut output)) => {
                    while let Some(bytes) = output.recv().await {
                        let len = bytes.len() as u64;
                        if sender.send(Ok(bytes)).await.is_err() {
                            return total;
                        }
                        total += len;
                    }
                }
                None => {}
            },
            Piece::Fragment(mut handle) => {
                while let Some(item) = handle.output.recv().await {
                    match item {
                        Ok(bytes) => {
                            let len = bytes.len() as u64;
                            if sender.send(Ok(bytes)).await.is_err() {
                                return total;
                            }
                            total += len;
                        }
                        Err(error) => {
                            if handle.attributes.primary {
                                let _ = sender
                                    .send(Err(ComposeError::stream(format!("primary fragment body failed: {error}"))))
                                    .await;
                                return total;
                            }
                        }
                    }
                }
            }
        }
    }

    total
}

fn error_response(status: StatusCode, message: &str) -> Response<ComposeBody> {
    let mut response = Response::new(ComposeBody::once(Bytes::copy_from_slice(message.as_bytes())));
    *response.status_mut() = status;
    *response.headers_mut() = base_headers();
    response
}

fn inbound_query(request: &Parts) -> Vec<(String, String)> {
    request
        .uri
        .query()
        .map(|query| url::form_urlencoded::parse(query.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}
