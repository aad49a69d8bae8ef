//! Streaming server-side HTML fragment composition.
//!
//! A page is described by an HTML template whose `<fragment>` tags point at
//! independent origin services. The [`Composer`] fetches every fragment
//! concurrently and streams the page to the client in template order, so the
//! first byte leaves as soon as the response head is final instead of when
//! the slowest fragment finishes.
//!
//! # Features
//!
//! - Templates parsed with html5ever, memoized, with `<slot>`-based child
//!   template merging and pre-parse ignore regions
//! - Per-fragment timeouts, gzip/deflate decompression, and asset references
//!   (`Link` headers) woven into the page as `<link>`/`<script>` tags
//! - A `primary` fragment controls the page status and `location`;
//!   `return-headers` fragments contribute cookies before the head is sent
//! - Everything deployment specific is injected through the traits in
//!   [`hooks`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use http::request::Parts;
//! use quilt_compose::hooks::TemplateFetcher;
//! use quilt_compose::segment::Segment;
//! use quilt_compose::template::TemplateParser;
//! use quilt_compose::{ComposeConfig, Composer, TemplateError};
//!
//! struct StaticTemplate;
//!
//! #[async_trait]
//! impl TemplateFetcher for StaticTemplate {
//!     async fn fetch(&self, _request: &Parts, parser: &TemplateParser) -> Result<Arc<[Segment]>, TemplateError> {
//!         let template = r#"<!DOCTYPE html>
//!             <html><body>
//!               <fragment id="hello" src="http://localhost:7000"></fragment>
//!             </body></html>"#;
//!         parser.parse(template, None, true).map_err(TemplateError::fetch)
//!     }
//! }
//!
//! # async fn demo() {
//! let composer = Composer::builder(StaticTemplate).config(ComposeConfig::default()).build();
//!
//! let (parts, _) = http::Request::get("http://localhost/").body(()).unwrap().into_parts();
//! let response = composer.handle(parts).await;
//! # let _ = response;
//! # }
//! ```
//!
//! # Limitations
//!
//! - Fragment origins are plain HTTP; TLS termination belongs to the proxy
//!   in front of them
//! - Async fragments render a placeholder comment; their bodies are not
//!   woven into the page yet

pub mod body;
pub mod composer;
pub mod config;
pub mod error;
pub mod event;
pub mod fragment;
mod guard;
pub mod headers;
pub mod hooks;
pub mod link_header;
pub mod segment;
pub mod template;

pub use body::ComposeBody;
pub use composer::{Composer, ComposerBuilder};
pub use config::ComposeConfig;
pub use error::{ComposeError, FragmentError, TemplateError};
