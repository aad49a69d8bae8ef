//! Streaming HTTP/1.1 client plumbing for fragment fetching
//!
//! This crate provides the outbound half of the composition engine: a small,
//! streaming HTTP/1.1 client built on tokio. Fragment origins are queried with
//! plain `GET` requests and their bodies are surfaced as byte streams so the
//! composition layer can pipe them to the client without buffering whole
//! responses in memory.
//!
//! # Features
//!
//! - Streaming response bodies (content-length, chunked and close-delimited)
//! - Keep-alive connection reuse, pooled per origin
//! - Zero-copy body hand-off through [`bytes::Bytes`]
//! - Clean error handling via [`FetchError`](crate::protocol::FetchError)
//!
//! # Example
//!
//! ```no_run
//! use futures::StreamExt;
//! use quilt_http::client::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new();
//!     let url = url::Url::parse("http://localhost:8080/fragment")?;
//!     let response = client.request(&url, http::HeaderMap::new()).await?;
//!
//!     println!("status: {}", response.head.status);
//!     let mut body = response.body;
//!     while let Some(chunk) = body.next().await {
//!         let chunk = chunk?;
//!         println!("read {} bytes", chunk.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Limitations
//!
//! - HTTP/1.1 only
//! - No TLS support: `https` fragment URLs are rejected, terminate TLS at a
//!   fronting proxy instead
//! - Maximum response header block: 16KB, maximum number of headers: 64

pub mod client;
pub mod codec;
pub mod connection;
pub mod pool;
pub mod protocol;
