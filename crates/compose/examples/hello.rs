//! Composes a two-fragment page from local origins and prints it.
//!
//! Run with `RUST_LOG=debug` to watch the lifecycle events.

use std::sync::Arc;

use async_trait::async_trait;
use http::request::Parts;
use http_body_util::BodyExt;
use quilt_compose::hooks::TemplateFetcher;
use quilt_compose::segment::Segment;
use quilt_compose::template::TemplateParser;
use quilt_compose::{ComposeConfig, Composer, TemplateError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

struct PageTemplate {
    hello: String,
    world: String,
}

#[async_trait]
impl TemplateFetcher for PageTemplate {
    async fn fetch(&self, _request: &Parts, parser: &TemplateParser) -> Result<Arc<[Segment]>, TemplateError> {
        let template = format!(
            "<!DOCTYPE html><html><head><title>quilt</title></head><body>\
             <fragment id=\"hello\" src=\"{}\"></fragment>\
             <fragment id=\"world\" src=\"{}\"></fragment>\
             </body></html>",
            self.hello, self.world
        );
        parser.parse(&template, None, true).map_err(TemplateError::fetch)
    }
}

async fn origin(body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { break };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nconnection: close\r\ncontent-length: {}\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
            });
        }
    });

    format!("http://{addr}")
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let hello = origin("<p>hello</p>").await;
    let world = origin("<p>world</p>").await;

    let composer = Composer::builder(PageTemplate { hello, world }).config(ComposeConfig::default()).build();

    let (parts, _) =
        http::Request::get("http://localhost/").header("host", "localhost").body(()).unwrap().into_parts();
    let response = composer.handle(parts).await;

    println!("status: {}", response.status());
    let body = response.into_body().collect().await.unwrap().to_bytes();
    println!("{}", String::from_utf8_lossy(&body));
}
