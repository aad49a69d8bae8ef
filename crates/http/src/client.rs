//! The fragment-facing client entry point.

use std::sync::Arc;

use http::HeaderMap;
use tokio::net::TcpStream;
use tracing::debug;
use url::Url;

use crate::connection::{ClientConnection, FragmentResponse};
use crate::pool::{ConnectionPool, Origin};
use crate::protocol::{FetchError, RequestHead};

const DEFAULT_MAX_IDLE_PER_ORIGIN: usize = 32;

/// A cheap-to-clone HTTP/1.1 client sharing one connection pool.
///
/// Every fragment request is an independent `GET`; concurrency comes from the
/// caller issuing many requests at once, each on its own pooled or fresh
/// connection.
#[derive(Debug, Clone)]
pub struct Client {
    pool: Arc<ConnectionPool>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        Self { pool: Arc::new(ConnectionPool::new(DEFAULT_MAX_IDLE_PER_ORIGIN)) }
    }

    pub fn with_pool(pool: ConnectionPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Issues a `GET` request and resolves once the response head arrived.
    ///
    /// The returned body streams; it is the caller's responsibility to drain
    /// or drop it. Deadlines are owned by the caller, typically via
    /// [`tokio::time::timeout`] around this future.
    pub async fn request(&self, url: &Url, headers: HeaderMap) -> Result<FragmentResponse, FetchError> {
        match url.scheme() {
            "http" => {}
            scheme => return Err(FetchError::UnsupportedScheme { scheme: scheme.to_string() }),
        }

        let host = url.host_str().ok_or_else(|| FetchError::invalid_url("missing host"))?;
        let port = url.port_or_known_default().unwrap_or(80);
        let origin = Origin::new(host, port);

        let head = RequestHead::get(url, headers)?;

        let stream = match self.pool.checkout(&origin) {
            Some(stream) => stream,
            None => {
                debug!(host, port, "opening connection");
                TcpStream::connect((host, port)).await.map_err(FetchError::connect)?
            }
        };

        ClientConnection::new(stream, Arc::clone(&self.pool), origin).send(head).await
    }
}
