use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderValue, Method, StatusCode, Version};
use url::Url;

use crate::protocol::FetchError;

/// A decoded frame of an HTTP/1.1 response stream.
///
/// The response decoder first yields a `Head` frame carrying the parsed status
/// line and headers together with the payload strategy, then zero or more
/// `Payload` frames until [`PayloadItem::Eof`].
#[derive(Debug)]
pub enum Message<T> {
    Head(T),
    Payload(PayloadItem),
}

/// An item of a streamed response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem {
    Chunk(Bytes),
    Eof,
}

impl PayloadItem {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}

/// How the body of a response is delimited on the wire.
///
/// Unlike a server-side decoder, a client must also cope with responses that
/// are delimited by connection close (`UntilClose`), which is legal for
/// HTTP/1.1 responses without `content-length` or `transfer-encoding`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    Length(u64),
    Chunked,
    UntilClose,
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }

    /// A close-delimited body means the connection can never be reused.
    #[inline]
    pub fn reusable(&self) -> bool {
        !matches!(self, PayloadSize::UntilClose)
    }
}

/// The head of an outbound fragment request.
///
/// Fragment requests are always bodyless `GET`s, so the head is the whole
/// message.
#[derive(Debug, Clone)]
pub struct RequestHead {
    method: Method,
    target: String,
    headers: HeaderMap,
}

impl RequestHead {
    /// Builds a `GET` head for `url`, setting the `host` header from the URL
    /// authority unless the caller already provided one.
    pub fn get(url: &Url, mut headers: HeaderMap) -> Result<Self, FetchError> {
        let host = url.host_str().ok_or_else(|| FetchError::invalid_url("missing host"))?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        if !headers.contains_key(HOST) {
            let value = HeaderValue::from_str(&authority)
                .map_err(|_| FetchError::invalid_url("host is not a valid header value"))?;
            headers.insert(HOST, value);
        }

        let mut target = url.path().to_string();
        if let Some(query) = url.query() {
            target.push('?');
            target.push_str(query);
        }

        Ok(Self { method: Method::GET, target, headers })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// The parsed head of a fragment response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
}

impl ResponseHead {
    /// Determines how the body that follows this head is delimited.
    ///
    /// Precedence follows RFC 7230 §3.3.3: status classes without a body,
    /// then `transfer-encoding: chunked`, then `content-length`, finally
    /// close-delimited.
    pub fn payload_size(&self) -> Result<PayloadSize, FetchError> {
        if self.status == StatusCode::NO_CONTENT
            || self.status == StatusCode::NOT_MODIFIED
            || self.status.is_informational()
        {
            return Ok(PayloadSize::Empty);
        }

        if let Some(te) = self.headers.get(TRANSFER_ENCODING) {
            let value = te.to_str().map_err(|_| FetchError::invalid_response("invalid transfer-encoding"))?;
            if value.to_ascii_lowercase().contains("chunked") {
                return Ok(PayloadSize::Chunked);
            }
        }

        if let Some(length) = self.headers.get(CONTENT_LENGTH) {
            let length = length
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .ok_or_else(|| FetchError::invalid_response("invalid content-length"))?;
            return Ok(if length == 0 { PayloadSize::Empty } else { PayloadSize::Length(length) });
        }

        Ok(PayloadSize::UntilClose)
    }

    /// Whether the origin allows this connection to carry another request.
    pub fn keep_alive(&self) -> bool {
        if self.version != Version::HTTP_11 {
            return false;
        }
        match self.headers.get(CONNECTION) {
            Some(value) => !value.to_str().map(|v| v.eq_ignore_ascii_case("close")).unwrap_or(true),
            None => true,
        }
    }
}
