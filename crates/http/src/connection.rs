//! One request/response exchange over a fragment origin connection.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::{SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::trace;

use crate::codec::ClientCodec;
use crate::pool::{ConnectionPool, Origin};
use crate::protocol::{FetchError, Message, PayloadItem, RequestHead, ResponseHead};

/// A response head plus its streaming body.
#[derive(Debug)]
pub struct FragmentResponse {
    pub head: ResponseHead,
    pub body: RespBody,
}

/// A client connection that drives a single exchange.
///
/// Consumes itself on [`send`](Self::send): the underlying stream moves into
/// the returned [`RespBody`], which hands it back to the pool once the body
/// completed on a reusable connection.
#[derive(Debug)]
pub struct ClientConnection {
    framed: Framed<TcpStream, ClientCodec>,
    pool: Arc<ConnectionPool>,
    origin: Origin,
}

impl ClientConnection {
    pub fn new(stream: TcpStream, pool: Arc<ConnectionPool>, origin: Origin) -> Self {
        Self { framed: Framed::new(stream, ClientCodec::new()), pool, origin }
    }

    /// Writes the request head and reads frames until the response head
    /// arrives. Informational (1xx) responses are skipped.
    pub async fn send(mut self, head: RequestHead) -> Result<FragmentResponse, FetchError> {
        self.framed.send(head).await?;

        loop {
            match self.framed.next().await {
                Some(Ok(Message::Head((head, payload_size)))) => {
                    if head.status.is_informational() {
                        trace!(status = %head.status, "skipping informational response");
                        continue;
                    }
                    let reusable = payload_size.reusable() && head.keep_alive();
                    let body = RespBody { framed: Some(self.framed), pool: self.pool, origin: self.origin, reusable };
                    return Ok(FragmentResponse { head, body });
                }
                // payload frames before the final head can only be the empty
                // payload of a skipped informational response
                Some(Ok(Message::Payload(_))) => continue,
                Some(Err(e)) => return Err(e),
                None => return Err(FetchError::UnexpectedEof),
            }
        }
    }
}

/// Streaming response body.
///
/// Yields decompressed-on-the-wire bytes exactly as the origin sent them; the
/// composition layer is responsible for content decoding. On clean EOF the
/// connection is returned to the pool when the exchange allows reuse.
#[derive(Debug)]
pub struct RespBody {
    framed: Option<Framed<TcpStream, ClientCodec>>,
    pool: Arc<ConnectionPool>,
    origin: Origin,
    reusable: bool,
}

impl RespBody {
    fn release(&mut self) {
        if let Some(framed) = self.framed.take() {
            // leftover buffered bytes would desynchronize the next exchange
            if self.reusable && framed.read_buffer().is_empty() {
                self.pool.checkin(self.origin.clone(), framed.into_inner());
            }
        }
    }
}

impl Stream for RespBody {
    type Item = Result<Bytes, FetchError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        let polled = {
            let Some(framed) = this.framed.as_mut() else {
                return Poll::Ready(None);
            };
            ready!(framed.poll_next_unpin(cx))
        };

        match polled {
            Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => Poll::Ready(Some(Ok(bytes))),
            Some(Ok(Message::Payload(PayloadItem::Eof))) => {
                this.release();
                Poll::Ready(None)
            }
            Some(Ok(Message::Head(_))) => {
                this.framed = None;
                Poll::Ready(Some(Err(FetchError::invalid_response("unexpected head frame inside body"))))
            }
            Some(Err(e)) => {
                this.framed = None;
                Poll::Ready(Some(Err(e)))
            }
            None => {
                this.framed = None;
                Poll::Ready(None)
            }
        }
    }
}
