//! The client-facing response body.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};
use tokio::sync::mpsc;

use crate::error::ComposeError;

/// Chunks buffered between the output driver and the client connection. A
/// slow client fills this up and stalls the driver instead of the page
/// accumulating in memory.
pub(crate) const BODY_CHANNEL_CAPACITY: usize = 16;

/// Body of a composed response.
///
/// Error pages and bot-guarded output are a single buffered chunk; regular
/// pages stream chunks from the output driver task as fragments deliver. A
/// mid-stream error surfaces through the body, at which point the head is out
/// and truncation is all the protocol allows.
#[derive(Debug)]
pub struct ComposeBody {
    inner: Kind,
}

#[derive(Debug)]
enum Kind {
    Once(Option<Bytes>),
    Stream(mpsc::Receiver<Result<Bytes, ComposeError>>),
}

/// Sending half handed to the output driver. Dropping it ends the body.
pub type BodySender = mpsc::Sender<Result<Bytes, ComposeError>>;

impl ComposeBody {
    pub fn empty() -> Self {
        Self { inner: Kind::Once(None) }
    }

    pub fn once(bytes: Bytes) -> Self {
        Self { inner: Kind::Once(Some(bytes)) }
    }

    pub fn channel() -> (BodySender, Self) {
        let (tx, rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
        (tx, Self { inner: Kind::Stream(rx) })
    }
}

impl From<String> for ComposeBody {
    fn from(value: String) -> Self {
        Self::once(Bytes::from(value))
    }
}

impl From<&'static str> for ComposeBody {
    fn from(value: &'static str) -> Self {
        if value.is_empty() { Self::empty() } else { Self::once(Bytes::from_static(value.as_bytes())) }
    }
}

impl HttpBody for ComposeBody {
    type Data = Bytes;
    type Error = ComposeError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().inner {
            Kind::Once(option_bytes) => Poll::Ready(option_bytes.take().map(|bytes| Ok(Frame::data(bytes)))),
            Kind::Stream(receiver) => match receiver.poll_recv(cx) {
                Poll::Ready(Some(Ok(bytes))) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.inner {
            Kind::Once(option_bytes) => option_bytes.is_none(),
            Kind::Stream(_) => false,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.inner {
            Kind::Once(None) => SizeHint::with_exact(0),
            Kind::Once(Some(bytes)) => SizeHint::with_exact(bytes.len() as u64),
            Kind::Stream(_) => SizeHint::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    fn check_send<T: Send>() {}

    #[test]
    fn is_send() {
        check_send::<ComposeBody>();
    }

    #[tokio::test]
    async fn once_body_yields_single_chunk() {
        let mut body = ComposeBody::from("Hello world".to_string());

        assert_eq!(body.size_hint().exact(), Some(11));
        assert!(!body.is_end_stream());

        let bytes = body.frame().await.unwrap().unwrap().into_data().unwrap();
        assert_eq!(bytes, Bytes::from("Hello world"));

        assert!(body.is_end_stream());
        assert!(body.frame().await.is_none());
    }

    #[tokio::test]
    async fn empty_body_ends_immediately() {
        let mut body = ComposeBody::from("");
        assert!(body.is_end_stream());
        assert!(body.frame().await.is_none());
    }

    #[tokio::test]
    async fn channel_body_streams_until_sender_drops() {
        let (tx, mut body) = ComposeBody::channel();

        tx.send(Ok(Bytes::from_static(b"<p>"))).await.unwrap();
        tx.send(Ok(Bytes::from_static(b"hi</p>"))).await.unwrap();
        drop(tx);

        assert_eq!(body.frame().await.unwrap().unwrap().into_data().unwrap().as_ref(), b"<p>");
        assert_eq!(body.frame().await.unwrap().unwrap().into_data().unwrap().as_ref(), b"hi</p>");
        assert!(body.frame().await.is_none());
    }

    #[tokio::test]
    async fn channel_body_surfaces_errors() {
        let (tx, mut body) = ComposeBody::channel();
        tx.send(Err(ComposeError::stream("fragment connection reset"))).await.unwrap();
        drop(tx);

        assert!(body.frame().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn channel_body_capacity_is_finite() {
        let (tx, _body) = ComposeBody::channel();

        for _ in 0..BODY_CHANNEL_CAPACITY {
            tx.try_send(Ok(Bytes::from_static(b"chunk"))).unwrap();
        }
        assert!(tx.try_send(Ok(Bytes::from_static(b"chunk"))).is_err());
    }
}
