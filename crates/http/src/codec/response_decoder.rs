use bytes::{Buf, BytesMut};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode, Version};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::PayloadDecoder;
use crate::protocol::{FetchError, Message, PayloadItem, PayloadSize, ResponseHead};

const MAX_HEADER_BYTES: usize = 16 * 1024;
const MAX_HEADER_NUM: usize = 64;

/// Decodes an HTTP/1.1 response into a head frame followed by payload frames.
///
/// # State Machine
///
/// The decoder state lives in the `payload` field:
/// - `None`: parsing the status line and header block
/// - `Some(PayloadDecoder)`: streaming the body
///
/// When the payload reports EOF the decoder resets to header parsing so a
/// keep-alive connection can decode the next response.
#[derive(Debug, Default)]
pub struct ResponseDecoder {
    payload: Option<PayloadDecoder>,
}

impl ResponseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_head(&mut self, src: &mut BytesMut) -> Result<Option<(ResponseHead, PayloadSize)>, FetchError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut parsed = httparse::Response::new(&mut headers);

        let consumed = match parsed.parse(&src[..]) {
            Ok(httparse::Status::Complete(len)) => len,
            Ok(httparse::Status::Partial) => {
                if src.len() > MAX_HEADER_BYTES {
                    return Err(FetchError::TooLargeHeader { max_size: MAX_HEADER_BYTES });
                }
                return Ok(None);
            }
            Err(e) => return Err(FetchError::invalid_response(e)),
        };

        let status = StatusCode::from_u16(parsed.code.ok_or_else(|| FetchError::invalid_response("missing status"))?)
            .map_err(|_| FetchError::invalid_response("invalid status code"))?;
        let version = match parsed.version {
            Some(0) => Version::HTTP_10,
            Some(1) => Version::HTTP_11,
            other => return Err(FetchError::invalid_response(format!("invalid http version: {other:?}"))),
        };

        let mut header_map = HeaderMap::with_capacity(parsed.headers.len());
        for header in parsed.headers.iter() {
            let name = HeaderName::from_bytes(header.name.as_bytes())
                .map_err(|_| FetchError::invalid_response("invalid header name"))?;
            let value = HeaderValue::from_bytes(header.value)
                .map_err(|_| FetchError::invalid_response("invalid header value"))?;
            header_map.append(name, value);
        }

        src.advance(consumed);

        let head = ResponseHead { status, version, headers: header_map };
        let payload_size = head.payload_size()?;
        trace!(status = %head.status, ?payload_size, "decoded response head");
        Ok(Some((head, payload_size)))
    }
}

impl Decoder for ResponseDecoder {
    type Item = Message<(ResponseHead, PayloadSize)>;
    type Error = FetchError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload) = &mut self.payload {
            let message = match payload.decode(src)? {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item @ PayloadItem::Eof) => {
                    // ready for the next response on this connection
                    self.payload.take();
                    Some(Message::Payload(item))
                }
                None => None,
            };
            return Ok(message);
        }

        match self.decode_head(src)? {
            Some((head, payload_size)) => {
                self.payload = Some(payload_size.into());
                Ok(Some(Message::Head((head, payload_size))))
            }
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.payload {
            Some(payload) => {
                let message = match payload.decode_eof(src)? {
                    Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                    Some(item @ PayloadItem::Eof) => {
                        self.payload.take();
                        Some(Message::Payload(item))
                    }
                    None => None,
                };
                Ok(message)
            }
            // connection closed between responses
            None if src.is_empty() => Ok(None),
            None => Err(FetchError::UnexpectedEof),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_message(decoder: &mut ResponseDecoder, src: &mut BytesMut) -> Message<(ResponseHead, PayloadSize)> {
        decoder.decode(src).unwrap().expect("expected a decoded frame")
    }

    #[test]
    fn decodes_head_and_length_body() {
        let mut decoder = ResponseDecoder::new();
        let mut src = BytesMut::from(&b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\nx-test: yes\r\n\r\nhello"[..]);

        let Message::Head((head, payload_size)) = decode_message(&mut decoder, &mut src) else {
            panic!("expected head frame");
        };
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(head.headers.get("x-test").unwrap(), "yes");
        assert_eq!(payload_size, PayloadSize::Length(5));

        let Message::Payload(PayloadItem::Chunk(bytes)) = decode_message(&mut decoder, &mut src) else {
            panic!("expected body chunk");
        };
        assert_eq!(&bytes[..], b"hello");

        let Message::Payload(PayloadItem::Eof) = decode_message(&mut decoder, &mut src) else {
            panic!("expected eof");
        };
    }

    #[test]
    fn partial_head_waits_for_more_data() {
        let mut decoder = ResponseDecoder::new();
        let mut src = BytesMut::from(&b"HTTP/1.1 200 OK\r\ncontent-"[..]);
        assert!(decoder.decode(&mut src).unwrap().is_none());

        src.extend_from_slice(b"length: 0\r\n\r\n");
        let Message::Head((head, payload_size)) = decode_message(&mut decoder, &mut src) else {
            panic!("expected head frame");
        };
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(payload_size, PayloadSize::Empty);
    }

    #[test]
    fn resets_after_eof_for_keep_alive() {
        let mut decoder = ResponseDecoder::new();
        let raw = b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nab";
        let mut src = BytesMut::from(&raw[..]);
        src.extend_from_slice(raw);

        for _ in 0..2 {
            assert!(matches!(decode_message(&mut decoder, &mut src), Message::Head(_)));
            assert!(matches!(decode_message(&mut decoder, &mut src), Message::Payload(PayloadItem::Chunk(_))));
            assert!(matches!(decode_message(&mut decoder, &mut src), Message::Payload(PayloadItem::Eof)));
        }
    }

    #[test]
    fn eof_between_responses_ends_the_stream() {
        let mut decoder = ResponseDecoder::new();
        let mut src = BytesMut::new();
        assert!(decoder.decode_eof(&mut src).unwrap().is_none());
    }
}
