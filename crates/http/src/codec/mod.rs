//! Encoding and decoding of HTTP/1.1 messages on the client side.
//!
//! The codec is split the same way the protocol is: [`RequestEncoder`] writes
//! the outbound request head, [`ResponseDecoder`] turns inbound bytes into a
//! head frame followed by streaming payload frames. [`ClientCodec`] glues the
//! two together so a single [`tokio_util::codec::Framed`] can drive a
//! request/response exchange.

mod body;
mod request_encoder;
mod response_decoder;

pub use body::PayloadDecoder;
pub use request_encoder::RequestEncoder;
pub use response_decoder::ResponseDecoder;

use tokio_util::codec::{Decoder, Encoder};

use crate::protocol::{FetchError, Message, PayloadSize, RequestHead, ResponseHead};
use bytes::BytesMut;

/// Combined encoder/decoder for one fragment request/response exchange.
#[derive(Debug, Default)]
pub struct ClientCodec {
    encoder: RequestEncoder,
    decoder: ResponseDecoder,
}

impl ClientCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Encoder<RequestHead> for ClientCodec {
    type Error = FetchError;

    fn encode(&mut self, item: RequestHead, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encoder.encode(item, dst)
    }
}

impl Decoder for ClientCodec {
    type Item = Message<(ResponseHead, PayloadSize)>;
    type Error = FetchError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decoder.decode(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decoder.decode_eof(src)
    }
}
