use bytes::{BufMut, BytesMut};
use tokio_util::codec::Encoder;

use crate::protocol::{FetchError, RequestHead};

/// Encodes a bodyless request head as an HTTP/1.1 message.
///
/// Fragment requests never carry a payload, so the encoder only has to write
/// the request line and the header block.
#[derive(Debug, Default)]
pub struct RequestEncoder;

impl Encoder<RequestHead> for RequestEncoder {
    type Error = FetchError;

    fn encode(&mut self, head: RequestHead, dst: &mut BytesMut) -> Result<(), Self::Error> {
        // request line
        dst.reserve(head.target().len() + 16);
        dst.put_slice(head.method().as_str().as_bytes());
        dst.put_u8(b' ');
        dst.put_slice(head.target().as_bytes());
        dst.put_slice(b" HTTP/1.1\r\n");

        for (name, value) in head.headers() {
            dst.reserve(name.as_str().len() + value.len() + 4);
            dst.put_slice(name.as_str().as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }

        dst.put_slice(b"\r\n");
        Ok(())
    }
}
