//! Streaming decompression of fragment bodies.
//!
//! Fragment requests always advertise `accept-encoding: gzip, deflate`, so
//! origins are free to compress; the composed page is assembled from plain
//! bytes.

use std::io::{self, Write};

use bytes::{Bytes, BytesMut};
use flate2::write::{GzDecoder, ZlibDecoder};
use http::HeaderMap;
use http::header::CONTENT_ENCODING;

pub(crate) struct Writer {
    buf: BytesMut,
}

impl Writer {
    fn new() -> Self {
        Self { buf: BytesMut::with_capacity(4096) }
    }

    fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Write-side decoder selected from the response's `content-encoding`.
pub(crate) enum Decompressor {
    Identity,
    Gzip(GzDecoder<Writer>),
    Deflate(ZlibDecoder<Writer>),
}

impl Decompressor {
    pub(crate) fn from_headers(headers: &HeaderMap) -> Self {
        let encoding = headers.get(CONTENT_ENCODING).and_then(|value| value.to_str().ok()).unwrap_or("");
        match encoding.trim() {
            "gzip" => Self::Gzip(GzDecoder::new(Writer::new())),
            "deflate" => Self::Deflate(ZlibDecoder::new(Writer::new())),
            _ => Self::Identity,
        }
    }

    /// Feeds one wire chunk and returns whatever decoded output is ready.
    pub(crate) fn decode(&mut self, chunk: &[u8]) -> io::Result<Bytes> {
        match self {
            Self::Identity => Ok(Bytes::copy_from_slice(chunk)),
            Self::Gzip(decoder) => {
                decoder.write_all(chunk)?;
                Ok(decoder.get_mut().take())
            }
            Self::Deflate(decoder) => {
                decoder.write_all(chunk)?;
                Ok(decoder.get_mut().take())
            }
        }
    }

    /// Flushes the tail the decoder may still be holding.
    pub(crate) fn finish(self) -> io::Result<Bytes> {
        match self {
            Self::Identity => Ok(Bytes::new()),
            Self::Gzip(decoder) => Ok(decoder.finish()?.buf.freeze()),
            Self::Deflate(decoder) => Ok(decoder.finish()?.buf.freeze()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::{GzEncoder, ZlibEncoder};
    use http::HeaderValue;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn headers(encoding: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static(encoding));
        headers
    }

    #[test]
    fn identity_passes_through() {
        let mut decompressor = Decompressor::from_headers(&HeaderMap::new());
        assert_eq!(decompressor.decode(b"plain").unwrap(), Bytes::from_static(b"plain"));
        assert!(decompressor.finish().unwrap().is_empty());
    }

    #[test]
    fn gzip_round_trip_in_chunks() {
        let compressed = gzip(b"hello fragment body");
        let mut decompressor = Decompressor::from_headers(&headers("gzip"));

        let mut out = BytesMut::new();
        for chunk in compressed.chunks(5) {
            out.extend_from_slice(&decompressor.decode(chunk).unwrap());
        }
        out.extend_from_slice(&decompressor.finish().unwrap());

        assert_eq!(&out[..], b"hello fragment body");
    }

    #[test]
    fn deflate_round_trip() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"deflated").unwrap();
        let compressed = encoder.finish().unwrap();

        let mut decompressor = Decompressor::from_headers(&headers("deflate"));
        let mut out = BytesMut::new();
        out.extend_from_slice(&decompressor.decode(&compressed).unwrap());
        out.extend_from_slice(&decompressor.finish().unwrap());

        assert_eq!(&out[..], b"deflated");
    }
}
