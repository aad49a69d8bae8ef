//! Streaming decoders for the three response body delimitations.
//!
//! A [`PayloadDecoder`] is created from the [`PayloadSize`] announced by the
//! response head and yields [`PayloadItem`]s until the body ends. Bodies are
//! never accumulated: every call surfaces at most the bytes currently
//! buffered.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::{FetchError, PayloadItem, PayloadSize};

/// Longest accepted chunk-size line, including extensions.
const MAX_CHUNK_LINE: usize = 4 * 1024;

/// Decodes a response payload according to its announced delimitation.
#[derive(Debug)]
pub enum PayloadDecoder {
    Length { remaining: u64 },
    Chunked(ChunkedState),
    UntilClose { finished: bool },
    Empty,
}

impl From<PayloadSize> for PayloadDecoder {
    fn from(size: PayloadSize) -> Self {
        match size {
            PayloadSize::Length(length) => Self::Length { remaining: length },
            PayloadSize::Chunked => Self::Chunked(ChunkedState::Size),
            PayloadSize::UntilClose => Self::UntilClose { finished: false },
            PayloadSize::Empty => Self::Empty,
        }
    }
}

impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = FetchError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self {
            Self::Length { remaining } => {
                if *remaining == 0 {
                    return Ok(Some(PayloadItem::Eof));
                }
                if src.is_empty() {
                    return Ok(None);
                }
                let len = std::cmp::min(*remaining, src.len() as u64) as usize;
                *remaining -= len as u64;
                Ok(Some(PayloadItem::Chunk(src.split_to(len).freeze())))
            }

            Self::Chunked(state) => state.decode(src),

            Self::UntilClose { finished } => {
                if *finished {
                    return Ok(Some(PayloadItem::Eof));
                }
                if src.is_empty() {
                    return Ok(None);
                }
                Ok(Some(PayloadItem::Chunk(src.split().freeze())))
            }

            Self::Empty => Ok(Some(PayloadItem::Eof)),
        }
    }

    /// Handles the remote closing the connection.
    ///
    /// For a close-delimited body that is the regular end of the message; for
    /// length or chunked bodies that are not complete yet it is an error.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self {
            Self::UntilClose { finished } => {
                if !src.is_empty() {
                    return Ok(Some(PayloadItem::Chunk(src.split().freeze())));
                }
                *finished = true;
                Ok(Some(PayloadItem::Eof))
            }
            Self::Length { remaining: 0 } | Self::Chunked(ChunkedState::Done) | Self::Empty => {
                Ok(Some(PayloadItem::Eof))
            }
            _ => Err(FetchError::UnexpectedEof),
        }
    }
}

/// State machine for `transfer-encoding: chunked` bodies.
///
/// Each chunk is a hex size line, the data, and a trailing CRLF; a zero-size
/// chunk introduces optional trailers terminated by an empty line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkedState {
    /// Expecting a chunk-size line.
    Size,
    /// Reading chunk data, with the number of body bytes still owed.
    Data(u64),
    /// Expecting the CRLF that closes a data chunk.
    DataEnd,
    /// Skipping trailer lines after the zero-size chunk.
    Trailers,
    /// The final chunk and trailers have been consumed.
    Done,
}

impl ChunkedState {
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<PayloadItem>, FetchError> {
        loop {
            match *self {
                Self::Size => {
                    let Some(line) = take_line(src)? else { return Ok(None) };
                    let size = parse_chunk_size(&line)?;
                    trace!(size, "chunk size line");
                    *self = if size == 0 { Self::Trailers } else { Self::Data(size) };
                }

                Self::Data(remaining) => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let len = std::cmp::min(remaining, src.len() as u64) as usize;
                    let bytes = src.split_to(len).freeze();
                    let left = remaining - len as u64;
                    *self = if left == 0 { Self::DataEnd } else { Self::Data(left) };
                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }

                Self::DataEnd => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    if &src[..2] != b"\r\n" {
                        return Err(FetchError::invalid_response("chunk data not closed by CRLF"));
                    }
                    src.advance(2);
                    *self = Self::Size;
                }

                Self::Trailers => {
                    let Some(line) = take_line(src)? else { return Ok(None) };
                    if line.is_empty() {
                        *self = Self::Done;
                        return Ok(Some(PayloadItem::Eof));
                    }
                }

                Self::Done => return Ok(Some(PayloadItem::Eof)),
            }
        }
    }
}

/// Splits one CRLF-terminated line off `src`, without the terminator.
fn take_line(src: &mut BytesMut) -> Result<Option<BytesMut>, FetchError> {
    match src.iter().position(|&b| b == b'\n') {
        Some(nl) => {
            let mut line = src.split_to(nl + 1);
            line.truncate(nl);
            if line.last() == Some(&b'\r') {
                let len = line.len();
                line.truncate(len - 1);
            }
            Ok(Some(line))
        }
        None if src.len() > MAX_CHUNK_LINE => Err(FetchError::invalid_response("chunk size line too long")),
        None => Ok(None),
    }
}

/// Parses the hex chunk size, ignoring any `;`-separated chunk extensions.
fn parse_chunk_size(line: &[u8]) -> Result<u64, FetchError> {
    let digits = match line.iter().position(|&b| b == b';') {
        Some(pos) => &line[..pos],
        None => line,
    };
    let digits = std::str::from_utf8(digits)
        .map_err(|_| FetchError::invalid_response("invalid chunk size line"))?
        .trim();
    if digits.is_empty() {
        return Err(FetchError::invalid_response("empty chunk size line"));
    }
    u64::from_str_radix(digits, 16).map_err(|_| FetchError::invalid_response("invalid chunk size"))
}
