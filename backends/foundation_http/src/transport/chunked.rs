//! `Transfer-Encoding: chunked` decoding.

use std::io::{BufRead, Read};

use crate::errors::{HttpError, HttpResult};
use crate::headers::Headers;

use super::connection::read_line;

/// Largest slice handed out per call, whatever the chunk size on the wire.
const MAX_SLICE: usize = 8192;

/// Pulls decoded data out of a chunked body.
///
/// `next_chunk` yields data until the zero-size chunk, then reads the trailers and
/// returns `None`.
pub struct ChunkedDecoder<'a, B: BufRead> {
    reader: &'a mut B,
    max_line_length: usize,
    remaining_in_chunk: u64,
    trailers: Headers,
    done: bool,
}

impl<'a, B: BufRead> ChunkedDecoder<'a, B> {
    pub fn new(reader: &'a mut B, max_line_length: usize) -> Self {
        Self {
            reader,
            max_line_length,
            remaining_in_chunk: 0,
            trailers: Headers::new(),
            done: false,
        }
    }

    /// Trailer fields, available once `next_chunk` returned `None`.
    #[must_use]
    pub fn trailers(&self) -> &Headers {
        &self.trailers
    }

    /// # Errors
    ///
    /// `HttpError::Protocol` for bad sizes or missing CRLF after chunk data;
    /// `HttpError::Connection` when the stream ends inside the body.
    pub fn next_chunk(&mut self) -> HttpResult<Option<Vec<u8>>> {
        if self.done {
            return Ok(None);
        }

        if self.remaining_in_chunk == 0 {
            let size = self.read_chunk_size()?;
            if size == 0 {
                self.read_trailers()?;
                self.done = true;
                return Ok(None);
            }
            self.remaining_in_chunk = size;
        }

        let wanted = self
            .remaining_in_chunk
            .min(MAX_SLICE as u64);
        let mut data = Vec::new();
        let read = (&mut *self.reader).take(wanted).read_to_end(&mut data)?;
        if (read as u64) < wanted {
            return Err(HttpError::Connection(format!(
                "Unexpected end of file, still expecting {} bytes of chunk data",
                self.remaining_in_chunk - read as u64
            )));
        }
        self.remaining_in_chunk -= wanted;

        if self.remaining_in_chunk == 0 {
            match self.read_line()? {
                Some(line) if line.is_empty() => {}
                _ => {
                    return Err(HttpError::Protocol(
                        "Chunk data is not followed by CRLF".to_string(),
                    ))
                }
            }
        }

        Ok(Some(data))
    }

    fn read_line(&mut self) -> HttpResult<Option<String>> {
        read_line(&mut *self.reader, self.max_line_length)
    }

    fn read_chunk_size(&mut self) -> HttpResult<u64> {
        let line = self.read_line()?.ok_or_else(|| {
            HttpError::Connection("Unexpected end of file while reading chunk size".to_string())
        })?;
        parse_chunk_size(&line)
    }

    fn read_trailers(&mut self) -> HttpResult<()> {
        loop {
            match self.read_line()? {
                None => return Ok(()),
                Some(line) if line.is_empty() => return Ok(()),
                Some(line) => self.trailers.push_line(&line)?,
            }
        }
    }
}

/// Parses `<hex-size>[;ext]`, ignoring surrounding whitespace.
///
/// # Errors
///
/// `HttpError::Protocol` when the size is missing, not hex or too large.
pub fn parse_chunk_size(line: &str) -> HttpResult<u64> {
    let token = line
        .split([';', ' ', '\t'])
        .find(|part| !part.is_empty())
        .unwrap_or_default();

    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(HttpError::Protocol(format!(
            "Unexpected chunk size value in response: '{line}'"
        )));
    }

    u64::from_str_radix(token, 16).map_err(|_| {
        HttpError::Protocol(format!("Chunk size out of range in response: '{line}'"))
    })
}

/// Decodes a whole chunked body held in memory.
///
/// # Errors
///
/// See [`ChunkedDecoder::next_chunk`].
pub fn decode_chunked(raw: &[u8]) -> HttpResult<Vec<u8>> {
    let mut cursor = std::io::Cursor::new(raw);
    let mut decoder = ChunkedDecoder::new(&mut cursor, 8192);
    let mut body = Vec::new();
    while let Some(chunk) = decoder.next_chunk()? {
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Frames one chunk for sending.
#[must_use]
pub fn encode_chunk(data: &[u8]) -> Vec<u8> {
    let mut framed = format!("{:x}\r\n", data.len()).into_bytes();
    framed.extend_from_slice(data);
    framed.extend_from_slice(b"\r\n");
    framed
}

/// The terminating zero-size chunk.
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// WHY: The canonical example must decode
    /// WHAT: Decodes a single chunk body
    #[test]
    fn test_decode_hello() {
        assert_eq!(decode_chunked(b"5\r\nhello\r\n0\r\n\r\n").unwrap(), b"hello".to_vec());
    }

    /// WHY: Extensions, uppercase hex and several chunks all occur in the wild
    /// WHAT: Decodes a multi-chunk body with an extension
    #[test]
    fn test_decode_multiple_chunks_with_extension() {
        let body = decode_chunked(b"4;name=value\r\nWiki\r\n5\r\npedia\r\nE\r\n in\r\n\r\nchunks.\r\n0\r\n\r\n")
            .unwrap();
        assert_eq!(body, b"Wikipedia in\r\n\r\nchunks.".to_vec());
    }

    /// WHY: Trailers follow the last chunk and must be consumed
    /// WHAT: Decodes a body with a trailer and checks the remaining input is untouched
    #[test]
    fn test_trailers_are_read() {
        let mut cursor = Cursor::new(b"3\r\nabc\r\n0\r\nX-Checksum: 42\r\n\r\nNEXT".to_vec());
        let mut decoder = ChunkedDecoder::new(&mut cursor, 1024);
        assert_eq!(decoder.next_chunk().unwrap(), Some(b"abc".to_vec()));
        assert_eq!(decoder.next_chunk().unwrap(), None);
        assert_eq!(decoder.trailers().get("x-checksum"), Some("42"));

        let mut rest = String::new();
        cursor.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "NEXT");
    }

    /// WHY: Non-hex sizes are protocol violations
    /// WHAT: Decodes bodies with bad sizes
    #[test]
    fn test_bad_chunk_size() {
        assert!(decode_chunked(b"zz\r\nhello\r\n0\r\n\r\n").unwrap_err().is_protocol());
        assert!(decode_chunked(b"\r\n").unwrap_err().is_protocol());
        assert!(decode_chunked(b"fffffffffffffffffffff\r\n").unwrap_err().is_protocol());
    }

    /// WHY: A truncated body must not look complete
    /// WHAT: Ends the stream in the middle of a chunk
    #[test]
    fn test_truncated_chunk_is_connection_error() {
        assert!(decode_chunked(b"a\r\nhello").unwrap_err().is_connection());
        assert!(decode_chunked(b"5\r\nhello\r\n").unwrap_err().is_connection());
    }

    /// WHY: Chunk data must end with CRLF
    /// WHAT: Decodes data followed by garbage
    #[test]
    fn test_missing_crlf_after_data() {
        assert!(decode_chunked(b"5\r\nhelloXX\r\n0\r\n\r\n").unwrap_err().is_protocol());
    }

    /// WHY: Large chunks are handed out in bounded slices
    /// WHAT: Decodes a 20000 byte chunk and counts slices
    #[test]
    fn test_large_chunk_is_sliced() {
        let data = vec![b'x'; 20_000];
        let mut raw = encode_chunk(&data);
        raw.extend_from_slice(LAST_CHUNK);

        let mut cursor = Cursor::new(raw);
        let mut decoder = ChunkedDecoder::new(&mut cursor, 1024);
        let mut slices = 0;
        let mut total = 0;
        while let Some(chunk) = decoder.next_chunk().unwrap() {
            slices += 1;
            total += chunk.len();
        }
        assert_eq!(slices, 3);
        assert_eq!(total, 20_000);
    }
}
