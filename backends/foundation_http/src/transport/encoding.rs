//! Content-Encoding decoders.
//!
//! WHY: Servers compress bodies and callers want the decoded bytes, while encodings
//! this engine does not know must still reach the caller untouched.
//!
//! WHAT: [`BodyFilter`] decodes a body chunk by chunk. [`ContentEncodings`] maps
//! encoding names to factory functions producing fresh filters.

use std::collections::HashMap;

use crate::errors::HttpResult;

/// Incremental body decoder.
pub trait BodyFilter {
    /// Decodes one chunk, returning whatever output is ready.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Protocol` for corrupt input.
    fn filter(&mut self, chunk: &[u8]) -> HttpResult<Vec<u8>>;

    /// Flushes the decoder after the last chunk.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Protocol` when the input ended early.
    fn finish(&mut self) -> HttpResult<Vec<u8>>;
}

pub type FilterFactory = fn() -> Box<dyn BodyFilter + Send>;

/// Passes data through unchanged.
#[derive(Debug, Default)]
pub struct Identity;

impl BodyFilter for Identity {
    fn filter(&mut self, chunk: &[u8]) -> HttpResult<Vec<u8>> {
        Ok(chunk.to_vec())
    }

    fn finish(&mut self) -> HttpResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

fn identity_filter() -> Box<dyn BodyFilter + Send> {
    Box::new(Identity)
}

#[cfg(feature = "flate2")]
mod flate {
    use std::io::Write;

    use flate2::write::{DeflateDecoder, GzDecoder, ZlibDecoder};

    use super::BodyFilter;
    use crate::errors::{HttpError, HttpResult};

    fn corrupt(encoding: &str, err: &std::io::Error) -> HttpError {
        HttpError::Protocol(format!("Unable to decode {encoding} body: {err}"))
    }

    pub struct Gzip(GzDecoder<Vec<u8>>);

    impl Gzip {
        pub fn new() -> Self {
            Self(GzDecoder::new(Vec::new()))
        }
    }

    impl BodyFilter for Gzip {
        fn filter(&mut self, chunk: &[u8]) -> HttpResult<Vec<u8>> {
            self.0.write_all(chunk).map_err(|err| corrupt("gzip", &err))?;
            Ok(std::mem::take(self.0.get_mut()))
        }

        fn finish(&mut self) -> HttpResult<Vec<u8>> {
            self.0.try_finish().map_err(|err| corrupt("gzip", &err))?;
            Ok(std::mem::take(self.0.get_mut()))
        }
    }

    enum DeflateState {
        /// Not enough bytes yet to tell zlib-wrapped from raw deflate.
        Sniffing(Vec<u8>),
        Zlib(ZlibDecoder<Vec<u8>>),
        Raw(DeflateDecoder<Vec<u8>>),
    }

    /// `deflate` as sent by servers: zlib-wrapped per the RFC, or raw deflate.
    pub struct Deflate(DeflateState);

    impl Deflate {
        pub fn new() -> Self {
            Self(DeflateState::Sniffing(Vec::new()))
        }

        fn is_zlib_header(head: &[u8]) -> bool {
            let cmf = u16::from(head[0]);
            let flg = u16::from(head[1]);
            cmf & 0x0f == 8 && cmf >> 4 <= 7 && ((cmf << 8) | flg) % 31 == 0
        }

        fn write(&mut self, data: &[u8]) -> HttpResult<Vec<u8>> {
            match &mut self.0 {
                DeflateState::Sniffing(pending) => {
                    pending.extend_from_slice(data);
                    if pending.len() < 2 {
                        return Ok(Vec::new());
                    }
                    let head = std::mem::take(pending);
                    self.0 = if Self::is_zlib_header(&head) {
                        DeflateState::Zlib(ZlibDecoder::new(Vec::new()))
                    } else {
                        DeflateState::Raw(DeflateDecoder::new(Vec::new()))
                    };
                    self.write(&head)
                }
                DeflateState::Zlib(decoder) => {
                    decoder.write_all(data).map_err(|err| corrupt("deflate", &err))?;
                    Ok(std::mem::take(decoder.get_mut()))
                }
                DeflateState::Raw(decoder) => {
                    decoder.write_all(data).map_err(|err| corrupt("deflate", &err))?;
                    Ok(std::mem::take(decoder.get_mut()))
                }
            }
        }
    }

    impl BodyFilter for Deflate {
        fn filter(&mut self, chunk: &[u8]) -> HttpResult<Vec<u8>> {
            self.write(chunk)
        }

        fn finish(&mut self) -> HttpResult<Vec<u8>> {
            match &mut self.0 {
                DeflateState::Sniffing(pending) if pending.is_empty() => Ok(Vec::new()),
                DeflateState::Sniffing(_) => Err(HttpError::Protocol(
                    "Unable to decode deflate body: truncated stream".to_string(),
                )),
                DeflateState::Zlib(decoder) => {
                    decoder.try_finish().map_err(|err| corrupt("deflate", &err))?;
                    Ok(std::mem::take(decoder.get_mut()))
                }
                DeflateState::Raw(decoder) => {
                    decoder.try_finish().map_err(|err| corrupt("deflate", &err))?;
                    Ok(std::mem::take(decoder.get_mut()))
                }
            }
        }
    }

    pub fn gzip_filter() -> Box<dyn BodyFilter + Send> {
        Box::new(Gzip::new())
    }

    pub fn deflate_filter() -> Box<dyn BodyFilter + Send> {
        Box::new(Deflate::new())
    }
}

/// Registry of known content encodings.
#[derive(Debug, Clone)]
pub struct ContentEncodings {
    filters: HashMap<String, FilterFactory>,
}

impl Default for ContentEncodings {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ContentEncodings {
    /// An empty registry; `identity` is always understood.
    #[must_use]
    pub fn empty() -> Self {
        let mut encodings = Self {
            filters: HashMap::new(),
        };
        encodings.register("identity", identity_filter);
        encodings
    }

    /// `identity`, plus `gzip`, `x-gzip` and `deflate` when compression is compiled in.
    #[must_use]
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut encodings = Self::empty();
        #[cfg(feature = "flate2")]
        {
            encodings.register("gzip", flate::gzip_filter);
            encodings.register("x-gzip", flate::gzip_filter);
            encodings.register("deflate", flate::deflate_filter);
        }
        encodings
    }

    /// Registers or replaces the factory for `name` (case-insensitive).
    pub fn register(&mut self, name: &str, factory: FilterFactory) {
        self.filters.insert(name.trim().to_ascii_lowercase(), factory);
    }

    #[must_use]
    pub fn is_known(&self, name: &str) -> bool {
        self.filters.contains_key(&name.trim().to_ascii_lowercase())
    }

    /// Builds the decoder chain for a `Content-Encoding` value.
    ///
    /// Codings listed in the header were applied in order, so decoders run in reverse.
    /// Returns `None` when any listed coding is unknown.
    #[must_use]
    pub fn decoder_for(&self, header_value: &str) -> Option<DecoderChain> {
        let mut filters = Vec::new();
        for name in header_value.split(',').rev() {
            let name = name.trim().to_ascii_lowercase();
            if name.is_empty() {
                continue;
            }
            let factory = self.filters.get(&name)?;
            filters.push(factory());
        }
        Some(DecoderChain { filters })
    }
}

/// Decoders applied one after another.
pub struct DecoderChain {
    filters: Vec<Box<dyn BodyFilter + Send>>,
}

impl DecoderChain {
    /// # Errors
    ///
    /// Propagates decoder failures.
    pub fn filter(&mut self, chunk: &[u8]) -> HttpResult<Vec<u8>> {
        let mut data = chunk.to_vec();
        for filter in &mut self.filters {
            data = filter.filter(&data)?;
        }
        Ok(data)
    }

    /// Flushes every decoder, feeding each one's tail through the rest of the chain.
    ///
    /// # Errors
    ///
    /// Propagates decoder failures.
    pub fn finish(&mut self) -> HttpResult<Vec<u8>> {
        let mut carry = Vec::new();
        for filter in &mut self.filters {
            let mut data = if carry.is_empty() {
                Vec::new()
            } else {
                filter.filter(&carry)?
            };
            data.extend(filter.finish()?);
            carry = data;
        }
        Ok(carry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(chain: &mut DecoderChain, input: &[u8], piece: usize) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in input.chunks(piece) {
            out.extend(chain.filter(chunk).unwrap());
        }
        out.extend(chain.finish().unwrap());
        out
    }

    /// WHY: identity must always be available
    /// WHAT: Decodes through an empty registry
    #[test]
    fn test_identity_always_known() {
        let encodings = ContentEncodings::empty();
        assert!(encodings.is_known("Identity"));
        let mut chain = encodings.decoder_for("identity").unwrap();
        assert_eq!(decode_all(&mut chain, b"plain", 2), b"plain".to_vec());
    }

    /// WHY: Unknown codings are passed through by the caller, so the registry must say so
    /// WHAT: Asks for br and a list with an unknown member
    #[test]
    fn test_unknown_encoding_has_no_decoder() {
        let encodings = ContentEncodings::with_defaults();
        assert!(encodings.decoder_for("br").is_none());
        assert!(encodings.decoder_for("identity, br").is_none());
    }

    /// WHY: Callers can add their own codecs
    /// WHAT: Registers an uppercasing filter
    #[test]
    fn test_register_custom_filter() {
        struct Upper;
        impl BodyFilter for Upper {
            fn filter(&mut self, chunk: &[u8]) -> HttpResult<Vec<u8>> {
                Ok(chunk.to_ascii_uppercase())
            }
            fn finish(&mut self) -> HttpResult<Vec<u8>> {
                Ok(Vec::new())
            }
        }
        fn upper() -> Box<dyn BodyFilter + Send> {
            Box::new(Upper)
        }

        let mut encodings = ContentEncodings::empty();
        encodings.register("X-Upper", upper);
        let mut chain = encodings.decoder_for("x-upper").unwrap();
        assert_eq!(decode_all(&mut chain, b"shout", 3), b"SHOUT".to_vec());
    }

    #[cfg(feature = "flate2")]
    mod compressed {
        use super::*;
        use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
        use flate2::Compression;
        use std::io::Write;

        fn text() -> Vec<u8> {
            "the quick brown fox jumps over the lazy dog\n".repeat(50).into_bytes()
        }

        /// WHY: gzip bodies must decode even when split at arbitrary points
        /// WHAT: Compresses text and decodes it in 7 byte pieces
        #[test]
        fn test_gzip_in_small_pieces() {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&text()).unwrap();
            let compressed = encoder.finish().unwrap();

            let encodings = ContentEncodings::with_defaults();
            let mut chain = encodings.decoder_for("GZIP").unwrap();
            assert_eq!(decode_all(&mut chain, &compressed, 7), text());

            let mut chain = encodings.decoder_for("x-gzip").unwrap();
            assert_eq!(decode_all(&mut chain, &compressed, 1), text());
        }

        /// WHY: "deflate" means zlib-wrapped, but raw deflate is common too
        /// WHAT: Decodes both flavours
        #[test]
        fn test_deflate_zlib_and_raw() {
            let encodings = ContentEncodings::with_defaults();

            let mut zlib = ZlibEncoder::new(Vec::new(), Compression::default());
            zlib.write_all(&text()).unwrap();
            let zlib = zlib.finish().unwrap();
            let mut chain = encodings.decoder_for("deflate").unwrap();
            assert_eq!(decode_all(&mut chain, &zlib, 1), text());

            let mut raw = DeflateEncoder::new(Vec::new(), Compression::default());
            raw.write_all(&text()).unwrap();
            let raw = raw.finish().unwrap();
            let mut chain = encodings.decoder_for("deflate").unwrap();
            assert_eq!(decode_all(&mut chain, &raw, 5), text());
        }

        /// WHY: Stacked codings are undone in reverse order
        /// WHAT: gzip then identity
        #[test]
        fn test_chain_of_codings() {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(b"layered").unwrap();
            let compressed = encoder.finish().unwrap();

            let encodings = ContentEncodings::with_defaults();
            let mut chain = encodings.decoder_for("gzip, identity").unwrap();
            assert_eq!(decode_all(&mut chain, &compressed, 4), b"layered".to_vec());
        }

        /// WHY: Garbage labelled gzip is a protocol error, not silent junk
        /// WHAT: Decodes non-gzip bytes as gzip
        #[test]
        fn test_corrupt_gzip_is_protocol_error() {
            let encodings = ContentEncodings::with_defaults();
            let mut chain = encodings.decoder_for("gzip").unwrap();
            let result = chain
                .filter(b"definitely not gzip data at all")
                .and_then(|_| chain.finish());
            assert!(result.unwrap_err().is_protocol());
        }
    }
}
