//! Message bodies.
//!
//! WHY: Bodies can be small strings, large uploads that should not live in memory, or
//! form data assembled on the fly. The transport only needs to pull chunks until the
//! source says it is done, and redirects need to know whether a body can be replayed.
//!
//! WHAT: Three small capability traits ([`ReadEntity`], [`WriteEntity`],
//! [`RewindEntity`]), three entities built on them, and [`Body`] which is what a
//! `Request` actually carries.
//!
//! HOW: End of data is an explicit `Ok(None)` from [`ReadEntity::read_chunk`]. Rewinding
//! restarts the sequence from the first chunk.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::errors::{HttpError, HttpResult};

/// Default chunk size used when reading entities.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Default in-memory limit of a [`SmartBuffer`] before it spills to disk (4 MiB).
pub const DEFAULT_MAX_MEMORY: usize = 4 * 1024 * 1024;

pub const FORM_URL_ENCODED: &str = "application/x-www-form-urlencoded";

/// A lazy, finite sequence of byte chunks.
pub trait ReadEntity {
    /// Returns the next chunk, or `None` once the entity is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying source fails.
    fn read_chunk(&mut self) -> HttpResult<Option<Vec<u8>>>;

    /// Total length in bytes, when it is known up front.
    fn size_hint(&self) -> Option<u64> {
        None
    }
}

/// An entity accepting appended bytes.
pub trait WriteEntity {
    /// Appends `data`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying sink fails.
    fn write_chunk(&mut self, data: &[u8]) -> HttpResult<usize>;
}

/// An entity whose chunk sequence can be restarted.
pub trait RewindEntity {
    /// Moves back to the first chunk.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying source cannot seek.
    fn rewind(&mut self) -> HttpResult<()>;
}

/// Readable and rewindable; blanket implemented.
pub trait RewindableEntity: ReadEntity + RewindEntity {}

impl<T: ReadEntity + RewindEntity> RewindableEntity for T {}

/// Drains an entity into one buffer.
///
/// # Errors
///
/// Propagates the first read failure.
pub fn read_to_end<E: ReadEntity + ?Sized>(entity: &mut E) -> HttpResult<Vec<u8>> {
    let mut out = Vec::new();
    while let Some(chunk) = entity.read_chunk()? {
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}

/// In-memory entity that yields its whole content as a single chunk.
#[derive(Debug, Clone, Default)]
pub struct StringEntity {
    data: Vec<u8>,
    consumed: bool,
}

impl StringEntity {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            consumed: false,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl ReadEntity for StringEntity {
    fn read_chunk(&mut self) -> HttpResult<Option<Vec<u8>>> {
        if self.consumed || self.data.is_empty() {
            self.consumed = true;
            return Ok(None);
        }
        self.consumed = true;
        Ok(Some(self.data.clone()))
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}

impl WriteEntity for StringEntity {
    fn write_chunk(&mut self, data: &[u8]) -> HttpResult<usize> {
        self.data.extend_from_slice(data);
        Ok(data.len())
    }
}

impl RewindEntity for StringEntity {
    fn rewind(&mut self) -> HttpResult<()> {
        self.consumed = false;
        Ok(())
    }
}

/// Buffer that keeps data in memory up to a limit and then moves it to an anonymous
/// temporary file.
#[derive(Debug)]
pub struct SmartBuffer {
    memory: Vec<u8>,
    file: Option<File>,
    max_memory: usize,
    chunk_size: usize,
    length: u64,
    read_position: u64,
}

impl Default for SmartBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SmartBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_MEMORY, DEFAULT_CHUNK_SIZE)
    }

    /// A chunk size of zero is treated as one byte.
    #[must_use]
    pub fn with_limits(max_memory: usize, chunk_size: usize) -> Self {
        Self {
            memory: Vec::new(),
            file: None,
            max_memory,
            chunk_size: chunk_size.max(1),
            length: 0,
            read_position: 0,
        }
    }

    /// True once the content lives in the temporary file.
    #[must_use]
    pub fn is_on_disk(&self) -> bool {
        self.file.is_some()
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.length
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    fn spill(&mut self) -> HttpResult<()> {
        let mut file = tempfile::tempfile().map_err(|err| {
            HttpError::Configuration(format!("unable to create temporary buffer file: {err}"))
        })?;
        file.write_all(&self.memory)?;
        tracing::debug!(
            "SmartBuffer: moved {} bytes from memory to a temporary file",
            self.memory.len()
        );
        self.memory = Vec::new();
        self.file = Some(file);
        Ok(())
    }
}

impl WriteEntity for SmartBuffer {
    fn write_chunk(&mut self, data: &[u8]) -> HttpResult<usize> {
        if self.file.is_none() && self.memory.len() + data.len() > self.max_memory {
            self.spill()?;
        }

        match self.file.as_mut() {
            Some(file) => {
                file.seek(SeekFrom::End(0))?;
                file.write_all(data)?;
            }
            None => self.memory.extend_from_slice(data),
        }

        self.length += data.len() as u64;
        Ok(data.len())
    }
}

impl ReadEntity for SmartBuffer {
    fn read_chunk(&mut self) -> HttpResult<Option<Vec<u8>>> {
        if self.read_position >= self.length {
            return Ok(None);
        }

        let chunk = match self.file.as_mut() {
            Some(file) => {
                file.seek(SeekFrom::Start(self.read_position))?;
                let mut buf = vec![0u8; self.chunk_size];
                let read = file.read(&mut buf)?;
                buf.truncate(read);
                buf
            }
            None => {
                let start = usize::try_from(self.read_position).unwrap_or(usize::MAX);
                let end = start.saturating_add(self.chunk_size).min(self.memory.len());
                self.memory[start..end].to_vec()
            }
        };

        if chunk.is_empty() {
            return Ok(None);
        }

        self.read_position += chunk.len() as u64;
        Ok(Some(chunk))
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.length)
    }
}

impl RewindEntity for SmartBuffer {
    fn rewind(&mut self) -> HttpResult<()> {
        self.read_position = 0;
        Ok(())
    }
}

/// Percent-encodes everything except unreserved characters; spaces become `%20`.
#[must_use]
pub fn raw_url_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// `application/x-www-form-urlencoded` body built from ordered fields.
///
/// Yields one `name=value` chunk per field, fields after the first prefixed with `&`.
#[derive(Debug, Clone, Default)]
pub struct UrlEncodedFormData {
    fields: Vec<(String, String)>,
    position: usize,
}

impl UrlEncodedFormData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            position: 0,
        }
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    #[must_use]
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    #[must_use]
    pub fn content_type(&self) -> &'static str {
        FORM_URL_ENCODED
    }

    fn encode_field(&self, index: usize) -> String {
        let (name, value) = &self.fields[index];
        let mut chunk = String::new();
        if index > 0 {
            chunk.push('&');
        }
        chunk.push_str(&raw_url_encode(name));
        chunk.push('=');
        chunk.push_str(&raw_url_encode(value));
        chunk
    }

    /// The full encoded body.
    #[must_use]
    pub fn encoded(&self) -> String {
        (0..self.fields.len())
            .map(|index| self.encode_field(index))
            .collect()
    }
}

impl ReadEntity for UrlEncodedFormData {
    fn read_chunk(&mut self) -> HttpResult<Option<Vec<u8>>> {
        if self.position >= self.fields.len() {
            return Ok(None);
        }
        let chunk = self.encode_field(self.position);
        self.position += 1;
        Ok(Some(chunk.into_bytes()))
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.encoded().len() as u64)
    }
}

impl RewindEntity for UrlEncodedFormData {
    fn rewind(&mut self) -> HttpResult<()> {
        self.position = 0;
        Ok(())
    }
}

/// The body carried by a request.
#[derive(Default)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Vec<u8>),
    /// One-shot source; cannot be replayed on redirect.
    Stream(Box<dyn ReadEntity + Send>),
    Rewindable(Box<dyn RewindableEntity + Send>),
}

impl core::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Body::Empty"),
            Self::Bytes(bytes) => write!(f, "Body::Bytes({} bytes)", bytes.len()),
            Self::Stream(entity) => write!(f, "Body::Stream(size_hint={:?})", entity.size_hint()),
            Self::Rewindable(entity) => {
                write!(f, "Body::Rewindable(size_hint={:?})", entity.size_hint())
            }
        }
    }
}

impl Body {
    pub fn stream<E: ReadEntity + Send + 'static>(entity: E) -> Self {
        Self::Stream(Box::new(entity))
    }

    pub fn rewindable<E: ReadEntity + RewindEntity + Send + 'static>(entity: E) -> Self {
        Self::Rewindable(Box::new(entity))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Bytes(bytes) => bytes.is_empty(),
            Self::Stream(entity) => entity.size_hint() == Some(0),
            Self::Rewindable(entity) => entity.size_hint() == Some(0),
        }
    }

    /// Byte length when known without reading the body.
    #[must_use]
    pub fn known_length(&self) -> Option<u64> {
        match self {
            Self::Empty => Some(0),
            Self::Bytes(bytes) => Some(bytes.len() as u64),
            Self::Stream(entity) => entity.size_hint(),
            Self::Rewindable(entity) => entity.size_hint(),
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Empty => Some(&[]),
            Self::Bytes(bytes) => Some(bytes),
            Self::Stream(_) | Self::Rewindable(_) => None,
        }
    }

    /// Whether the body can be sent again.
    #[must_use]
    pub fn is_replayable(&self) -> bool {
        !matches!(self, Self::Stream(_))
    }

    /// Restarts the body for another send.
    ///
    /// Returns `false` for one-shot streams.
    ///
    /// # Errors
    ///
    /// Propagates rewind failures from the entity.
    pub fn rewind(&mut self) -> HttpResult<bool> {
        match self {
            Self::Empty | Self::Bytes(_) => Ok(true),
            Self::Rewindable(entity) => entity.rewind().map(|()| true),
            Self::Stream(_) => Ok(false),
        }
    }

    /// Reads the whole body into memory.
    ///
    /// # Errors
    ///
    /// Propagates entity read failures.
    pub fn read_all(&mut self) -> HttpResult<Vec<u8>> {
        match self {
            Self::Empty => Ok(Vec::new()),
            Self::Bytes(bytes) => Ok(bytes.clone()),
            Self::Stream(entity) => read_to_end(entity.as_mut()),
            Self::Rewindable(entity) => read_to_end(entity.as_mut()),
        }
    }

    /// Reads the next chunk for the wire. `Bytes` are yielded by the caller directly.
    pub(crate) fn next_chunk(&mut self) -> HttpResult<Option<Vec<u8>>> {
        match self {
            Self::Empty | Self::Bytes(_) => Ok(None),
            Self::Stream(entity) => entity.read_chunk(),
            Self::Rewindable(entity) => entity.read_chunk(),
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        if bytes.is_empty() {
            Self::Empty
        } else {
            Self::Bytes(bytes)
        }
    }
}

impl From<&[u8]> for Body {
    fn from(bytes: &[u8]) -> Self {
        Self::from(bytes.to_vec())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::from(text.into_bytes())
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Self::from(text.as_bytes().to_vec())
    }
}
