//! Blocking HTTP/1.x socket transport.
//!
//! WHY: Every request ends up as bytes on a TCP (or TLS) stream, and the reply has to be
//! framed back into a `Response` whatever mix of chunking, compression and connection
//! reuse the server picked.
//!
//! WHAT: [`Socket`] implements [`Transport`]: it prepares the request headers, connects
//! or reuses a connection, writes the request, reads the status line, headers and body,
//! and decides whether the connection survives.
//!
//! HOW: One exchange walks `Idle -> Connecting -> Sending -> ReadingStatusLine ->
//! ReadingHeaders -> ReadingBody` and ends in `Idle` (connection kept) or `Closed`.
//! Any error closes the connection.

use std::io::Read;

use crate::entity::Body;
use crate::errors::{HttpError, HttpResult};
use crate::headers::{self, Headers};
use crate::message::{parse_status_line, Method, Request, Response, Version};

use super::chunked::{encode_chunk, ChunkedDecoder, LAST_CHUNK};
use super::connection::{connect_tcp, Connection, HttpStream, Remote};
use super::dns::{DnsResolver, SystemDnsResolver};
use super::encoding::{ContentEncodings, FilterFactory};
use super::options::SocketOptions;
use super::Transport;

#[cfg(feature = "ssl-rustls")]
use super::tls::RustlsConnector;

/// Longest status or header line accepted.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 16 * 1024;

/// Most header lines accepted in one response.
pub const MAX_HEADER_LINES: usize = 256;

const READ_BUFFER: usize = 8192;

/// Where the socket is in the current exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Idle,
    Connecting,
    Sending,
    ReadingStatusLine,
    ReadingHeaders,
    ReadingBody,
    Closed,
}

/// How the response body is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyFraming {
    None,
    Chunked,
    Length(u64),
    UntilClose,
}

/// Socket transport over plain TCP or TLS, with keep-alive reuse.
#[derive(Debug)]
pub struct Socket<R: DnsResolver = SystemDnsResolver> {
    options: SocketOptions,
    resolver: R,
    encodings: ContentEncodings,
    connection: Option<Connection>,
    state: SocketState,
    max_line_length: usize,
    #[cfg(feature = "ssl-rustls")]
    tls: Option<RustlsConnector>,
}

impl Default for Socket<SystemDnsResolver> {
    fn default() -> Self {
        Self::new()
    }
}

impl Socket<SystemDnsResolver> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(SocketOptions::default())
    }

    #[must_use]
    pub fn with_options(options: SocketOptions) -> Self {
        Self::with_resolver(options, SystemDnsResolver::new())
    }
}

impl<R: DnsResolver> Socket<R> {
    pub fn with_resolver(options: SocketOptions, resolver: R) -> Self {
        Self {
            options,
            resolver,
            encodings: ContentEncodings::with_defaults(),
            connection: None,
            state: SocketState::Idle,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            #[cfg(feature = "ssl-rustls")]
            tls: None,
        }
    }

    #[must_use]
    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length.max(64);
        self
    }

    pub fn options(&self) -> &SocketOptions {
        &self.options
    }

    /// Replaces the options. The open connection and TLS setup are dropped.
    pub fn set_options(&mut self, options: SocketOptions) {
        self.disconnect();
        self.options = options;
        #[cfg(feature = "ssl-rustls")]
        {
            self.tls = None;
        }
    }

    pub fn encodings_mut(&mut self) -> &mut ContentEncodings {
        &mut self.encodings
    }

    /// Adds a content decoder under `name`.
    pub fn register_encoding(&mut self, name: &str, factory: FilterFactory) {
        self.encodings.register(name, factory);
    }

    pub fn state(&self) -> SocketState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// `host:port` of the open connection.
    pub fn connected_to(&self) -> Option<String> {
        self.connection.as_ref().map(|c| c.remote().to_string())
    }

    /// Closes the open connection, if any.
    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            tracing::debug!("Closing socket to {}", connection.remote());
            connection.shutdown();
            self.state = SocketState::Closed;
        }
    }

    /// Sets `Connection`, `Host` and body framing headers.
    ///
    /// # Errors
    ///
    /// Fails only if buffering an HTTP/1.0 stream body fails.
    pub fn prepare(&self, request: &mut Request) -> HttpResult<()> {
        let connection = if self.options.keep_alive {
            "keep-alive"
        } else {
            "close"
        };
        request.headers_mut().set(headers::CONNECTION, connection)?;

        if !request.headers().has(headers::HOST) {
            let host = host_header(request);
            request.headers_mut().set(headers::HOST, host)?;
        }

        if request.headers().has(headers::CONTENT_LENGTH)
            || request.headers().has(headers::TRANSFER_ENCODING)
        {
            return Ok(());
        }

        match request.body().known_length() {
            Some(0) => {
                if matches!(request.method(), Method::Post | Method::Put) {
                    request.headers_mut().set(headers::CONTENT_LENGTH, "0")?;
                }
            }
            Some(length) => {
                request
                    .headers_mut()
                    .set(headers::CONTENT_LENGTH, length.to_string())?;
            }
            None if request.version() == Version::Http11 => {
                request
                    .headers_mut()
                    .set(headers::TRANSFER_ENCODING, "chunked")?;
            }
            None => {
                let bytes = request.body_mut().read_all()?;
                request
                    .headers_mut()
                    .set(headers::CONTENT_LENGTH, bytes.len().to_string())?;
                request.set_body(bytes);
            }
        }
        Ok(())
    }

    /// Opens a connection to the request's host:port, reusing the current one when it
    /// points at the same remote and is still alive.
    ///
    /// # Errors
    ///
    /// DNS, connect and TLS failures.
    pub fn connect(&mut self, request: &Request) -> HttpResult<()> {
        let remote = remote_for(request)?;

        if let Some(connection) = &self.connection {
            if connection.is_for(&remote) && !connection.is_stale() {
                tracing::debug!("Reusing connection to {remote}");
                return Ok(());
            }
        }
        self.disconnect();

        self.state = SocketState::Connecting;
        tracing::debug!("Connecting to {remote}");
        let tcp = connect_tcp(&remote, &self.resolver, self.options.timeout_duration())?;
        let stream = if remote.secure {
            self.upgrade_to_tls(&remote, tcp)?
        } else {
            HttpStream::Plain(tcp)
        };

        self.connection = Some(Connection::new(stream, remote));
        Ok(())
    }

    #[cfg(feature = "ssl-rustls")]
    fn upgrade_to_tls(&mut self, remote: &Remote, tcp: std::net::TcpStream) -> HttpResult<HttpStream> {
        if self.tls.is_none() {
            self.tls = Some(RustlsConnector::from_options(&self.options.tls)?);
        }
        let connector = self.tls.as_ref().ok_or_else(|| {
            HttpError::Configuration("TLS connector unavailable".to_string())
        })?;
        let stream = connector.handshake(&remote.host, tcp)?;
        Ok(HttpStream::Tls(Box::new(stream)))
    }

    #[cfg(not(feature = "ssl-rustls"))]
    fn upgrade_to_tls(&mut self, remote: &Remote, _tcp: std::net::TcpStream) -> HttpResult<HttpStream> {
        Err(HttpError::Configuration(format!(
            "HTTPS requested for {remote} but no TLS feature enabled"
        )))
    }

    fn connection_mut(&mut self) -> HttpResult<&mut Connection> {
        self.connection
            .as_mut()
            .ok_or_else(|| HttpError::Connection("Trying to use a closed socket".to_string()))
    }

    /// Writes the request line, headers and body.
    fn write_request(&mut self, request: &mut Request) -> HttpResult<()> {
        self.state = SocketState::Sending;

        let head = format!(
            "{} {} HTTP/{}\r\n{}\r\n",
            request.method(),
            request.request_target(),
            request.version().as_str(),
            request.headers().to_wire_string()
        );
        tracing::debug!("{} {}", request.method(), request.uri());

        let chunked = request
            .headers()
            .get(headers::TRANSFER_ENCODING)
            .is_some_and(|value| value.eq_ignore_ascii_case("chunked"));

        let connection = self.connection_mut()?;
        connection.write_all(head.as_bytes())?;

        match request.body_mut() {
            Body::Empty => {
                if chunked {
                    connection.write_all(LAST_CHUNK)?;
                }
            }
            Body::Bytes(bytes) => {
                if chunked {
                    connection.write_all(&encode_chunk(bytes))?;
                    connection.write_all(LAST_CHUNK)?;
                } else {
                    connection.write_all(bytes)?;
                }
            }
            body => {
                while let Some(chunk) = body.next_chunk()? {
                    if chunk.is_empty() {
                        continue;
                    }
                    if chunked {
                        connection.write_all(&encode_chunk(&chunk))?;
                    } else {
                        connection.write_all(&chunk)?;
                    }
                }
                if chunked {
                    connection.write_all(LAST_CHUNK)?;
                }
            }
        }

        connection.flush()
    }

    /// Reads status line and headers, skipping interim 1xx responses.
    fn read_head(&mut self) -> HttpResult<Response> {
        let max_line_length = self.max_line_length;

        loop {
            self.state = SocketState::ReadingStatusLine;
            let status_line = self.connection_mut()?.read_line(max_line_length)?.ok_or_else(|| {
                HttpError::Connection(
                    "Connection closed before a response status line was received".to_string(),
                )
            })?;
            tracing::debug!("Status line: {status_line}");
            let (version, status, reason) = parse_status_line(&status_line)?;

            self.state = SocketState::ReadingHeaders;
            let mut headers = Headers::new();
            let mut lines = 0usize;
            loop {
                let line = self.connection_mut()?.read_line(max_line_length)?.ok_or_else(|| {
                    HttpError::Connection(
                        "Connection closed while reading response headers".to_string(),
                    )
                })?;
                if line.is_empty() {
                    break;
                }
                lines += 1;
                if lines > MAX_HEADER_LINES {
                    return Err(HttpError::Protocol(format!(
                        "Response has more than {MAX_HEADER_LINES} header lines"
                    )));
                }
                tracing::debug!("Header: {line}");
                headers.push_line(&line)?;
            }

            if (100..200).contains(&status) && status != 101 {
                tracing::debug!("Skipping interim {status} response");
                continue;
            }

            return Ok(Response::from_parts(version, status, reason, headers));
        }
    }

    fn body_framing(request: &Request, response: &Response) -> HttpResult<BodyFraming> {
        let status = response.status();
        if request.is_head() || (100..200).contains(&status) || status == 204 || status == 304 {
            return Ok(BodyFraming::None);
        }

        if let Some(encoding) = response.headers().get(headers::TRANSFER_ENCODING) {
            if encoding.trim().eq_ignore_ascii_case("chunked") {
                return Ok(BodyFraming::Chunked);
            }
            return Err(HttpError::Protocol(format!(
                "Unknown content transfer encoding: {encoding}"
            )));
        }

        if let Some(length) = response.headers().get(headers::CONTENT_LENGTH) {
            let length = length.trim().parse::<u64>().map_err(|_| {
                HttpError::Protocol(format!("Invalid Content-Length value: '{length}'"))
            })?;
            return Ok(BodyFraming::Length(length));
        }

        Ok(BodyFraming::UntilClose)
    }

    /// Reads and decodes the body according to its framing.
    fn read_body(&mut self, framing: BodyFraming, response: &mut Response) -> HttpResult<()> {
        self.state = SocketState::ReadingBody;

        let content_encoding = response
            .headers()
            .get(headers::CONTENT_ENCODING)
            .map(str::to_string);
        let mut decoder = match &content_encoding {
            Some(name) => match self.encodings.decoder_for(name) {
                Some(chain) => {
                    response.headers_mut().remove(headers::CONTENT_ENCODING);
                    Some(chain)
                }
                None => {
                    tracing::warn!("Unknown Content-Encoding '{name}', passing body through");
                    None
                }
            },
            None => None,
        };

        let max_line_length = self.max_line_length;
        let mut body = Vec::new();
        let mut push = |chunk: &[u8]| -> HttpResult<()> {
            match decoder.as_mut() {
                Some(chain) => body.extend(chain.filter(chunk)?),
                None => body.extend_from_slice(chunk),
            }
            Ok(())
        };

        let connection = self.connection_mut()?;
        match framing {
            BodyFraming::None => {}
            BodyFraming::Chunked => {
                tracing::debug!("Reading chunked body");
                let mut chunked = ChunkedDecoder::new(connection.reader_mut(), max_line_length);
                while let Some(chunk) = chunked.next_chunk()? {
                    push(&chunk)?;
                }
                for trailer in chunked.trailers() {
                    response
                        .headers_mut()
                        .add(trailer.name(), trailer.value())?;
                }
                response.headers_mut().remove(headers::TRANSFER_ENCODING);
            }
            BodyFraming::Length(length) => {
                tracing::debug!("Reading {length} byte body");
                let mut remaining = length;
                let mut buf = vec![0u8; READ_BUFFER];
                while remaining > 0 {
                    let want = usize::try_from(remaining.min(READ_BUFFER as u64)).unwrap_or(READ_BUFFER);
                    let read = connection.reader_mut().read(&mut buf[..want])?;
                    if read == 0 {
                        return Err(HttpError::Connection(format!(
                            "Unexpected end of file, still expecting {remaining} bytes"
                        )));
                    }
                    push(&buf[..read])?;
                    remaining -= read as u64;
                }
            }
            BodyFraming::UntilClose => {
                tracing::debug!("Reading body until the connection closes");
                let mut buf = vec![0u8; READ_BUFFER];
                loop {
                    let read = connection.reader_mut().read(&mut buf)?;
                    if read == 0 {
                        break;
                    }
                    push(&buf[..read])?;
                }
            }
        }

        if let Some(chain) = decoder.as_mut() {
            body.extend(chain.finish()?);
        }
        response.set_body(body);
        Ok(())
    }

    fn should_close(&self, framing: BodyFraming, response: &Response) -> bool {
        if !self.options.keep_alive || framing == BodyFraming::UntilClose {
            return true;
        }
        let connection_header = response
            .headers()
            .get(headers::CONNECTION)
            .map(str::to_ascii_lowercase);
        match connection_header.as_deref() {
            Some(value) if value.contains("close") => true,
            Some(value) if value.contains("keep-alive") => false,
            _ => response.version() == Version::Http10,
        }
    }

    fn exchange(&mut self, request: &mut Request) -> HttpResult<Response> {
        self.prepare(request)?;
        self.connect(request)?;
        self.write_request(request)?;

        let mut response = self.read_head()?;
        let framing = Self::body_framing(request, &response)?;
        self.read_body(framing, &mut response)?;

        if self.should_close(framing, &response) {
            self.disconnect();
        } else {
            self.state = SocketState::Idle;
        }

        tracing::info!(
            "{} {} -> {} {}",
            request.method(),
            request.uri(),
            response.status(),
            response.reason()
        );
        Ok(response)
    }
}

impl<R: DnsResolver> Transport for Socket<R> {
    fn send(&mut self, request: &mut Request) -> HttpResult<Response> {
        let result = self.exchange(request);
        if let Err(err) = &result {
            tracing::debug!("Exchange with {} failed: {err}", request.uri());
            self.disconnect();
            self.state = SocketState::Closed;
        }
        result
    }

    fn configure(&mut self, options: &SocketOptions) {
        self.set_options(options.clone());
    }
}

impl<R: DnsResolver> Drop for Socket<R> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn remote_for(request: &Request) -> HttpResult<Remote> {
    let uri = request.uri();
    let host = uri
        .host_str()
        .ok_or_else(|| HttpError::InvalidArgument(format!("URI has no host: {uri}")))?;
    let port = uri
        .port_or_known_default()
        .ok_or_else(|| HttpError::InvalidArgument(format!("URI has no port: {uri}")))?;

    Ok(Remote {
        host: host.to_string(),
        port,
        secure: uri.scheme() == "https",
    })
}

/// `host` or `host:port` when the port is not the scheme default.
fn host_header(request: &Request) -> String {
    let uri = request.uri();
    let host = uri.host_str().unwrap_or_default();
    match uri.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::StringEntity;

    /// WHY: Host carries the port only when it is not the default
    /// WHAT: Prepares requests for default and custom ports
    #[test]
    fn test_prepare_sets_host_and_connection() {
        let socket = Socket::new();

        let mut request = Request::get("http://example.com/").unwrap();
        socket.prepare(&mut request).unwrap();
        assert_eq!(request.headers().get("Host"), Some("example.com"));
        assert_eq!(request.headers().get("Connection"), Some("keep-alive"));

        let mut request = Request::get("https://example.com:8443/x").unwrap();
        socket.prepare(&mut request).unwrap();
        assert_eq!(request.headers().get("Host"), Some("example.com:8443"));

        let socket = Socket::with_options(SocketOptions::default().with_keep_alive(false));
        let mut request = Request::get("http://example.com:80/").unwrap();
        socket.prepare(&mut request).unwrap();
        assert_eq!(request.headers().get("Host"), Some("example.com"));
        assert_eq!(request.headers().get("Connection"), Some("close"));
    }

    /// WHY: A caller supplied Host header wins
    /// WHAT: Prepares a request that already has Host
    #[test]
    fn test_prepare_keeps_existing_host() {
        let socket = Socket::new();
        let mut request = Request::get("http://127.0.0.1/")
            .unwrap()
            .with_header("Host", "virtual.example")
            .unwrap();
        socket.prepare(&mut request).unwrap();
        assert_eq!(request.headers().get("host"), Some("virtual.example"));
    }

    /// WHY: Bodies need framing headers the server can rely on
    /// WHAT: Known lengths get Content-Length, unknown 1.1 streams get chunked
    #[test]
    fn test_prepare_body_framing() {
        let socket = Socket::new();

        let mut request = Request::post("http://example.com/").unwrap().with_body("abc");
        socket.prepare(&mut request).unwrap();
        assert_eq!(request.headers().get("Content-Length"), Some("3"));

        let mut request = Request::post("http://example.com/").unwrap();
        socket.prepare(&mut request).unwrap();
        assert_eq!(request.headers().get("Content-Length"), Some("0"));

        struct Unsized(Option<Vec<u8>>);
        impl crate::entity::ReadEntity for Unsized {
            fn read_chunk(&mut self) -> HttpResult<Option<Vec<u8>>> {
                Ok(self.0.take())
            }
        }

        let mut request = Request::post("http://example.com/").unwrap();
        request.set_body(Body::stream(Unsized(Some(b"xyz".to_vec()))));
        socket.prepare(&mut request).unwrap();
        assert_eq!(request.headers().get("Transfer-Encoding"), Some("chunked"));

        let mut request = Request::post("http://example.com/")
            .unwrap()
            .with_version(Version::Http10);
        request.set_body(Body::stream(Unsized(Some(b"xyz".to_vec()))));
        socket.prepare(&mut request).unwrap();
        assert_eq!(request.headers().get("Content-Length"), Some("3"));
        assert_eq!(request.body().as_bytes(), Some(&b"xyz"[..]));

        let mut request = Request::put("http://example.com/").unwrap();
        request.set_body(Body::rewindable(StringEntity::new("hello")));
        socket.prepare(&mut request).unwrap();
        assert_eq!(request.headers().get("Content-Length"), Some("5"));
    }

    /// WHY: Reuse decisions follow keep-alive, Connection and framing
    /// WHAT: Checks should_close for the main combinations
    #[test]
    fn test_should_close() {
        let socket = Socket::new();
        let ok = Response::new(200).unwrap();
        assert!(!socket.should_close(BodyFraming::Length(0), &ok));
        assert!(socket.should_close(BodyFraming::UntilClose, &ok));

        let close = Response::new(200)
            .unwrap()
            .with_header("Connection", "Close")
            .unwrap();
        assert!(socket.should_close(BodyFraming::Length(0), &close));

        let old = Response::new(200).unwrap().with_version(Version::Http10);
        assert!(socket.should_close(BodyFraming::Length(0), &old));

        let old_keep = Response::new(200)
            .unwrap()
            .with_version(Version::Http10)
            .with_header("Connection", "keep-alive")
            .unwrap();
        assert!(!socket.should_close(BodyFraming::Length(0), &old_keep));

        let socket = Socket::with_options(SocketOptions::default().with_keep_alive(false));
        assert!(socket.should_close(BodyFraming::Length(0), &ok));
    }

    /// WHY: Bodyless responses must not wait for data that never comes
    /// WHAT: Checks framing for HEAD, 204, 304, chunked, length and close
    #[test]
    fn test_body_framing() {
        let get = Request::get("http://example.com/").unwrap();
        let head = Request::new(Method::Head, "http://example.com/").unwrap();

        let with_length = Response::new(200)
            .unwrap()
            .with_header("Content-Length", "12")
            .unwrap();
        assert_eq!(Socket::<SystemDnsResolver>::body_framing(&head, &with_length).unwrap(), BodyFraming::None);
        assert_eq!(
            Socket::<SystemDnsResolver>::body_framing(&get, &with_length).unwrap(),
            BodyFraming::Length(12)
        );
        assert_eq!(
            Socket::<SystemDnsResolver>::body_framing(&get, &Response::new(204).unwrap()).unwrap(),
            BodyFraming::None
        );
        assert_eq!(
            Socket::<SystemDnsResolver>::body_framing(&get, &Response::new(304).unwrap()).unwrap(),
            BodyFraming::None
        );
        assert_eq!(
            Socket::<SystemDnsResolver>::body_framing(&get, &Response::new(200).unwrap()).unwrap(),
            BodyFraming::UntilClose
        );

        let chunked = Response::new(200)
            .unwrap()
            .with_header("Transfer-Encoding", "Chunked")
            .unwrap();
        assert_eq!(
            Socket::<SystemDnsResolver>::body_framing(&get, &chunked).unwrap(),
            BodyFraming::Chunked
        );

        let gzip_te = Response::new(200)
            .unwrap()
            .with_header("Transfer-Encoding", "gzip")
            .unwrap();
        assert!(Socket::<SystemDnsResolver>::body_framing(&get, &gzip_te)
            .unwrap_err()
            .is_protocol());

        let bad_length = Response::new(200)
            .unwrap()
            .with_header("Content-Length", "ten")
            .unwrap();
        assert!(Socket::<SystemDnsResolver>::body_framing(&get, &bad_length)
            .unwrap_err()
            .is_protocol());
    }

    #[test]
    fn test_new_socket_is_idle() {
        let socket = Socket::new();
        assert_eq!(socket.state(), SocketState::Idle);
        assert!(!socket.is_connected());
        assert_eq!(socket.connected_to(), None);
    }
}
