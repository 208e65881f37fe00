//! Test HTTP server implementation.
//!
//! WHY: Provides real HTTP server for integration tests without external dependencies.
//! Built on stdlib TCP with hand-crafted HTTP responses for simplicity.
//!
//! WHAT: `TestHttpServer` that listens on localhost, accepts requests, and sends responses.
//! Connections are kept alive between requests unless either side asks to close.
//!
//! HOW: Uses stdlib's `TcpListener` and threading with manually crafted HTTP/1.1 responses.
//! Every request is captured so tests can assert on what the client sent.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

type ResponseHandler = Arc<dyn Fn(&HttpRequest) -> HttpResponse + Send + Sync>;

/// How long an idle keep-alive connection is held open.
const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Simple HTTP request representation for testing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Request target as sent (e.g., "/test?x=1")
    pub path: String,
    /// HTTP version (e.g., "HTTP/1.1")
    pub proto: String,
    /// Request headers in arrival order
    pub headers: Vec<(String, String)>,
    /// Body of the request, de-chunked
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// First value of header `name`, case-insensitive.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn wants_close(&self) -> bool {
        match self.header("Connection") {
            Some(value) => value.eq_ignore_ascii_case("close"),
            None => self.proto == "HTTP/1.0",
        }
    }
}

/// Simple HTTP response representation for testing.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code (e.g., 200)
    pub status: u16,
    /// Status text (e.g., "OK")
    pub status_text: String,
    /// Response headers
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Vec<u8>,
    /// Bytes written verbatim instead of a rendered response
    pub raw: Option<Vec<u8>>,
    /// Close the connection after this response
    pub close: bool,
}

impl HttpResponse {
    /// Create 200 OK response with body.
    #[must_use]
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        let body_bytes = body.into();
        Self {
            status: 200,
            status_text: "OK".to_string(),
            headers: vec![
                ("Content-Type".to_string(), "text/plain".to_string()),
                ("Content-Length".to_string(), body_bytes.len().to_string()),
            ],
            body: body_bytes,
            raw: None,
            close: false,
        }
    }

    /// Create 302 redirect response.
    #[must_use]
    pub fn redirect(location: &str) -> Self {
        Self::redirect_with(302, "Found", location)
    }

    /// Create redirect response with a specific status.
    #[must_use]
    pub fn redirect_with(code: u16, text: &str, location: &str) -> Self {
        Self::status(code, text).with_header("Location", location)
    }

    /// Create custom status response.
    #[must_use]
    pub fn status(code: u16, text: &str) -> Self {
        Self {
            status: code,
            status_text: text.to_string(),
            headers: vec![("Content-Length".to_string(), "0".to_string())],
            body: Vec::new(),
            raw: None,
            close: false,
        }
    }

    /// Send `bytes` as they are, for malformed or hand-framed responses.
    #[must_use]
    pub fn raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            raw: Some(bytes.into()),
            ..Self::status(200, "OK")
        }
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Close the connection once the response is written.
    #[must_use]
    pub fn with_close(mut self) -> Self {
        self.close = true;
        self
    }

    /// Render response to HTTP/1.1 format.
    fn render(&self) -> Vec<u8> {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }

        let mut response = format!("HTTP/1.1 {} {}\r\n", self.status, self.status_text);

        for (key, value) in &self.headers {
            response.push_str(&format!("{key}: {value}\r\n"));
        }

        response.push_str("\r\n");

        let mut bytes = response.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

/// Test HTTP server for integration testing.
///
/// # Purpose (WHY)
///
/// Provides a real HTTP server for testing HTTP clients without external dependencies.
///
/// # What it does
///
/// Starts a local HTTP server on a random port, accepts incoming requests, and responds
/// with configurable responses. Runs in background thread to not block test execution.
///
/// # Examples
///
/// ```rust
/// use foundation_testing::http::TestHttpServer;
///
/// let server = TestHttpServer::start();
/// assert!(server.url("/test").starts_with("http://127.0.0.1:"));
///
/// // Server automatically stops when dropped
/// ```
pub struct TestHttpServer {
    addr: String,
    _handle: Option<thread::JoinHandle<()>>,
    running: Arc<AtomicBool>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
    connections: Arc<AtomicUsize>,
}

impl core::fmt::Debug for TestHttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestHttpServer")
            .field("addr", &self.addr)
            .field("connections", &self.connections.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl TestHttpServer {
    /// Start a new test HTTP server on random port.
    ///
    /// Responds with 200 OK to all requests.
    #[must_use]
    pub fn start() -> Self {
        Self::with_response(|_req| HttpResponse::ok(b"OK"))
    }

    /// Start server that answers with `responses` in order, then 404.
    ///
    /// ```rust
    /// use foundation_testing::http::{HttpResponse, TestHttpServer};
    ///
    /// let server = TestHttpServer::with_responses(vec![
    ///     HttpResponse::redirect("/target"),
    ///     HttpResponse::ok(b"done"),
    /// ]);
    /// ```
    #[must_use]
    pub fn with_responses(responses: Vec<HttpResponse>) -> Self {
        let queue = Mutex::new(VecDeque::from(responses));
        Self::with_response(move |_req| {
            lock(&queue)
                .pop_front()
                .unwrap_or_else(|| HttpResponse::status(404, "Not Found"))
        })
    }

    /// Start server with custom response handler.
    ///
    /// # Purpose (WHY)
    ///
    /// Allows tests to customize server behavior for specific scenarios
    /// (redirects, errors, custom headers, etc.)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use foundation_testing::http::{TestHttpServer, HttpResponse};
    ///
    /// let server = TestHttpServer::with_response(|req| {
    ///     if req.path == "/redirect" {
    ///         HttpResponse::redirect("/target")
    ///     } else {
    ///         HttpResponse::ok(b"Success")
    ///     }
    /// });
    /// ```
    ///
    /// # Panics
    ///
    /// When no localhost port can be bound.
    #[must_use]
    pub fn with_response<F>(handler: F) -> Self
    where
        F: Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static,
    {
        let listener =
            TcpListener::bind("127.0.0.1:0").expect("Failed to bind test HTTP server to localhost");
        let addr = match listener.local_addr() {
            Ok(local) => format!("http://{local}"),
            Err(e) => panic!("Test HTTP server has no local address: {e}"),
        };

        let running = Arc::new(AtomicBool::new(true));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let handler: ResponseHandler = Arc::new(handler);

        let running_clone = Arc::clone(&running);
        let requests_clone = Arc::clone(&requests);
        let connections_clone = Arc::clone(&connections);

        let handle = thread::spawn(move || {
            // Set non-blocking so we can check running flag
            if let Err(e) = listener.set_nonblocking(true) {
                tracing::error!("TestHttpServer cannot poll its listener: {e}");
                return;
            }

            while running_clone.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((stream, sock_addr)) => {
                        tracing::info!("Got a client connection: {sock_addr:?}");
                        connections_clone.fetch_add(1, Ordering::SeqCst);
                        let handler = Arc::clone(&handler);
                        let requests = Arc::clone(&requests_clone);
                        // Handle each connection in separate thread
                        thread::spawn(move || {
                            if let Err(e) = Self::handle_connection(stream, &handler, &requests) {
                                tracing::info!("TestHttpServer connection error: {e}");
                            }
                        });
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                        // No connection available, sleep briefly and check again
                        thread::sleep(Duration::from_millis(10));
                    }
                    Err(e) => {
                        tracing::info!("TestHttpServer accept error: {e}");
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            _handle: Some(handle),
            running,
            requests,
            connections,
        }
    }

    /// Get full URL for a path on this test server.
    ///
    /// # Arguments
    ///
    /// * `path` - Path starting with / (e.g., "/test", "/api/users")
    ///
    /// # Returns
    ///
    /// Full URL string (e.g., "<http://127.0.0.1:54321/test>")
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Get base URL of this test server (e.g., "<http://127.0.0.1:54321>").
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.addr
    }

    /// Every request received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    /// Number of TCP connections accepted so far.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Serve requests on one connection until either side closes it.
    fn handle_connection(
        stream: TcpStream,
        handler: &ResponseHandler,
        requests: &Mutex<Vec<HttpRequest>>,
    ) -> io::Result<()> {
        // Accepted sockets inherit non-blocking mode on some platforms
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(IDLE_TIMEOUT))?;

        let mut writer = stream.try_clone()?;
        let mut reader = BufReader::new(stream);

        loop {
            let Some(request) = read_request(&mut reader)? else {
                tracing::debug!("Client closed the connection");
                return Ok(());
            };

            tracing::info!(
                "Received new http request: method: {}, path: {}, proto: {}",
                request.method,
                request.path,
                request.proto,
            );

            let response = handler(&request);
            let close = response.close || request.wants_close();
            lock(requests).push(request);

            writer.write_all(&response.render())?;
            writer.flush()?;

            if close {
                return Ok(());
            }
        }
    }
}

impl Drop for TestHttpServer {
    fn drop(&mut self) {
        // Signal server thread to stop
        self.running.store(false, Ordering::Relaxed);
        // Thread will exit on next loop iteration
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

fn read_line<R: BufRead>(reader: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// Read one request. `None` when the connection ended between requests.
fn read_request<R: BufRead>(reader: &mut R) -> io::Result<Option<HttpRequest>> {
    let request_line = match read_line(reader) {
        Ok(Some(line)) => line,
        Ok(None) => return Ok(None),
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
            return Ok(None)
        }
        Err(e) => return Err(e),
    };

    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(path), Some(proto)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid(format!("Malformed request line: {request_line:?}")));
    };

    let mut headers = Vec::new();
    loop {
        let line = read_line(reader)?.ok_or_else(|| invalid("EOF inside request headers"))?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| invalid(format!("Malformed header line: {line:?}")))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    let mut request = HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        proto: proto.to_string(),
        headers,
        body: Vec::new(),
    };

    let chunked = request
        .header("Transfer-Encoding")
        .is_some_and(|value| value.eq_ignore_ascii_case("chunked"));
    if chunked {
        request.body = read_chunked_body(reader)?;
    } else if let Some(length) = request.header("Content-Length") {
        let length: usize = length
            .parse()
            .map_err(|_| invalid(format!("Bad Content-Length: {length}")))?;
        let mut body = vec![0u8; length];
        reader.read_exact(&mut body)?;
        request.body = body;
    }

    Ok(Some(request))
}

fn read_chunked_body<R: BufRead>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let line = read_line(reader)?.ok_or_else(|| invalid("EOF inside chunked body"))?;
        let size = line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size, 16)
            .map_err(|_| invalid(format!("Bad chunk size: {line:?}")))?;

        if size == 0 {
            // Trailers up to the blank line
            while let Some(trailer) = read_line(reader)? {
                if trailer.is_empty() {
                    break;
                }
            }
            return Ok(body);
        }

        let start = body.len();
        body.resize(start + size, 0);
        reader.read_exact(&mut body[start..])?;
        read_line(reader)?;
    }
}
