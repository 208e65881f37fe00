use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::entity::{Body, UrlEncodedFormData};
use crate::errors::{HttpError, HttpResult};
use crate::headers::{self, Headers};

use super::{Method, Version};

static REQUEST_LINE: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(r"^(?P<method>\S+)\s(?P<uri>[^ ]*)(?:\sHTTP/(?P<version>\d+\.\d+))?")
});

/// An outbound HTTP request.
///
/// WHY: The client rebuilds a fresh request for every redirect hop and the transport
/// renders it onto the wire, so the request owns everything needed to do both.
///
/// WHAT: Method, absolute URI, version, ordered headers and a [`Body`].
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Url,
    version: Version,
    headers: Headers,
    body: Body,
}

impl Request {
    /// Creates a request for an absolute `http`/`https` URI.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidArgument` when the URI does not parse, is not
    /// `http`/`https` or has no host.
    pub fn new(method: Method, uri: &str) -> HttpResult<Self> {
        Ok(Self::from_url(method, parse_http_uri(uri)?))
    }

    #[must_use]
    pub fn from_url(method: Method, uri: Url) -> Self {
        Self {
            method,
            uri,
            version: Version::default(),
            headers: Headers::new(),
            body: Body::Empty,
        }
    }

    /// Shorthand for a `GET` request.
    ///
    /// # Errors
    ///
    /// See [`Request::new`].
    pub fn get(uri: &str) -> HttpResult<Self> {
        Self::new(Method::Get, uri)
    }

    /// Shorthand for a `POST` request.
    ///
    /// # Errors
    ///
    /// See [`Request::new`].
    pub fn post(uri: &str) -> HttpResult<Self> {
        Self::new(Method::Post, uri)
    }

    /// Shorthand for a `PUT` request.
    ///
    /// # Errors
    ///
    /// See [`Request::new`].
    pub fn put(uri: &str) -> HttpResult<Self> {
        Self::new(Method::Put, uri)
    }

    /// Shorthand for a `DELETE` request.
    ///
    /// # Errors
    ///
    /// See [`Request::new`].
    pub fn delete(uri: &str) -> HttpResult<Self> {
        Self::new(Method::Delete, uri)
    }

    /// Parses raw request text: request line, header lines, blank line, body.
    ///
    /// The request target may be absolute, or origin-form when a `Host` header is
    /// present. A missing version means HTTP/1.1.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidArgument` when no valid request line is found, the
    /// method or version is invalid, the headers are malformed or the URI cannot be
    /// resolved.
    pub fn from_string(raw: &str) -> HttpResult<Self> {
        let regex = REQUEST_LINE
            .as_ref()
            .map_err(|err| HttpError::Configuration(format!("request line pattern: {err}")))?;

        let (first_line, rest) = split_line(raw);
        let captures = regex.captures(first_line).ok_or_else(|| {
            HttpError::InvalidArgument(
                "A valid request line was not found in the provided string".to_string(),
            )
        })?;

        let method = Method::parse(&captures["method"])?;
        let target = &captures["uri"];
        let version = match captures.name("version") {
            Some(version) => Version::parse(version.as_str())?,
            None => Version::default(),
        };

        let (header_block, body) = split_head(rest);
        let headers = Headers::from_string(header_block)?;

        let uri = match Url::parse(target) {
            Ok(uri) => uri,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let host = headers.get(headers::HOST).ok_or_else(|| {
                    HttpError::InvalidArgument(format!(
                        "Request target '{target}' is not absolute and no Host header is present"
                    ))
                })?;
                Url::parse(&format!("http://{host}"))?.join(target)?
            }
            Err(err) => return Err(err.into()),
        };
        check_http_uri(&uri)?;

        Ok(Self {
            method,
            uri,
            version,
            headers,
            body: Body::from(body),
        })
    }

    #[must_use]
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Adds a header, builder style.
    ///
    /// # Errors
    ///
    /// See [`Headers::add`].
    pub fn with_header(mut self, name: &str, value: &str) -> HttpResult<Self> {
        self.headers.add(name, value)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    #[must_use]
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// Replaces the URI.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidArgument` for non-http URIs.
    pub fn set_uri(&mut self, uri: Url) -> HttpResult<()> {
        check_http_uri(&uri)?;
        self.uri = uri;
        Ok(())
    }

    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    #[must_use]
    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = body.into();
    }

    /// Takes the body out, leaving `Body::Empty`.
    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    /// Sets a URL-encoded form body and the matching `Content-Type`.
    ///
    /// # Errors
    ///
    /// Only fails if the content type could not be stored, which cannot happen for the
    /// fixed form type.
    pub fn set_form_data(&mut self, form: UrlEncodedFormData) -> HttpResult<()> {
        self.headers.set(headers::CONTENT_TYPE, form.content_type())?;
        self.body = Body::rewindable(form);
        Ok(())
    }

    /// `path?query` as written on the request line.
    #[must_use]
    pub fn request_target(&self) -> String {
        let mut target = self.uri.path().to_string();
        if target.is_empty() {
            target.push('/');
        }
        if let Some(query) = self.uri.query() {
            target.push('?');
            target.push_str(query);
        }
        target
    }

    /// `METHOD absolute-uri HTTP/x.y`.
    #[must_use]
    pub fn render_request_line(&self) -> String {
        format!("{} {} {}", self.method, self.uri, self.version)
    }

    #[must_use]
    pub fn is_options(&self) -> bool {
        self.method == Method::Options
    }

    #[must_use]
    pub fn is_get(&self) -> bool {
        self.method == Method::Get
    }

    #[must_use]
    pub fn is_head(&self) -> bool {
        self.method == Method::Head
    }

    #[must_use]
    pub fn is_post(&self) -> bool {
        self.method == Method::Post
    }

    #[must_use]
    pub fn is_put(&self) -> bool {
        self.method == Method::Put
    }

    #[must_use]
    pub fn is_delete(&self) -> bool {
        self.method == Method::Delete
    }

    #[must_use]
    pub fn is_trace(&self) -> bool {
        self.method == Method::Trace
    }

    #[must_use]
    pub fn is_connect(&self) -> bool {
        self.method == Method::Connect
    }
}

/// Renders the request line, headers, blank line and any in-memory body.
/// Streamed entity bodies are not rendered.
impl core::fmt::Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\r\n{}\r\n",
            self.render_request_line(),
            self.headers.to_wire_string()
        )?;
        if let Some(bytes) = self.body.as_bytes() {
            f.write_str(&String::from_utf8_lossy(bytes))?;
        }
        Ok(())
    }
}

pub(crate) fn parse_http_uri(uri: &str) -> HttpResult<Url> {
    let url = Url::parse(uri.trim())?;
    check_http_uri(&url)?;
    Ok(url)
}

fn check_http_uri(uri: &Url) -> HttpResult<()> {
    if !matches!(uri.scheme(), "http" | "https") {
        return Err(HttpError::InvalidArgument(format!(
            "Unsupported URI scheme '{}' in {uri}",
            uri.scheme()
        )));
    }
    if uri.host_str().is_none_or(str::is_empty) {
        return Err(HttpError::InvalidArgument(format!("URI has no host: {uri}")));
    }
    Ok(())
}

/// Splits off the first line, accepting CRLF or bare LF.
pub(crate) fn split_line(raw: &str) -> (&str, &str) {
    match raw.find('\n') {
        Some(index) => {
            let line = &raw[..index];
            (line.strip_suffix('\r').unwrap_or(line), &raw[index + 1..])
        }
        None => (raw, ""),
    }
}

/// Splits the rest of a message into the header block and the body.
pub(crate) fn split_head(rest: &str) -> (&str, &str) {
    if let Some(index) = rest.find("\r\n\r\n") {
        return (&rest[..index], &rest[index + 4..]);
    }
    if let Some(index) = rest.find("\n\n") {
        return (&rest[..index], &rest[index + 2..]);
    }
    if rest.starts_with("\r\n") {
        return ("", &rest[2..]);
    }
    if rest.starts_with('\n') {
        return ("", &rest[1..]);
    }
    (rest, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// WHY: Requests are only ever sent over http or https
    /// WHAT: Rejects other schemes and relative URIs
    #[test]
    fn test_new_rejects_non_http_uris() {
        assert!(Request::get("ftp://example.com/").unwrap_err().is_invalid_argument());
        assert!(Request::get("/relative").unwrap_err().is_invalid_argument());
        assert!(Request::get("http://example.com/").is_ok());
    }

    /// WHY: The request line on the wire uses origin-form
    /// WHAT: Checks path and query rendering
    #[test]
    fn test_request_target() {
        let request = Request::get("http://example.com/a/b?x=1&y=2").unwrap();
        assert_eq!(request.request_target(), "/a/b?x=1&y=2");

        let request = Request::get("http://example.com").unwrap();
        assert_eq!(request.request_target(), "/");
    }

    /// WHY: Raw request text must round trip through the message type
    /// WHAT: Renders a request, parses it back and compares fields
    #[test]
    fn test_to_string_from_string_round_trip() {
        let request = Request::new(Method::Put, "http://example.com:8080/items/1?v=2")
            .unwrap()
            .with_version(Version::Http10)
            .with_header("X-Trace", "abc")
            .unwrap()
            .with_header("Accept", "*/*")
            .unwrap()
            .with_body("payload");

        let raw = request.to_string();
        assert!(raw.starts_with("PUT http://example.com:8080/items/1?v=2 HTTP/1.0\r\n"));

        let parsed = Request::from_string(&raw).unwrap();
        assert_eq!(parsed.method(), &Method::Put);
        assert_eq!(parsed.uri(), request.uri());
        assert_eq!(parsed.version(), Version::Http10);
        assert_eq!(parsed.headers(), request.headers());
        assert_eq!(parsed.body().as_bytes(), Some(&b"payload"[..]));
    }

    /// WHY: Captured server-side requests use origin-form targets
    /// WHAT: Resolves the target against the Host header
    #[test]
    fn test_from_string_origin_form_uses_host() {
        let parsed =
            Request::from_string("GET /index.html HTTP/1.1\r\nHost: example.org:81\r\n\r\n").unwrap();
        assert_eq!(parsed.uri().as_str(), "http://example.org:81/index.html");
        assert!(parsed.body().is_empty());

        let err = Request::from_string("GET /index.html HTTP/1.1\r\n\r\n").unwrap_err();
        assert!(err.is_invalid_argument());
    }

    /// WHY: The version is optional on the request line
    /// WHAT: Parses a request line without a version
    #[test]
    fn test_from_string_defaults_version() {
        let parsed = Request::from_string("delete http://example.com/x").unwrap();
        assert_eq!(parsed.method(), &Method::Delete);
        assert_eq!(parsed.version(), Version::Http11);
    }

    /// WHY: Garbage input must not yield a request
    /// WHAT: Parses an empty string and a bad method
    #[test]
    fn test_from_string_rejects_garbage() {
        assert!(Request::from_string("").unwrap_err().is_invalid_argument());
        assert!(Request::from_string("G(T http://example.com/ HTTP/1.1")
            .unwrap_err()
            .is_invalid_argument());
    }

    /// WHY: Form posts need both the encoded body and its content type
    /// WHAT: Sets form data and checks header and body
    #[test]
    fn test_set_form_data() {
        let mut request = Request::post("http://example.com/form").unwrap();
        request
            .set_form_data(UrlEncodedFormData::from_pairs([("a", "1"), ("b", "x y")]))
            .unwrap();

        assert!(request.is_post());
        assert_eq!(
            request.headers().get(headers::CONTENT_TYPE),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(request.body_mut().read_all().unwrap(), b"a=1&b=x%20y".to_vec());
    }
}
