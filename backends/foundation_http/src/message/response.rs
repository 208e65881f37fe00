use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{HttpError, HttpResult};
use crate::headers::{self, Headers};

use super::request::{split_head, split_line};
use super::Version;

static STATUS_LINE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^HTTP/(\d+\.\d+) (\d{3})(?: (.*))?$"));

/// Parses `HTTP/<version> <code> <reason>`.
///
/// The reason phrase may be empty.
///
/// # Errors
///
/// Returns `HttpError::Protocol` when the line does not match, the version is not
/// 1.0/1.1 or the code is outside 100..=599.
pub fn parse_status_line(line: &str) -> HttpResult<(Version, u16, String)> {
    let regex = STATUS_LINE
        .as_ref()
        .map_err(|err| HttpError::Configuration(format!("status line pattern: {err}")))?;

    let captures = regex.captures(line).ok_or_else(|| {
        HttpError::Protocol(format!(
            "A valid response status line was not found in the provided string: '{line}'"
        ))
    })?;

    let version = Version::parse(&captures[1])
        .map_err(|_| HttpError::Protocol(format!("Unsupported HTTP version in '{line}'")))?;
    let status = captures[2]
        .parse::<u16>()
        .map_err(|_| HttpError::Protocol(format!("Invalid status code in '{line}'")))?;
    if !(100..=599).contains(&status) {
        return Err(HttpError::Protocol(format!(
            "Status code {status} is out of range"
        )));
    }
    let reason = captures
        .get(3)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    Ok((version, status, reason))
}

/// Standard reason phrase for a status code, empty when unknown.
#[must_use]
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        410 => "Gone",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}

/// An HTTP response as read from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    version: Version,
    status: u16,
    reason: String,
    headers: Headers,
    body: Vec<u8>,
}

impl Response {
    /// Creates a response with the standard reason phrase.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidArgument` when `status` is outside 100..=599.
    pub fn new(status: u16) -> HttpResult<Self> {
        if !(100..=599).contains(&status) {
            return Err(HttpError::InvalidArgument(format!(
                "Invalid status code provided: {status}"
            )));
        }
        Ok(Self {
            version: Version::Http11,
            status,
            reason: reason_phrase(status).to_string(),
            headers: Headers::new(),
            body: Vec::new(),
        })
    }

    pub(crate) fn from_parts(version: Version, status: u16, reason: String, headers: Headers) -> Self {
        Self {
            version,
            status,
            reason,
            headers,
            body: Vec::new(),
        }
    }

    /// Parses raw response text.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Protocol` for a bad status line and
    /// `HttpError::InvalidArgument` for malformed headers.
    pub fn from_string(raw: &str) -> HttpResult<Self> {
        let (status_line, rest) = split_line(raw);
        let (version, status, reason) = parse_status_line(status_line)?;
        let (header_block, body) = split_head(rest);

        Ok(Self {
            version,
            status,
            reason,
            headers: Headers::from_string(header_block)?,
            body: body.as_bytes().to_vec(),
        })
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
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
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }

    /// Body decoded as UTF-8, invalid sequences replaced.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Trimmed `Location` header, when present and non-empty.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(headers::LOCATION)
            .map(str::trim)
            .filter(|location| !location.is_empty())
    }

    #[must_use]
    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.status)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    #[must_use]
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    #[must_use]
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

impl core::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {}\r\n{}\r\n{}",
            self.version,
            self.status,
            self.reason,
            self.headers.to_wire_string(),
            String::from_utf8_lossy(&self.body)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// WHY: The status line drives everything the transport does next
    /// WHAT: Parses valid lines including an empty reason
    #[test]
    fn test_parse_status_line() {
        let (version, status, reason) = parse_status_line("HTTP/1.1 404 Not Found").unwrap();
        assert_eq!(version, Version::Http11);
        assert_eq!(status, 404);
        assert_eq!(reason, "Not Found");

        let (version, status, reason) = parse_status_line("HTTP/1.0 200").unwrap();
        assert_eq!(version, Version::Http10);
        assert_eq!(status, 200);
        assert_eq!(reason, "");
    }

    /// WHY: Anything that is not an HTTP/1.x status line is a protocol violation
    /// WHAT: Feeds garbage, HTTP/2 and out of range codes
    #[test]
    fn test_parse_status_line_rejects_garbage() {
        for line in ["GARBAGE", "HTTP/1.1 20 OK", "HTTP/2.0 200 OK", "HTTP/1.1 600 Nope", ""] {
            assert!(parse_status_line(line).unwrap_err().is_protocol(), "{line:?}");
        }
    }

    /// WHY: An empty Content-Length 0 response is the simplest valid reply
    /// WHAT: Parses it from text and checks status and body
    #[test]
    fn test_from_string_empty_body() {
        let response = Response::from_string("HTTP/1.1 200 OK\r\nContent-length: 0\r\n\r\n").unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.body().is_empty());
        assert_eq!(response.headers().get("Content-Length"), Some("0"));
    }

    /// WHY: Responses must round trip through their text form
    /// WHAT: Renders and parses a response with headers and body
    #[test]
    fn test_round_trip() {
        let response = Response::new(201)
            .unwrap()
            .with_header("Location", "/items/7")
            .unwrap()
            .with_header("Set-Cookie", "a=1")
            .unwrap()
            .with_body("created");

        let parsed = Response::from_string(&response.to_string()).unwrap();
        assert_eq!(parsed, response);
        assert_eq!(parsed.reason(), "Created");
        assert_eq!(parsed.body_text(), "created");
    }

    /// WHY: Status codes outside 100..=599 are not HTTP
    /// WHAT: Rejects 99 and 600
    #[test]
    fn test_new_validates_status() {
        assert!(Response::new(99).is_err());
        assert!(Response::new(600).is_err());
    }

    /// WHY: Callers classify responses through the predicates
    /// WHAT: Checks one code per class and the Location helper
    #[test]
    fn test_predicates() {
        assert!(Response::new(101).unwrap().is_informational());
        assert!(Response::new(204).unwrap().is_success());
        let redirect = Response::new(302)
            .unwrap()
            .with_header("Location", "  /next  ")
            .unwrap();
        assert!(redirect.is_redirect());
        assert_eq!(redirect.location(), Some("/next"));
        assert!(Response::new(404).unwrap().is_not_found());
        assert!(Response::new(404).unwrap().is_client_error());
        assert!(Response::new(503).unwrap().is_server_error());
        assert_eq!(Response::new(200).unwrap().location(), None);
    }
}
