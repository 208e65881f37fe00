//! Ordered HTTP header collection.
//!
//! WHY: HTTP allows repeated fields (`Set-Cookie` being the usual one) and the order of
//! fields is visible on the wire, so a map keyed by name is not enough.
//!
//! WHAT: `Headers` keeps `Header` entries in insertion order with case-insensitive
//! lookup, and can render itself to / parse itself from the wire block.

use crate::errors::{HttpError, HttpResult};

pub const ACCEPT_ENCODING: &str = "Accept-Encoding";
pub const AUTHORIZATION: &str = "Authorization";
pub const CONNECTION: &str = "Connection";
pub const CONTENT_ENCODING: &str = "Content-Encoding";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const COOKIE: &str = "Cookie";
pub const HOST: &str = "Host";
pub const LOCATION: &str = "Location";
pub const SET_COOKIE: &str = "Set-Cookie";
pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
pub const USER_AGENT: &str = "User-Agent";

/// A single header field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    name: String,
    value: String,
}

impl Header {
    /// Creates a header after validating the field name and value.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidArgument` when the name is not a token or the value
    /// carries CR/LF.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> HttpResult<Self> {
        let name = name.into();
        let value = value.into();

        if !is_token(&name) {
            return Err(HttpError::InvalidArgument(format!(
                "Invalid header name: '{name}'"
            )));
        }
        if value.contains(['\r', '\n']) {
            return Err(HttpError::InvalidArgument(format!(
                "Header value for '{name}' contains a line break"
            )));
        }

        Ok(Self { name, value })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

impl core::fmt::Display for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Returns true when `value` matches the HTTP `token` grammar.
///
/// Control characters, DEL, non-ASCII, whitespace and the separators
/// `()<>@,;:\"/[]?={}` are rejected, as is the empty string.
#[must_use]
pub fn is_token(value: &str) -> bool {
    !value.is_empty()
        && value.bytes().all(|b| {
            b.is_ascii_graphic()
                && !matches!(
                    b,
                    b'(' | b')'
                        | b'<'
                        | b'>'
                        | b'@'
                        | b','
                        | b';'
                        | b':'
                        | b'\\'
                        | b'"'
                        | b'/'
                        | b'['
                        | b']'
                        | b'?'
                        | b'='
                        | b'{'
                        | b'}'
                )
        })
}

/// Ordered, case-insensitive header collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<Header>,
}

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a collection from name/value pairs.
    ///
    /// # Errors
    ///
    /// Fails on the first invalid name or value.
    pub fn from_pairs<N, V, I>(pairs: I) -> HttpResult<Self>
    where
        N: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (N, V)>,
    {
        let mut headers = Self::new();
        for (name, value) in pairs {
            headers.add(name, value)?;
        }
        Ok(headers)
    }

    /// Parses a raw header block (`Name: value` lines separated by CRLF or LF).
    ///
    /// Each line is split on its first colon and both sides are trimmed. Lines starting
    /// with whitespace continue the previous field value.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidArgument` for lines without a colon or with an
    /// invalid field name.
    pub fn from_string(raw: &str) -> HttpResult<Self> {
        let mut headers = Self::new();
        for line in raw.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            headers.push_line(line).map_err(|_| {
                HttpError::InvalidArgument(format!("Malformed header line: '{line}'"))
            })?;
        }
        Ok(headers)
    }

    /// Adds one raw header line, folding continuation lines into the previous value.
    pub(crate) fn push_line(&mut self, line: &str) -> HttpResult<()> {
        if line.starts_with([' ', '\t']) {
            return match self.entries.last_mut() {
                Some(last) => {
                    let continuation = line.trim();
                    if !continuation.is_empty() {
                        if !last.value.is_empty() {
                            last.value.push(' ');
                        }
                        last.value.push_str(continuation);
                    }
                    Ok(())
                }
                None => Err(HttpError::Protocol(format!(
                    "Header continuation without a header: '{line}'"
                ))),
            };
        }

        let Some((name, value)) = line.split_once(':') else {
            return Err(HttpError::Protocol(format!(
                "Header line has no colon: '{line}'"
            )));
        };

        self.add(name.trim(), value.trim())
    }

    /// Appends a header, keeping existing fields with the same name.
    ///
    /// # Errors
    ///
    /// See [`Header::new`].
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) -> HttpResult<()> {
        self.entries.push(Header::new(name, value)?);
        Ok(())
    }

    /// Appends an already validated header.
    pub fn add_header(&mut self, header: Header) {
        self.entries.push(header);
    }

    /// Replaces every field named `name` with a single field.
    ///
    /// The new field takes the position of the first removed one, or the end.
    ///
    /// # Errors
    ///
    /// See [`Header::new`].
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> HttpResult<()> {
        let header = Header::new(name, value)?;
        match self.entries.iter().position(|h| h.is(&header.name)) {
            Some(index) => {
                let name = header.name.clone();
                self.entries[index] = header;
                let mut seen = 0usize;
                self.entries.retain(|h| {
                    if h.is(&name) {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => self.entries.push(header),
        }
        Ok(())
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.entries.iter().any(|h| h.is(name))
    }

    /// Returns the first value for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.iter().find(|h| h.is(name)).map(Header::value)
    }

    /// Returns every value for `name`, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |h| h.is(name))
            .map(Header::value)
    }

    /// Removes every field named `name`, returning how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|h| !h.is(name));
        before - self.entries.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Header> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders the block as sent on the wire: `Name: value\r\n` per field.
    #[must_use]
    pub fn to_wire_string(&self) -> String {
        let mut out = String::new();
        for header in &self.entries {
            out.push_str(&header.name);
            out.push_str(": ");
            out.push_str(&header.value);
            out.push_str("\r\n");
        }
        out
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// WHY: Header names are case-insensitive per HTTP
    /// WHAT: Adds with one casing and looks up with another
    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain").unwrap();

        assert!(headers.has("content-type"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
    }

    /// WHY: Set-Cookie and similar fields repeat and order matters
    /// WHAT: Adds two values for the same name and reads both back in order
    #[test]
    fn test_duplicates_are_kept_in_order() {
        let mut headers = Headers::new();
        headers.add("Set-Cookie", "a=1").unwrap();
        headers.add("X-Other", "x").unwrap();
        headers.add("set-cookie", "b=2").unwrap();

        let values: Vec<&str> = headers.get_all(SET_COOKIE).collect();
        assert_eq!(values, vec!["a=1", "b=2"]);
        assert_eq!(headers.get(SET_COOKIE), Some("a=1"));
    }

    /// WHY: set() must collapse repeats into one field without moving it
    /// WHAT: Replaces a duplicated header and checks position and count
    #[test]
    fn test_set_replaces_all_values_in_place() {
        let mut headers =
            Headers::from_pairs([("A", "1"), ("Cookie", "x=1"), ("B", "2"), ("cookie", "y=2")])
                .unwrap();
        headers.set(COOKIE, "z=3").unwrap();

        let names: Vec<&str> = headers.iter().map(Header::name).collect();
        assert_eq!(names, vec!["A", "Cookie", "B"]);
        assert_eq!(headers.get("cookie"), Some("z=3"));
    }

    /// WHY: remove() reports how much it removed so callers can log it
    /// WHAT: Removes a repeated header
    #[test]
    fn test_remove_counts_removed_fields() {
        let mut headers = Headers::from_pairs([("A", "1"), ("a", "2"), ("B", "3")]).unwrap();
        assert_eq!(headers.remove("A"), 2);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.remove("missing"), 0);
    }

    /// WHY: Header injection through names or values must be impossible
    /// WHAT: Rejects separators in names and CRLF in values
    #[test]
    fn test_invalid_names_and_values_are_rejected() {
        let mut headers = Headers::new();
        assert!(headers.add("Bad Name", "v").is_err());
        assert!(headers.add("Bad:Name", "v").is_err());
        assert!(headers.add("", "v").is_err());
        assert!(headers.add("X-Ok", "v\r\nInjected: 1").is_err());
        assert!(headers.is_empty());
    }

    /// WHY: Parsing splits on the first colon and trims both sides
    /// WHAT: Parses a block with colons in the value and a folded line
    #[test]
    fn test_from_string_parses_block() {
        let headers = Headers::from_string(
            "Host:  example.com:8080 \r\nX-Long: first\r\n  second\r\nDate: Sun, 10 Oct 2010 23:26:07 GMT\r\n",
        )
        .unwrap();

        assert_eq!(headers.get(HOST), Some("example.com:8080"));
        assert_eq!(headers.get("x-long"), Some("first second"));
        assert_eq!(headers.get("date"), Some("Sun, 10 Oct 2010 23:26:07 GMT"));
    }

    /// WHY: Wire rendering feeds the transport and must round trip
    /// WHAT: Renders then parses and compares
    #[test]
    fn test_wire_string_round_trip() {
        let headers = Headers::from_pairs([("Accept", "*/*"), ("X-A", "1")]).unwrap();
        let rendered = headers.to_wire_string();
        assert_eq!(rendered, "Accept: */*\r\nX-A: 1\r\n");
        assert_eq!(Headers::from_string(&rendered).unwrap(), headers);
    }

    /// WHY: The token grammar also validates custom methods and cookie names
    /// WHAT: Checks a few accepted and rejected tokens
    #[test]
    fn test_is_token() {
        assert!(is_token("PROPFIND"));
        assert!(is_token("X-Custom_1.0~"));
        assert!(!is_token("GET POST"));
        assert!(!is_token("a{b}"));
        assert!(!is_token("caf\u{e9}"));
        assert!(!is_token("\x07"));
    }
}
