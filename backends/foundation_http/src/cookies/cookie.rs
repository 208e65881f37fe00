use chrono::{DateTime, Utc};
use url::Url;

use crate::errors::{HttpError, HttpResult};
use crate::headers::is_token;

/// A stored cookie.
///
/// Identity is `(name, domain, path)`: storing a cookie with the same identity replaces
/// the earlier one.
#[derive(Debug, Clone)]
pub struct Cookie {
    name: String,
    value: String,
    domain: String,
    path: String,
    expires: Option<DateTime<Utc>>,
    secure: bool,
    http_only: bool,
    host_only: bool,
    write_sequence: u64,
}

impl Cookie {
    /// Creates a session cookie for `domain` with path `/`.
    ///
    /// The domain is lowercased and a leading dot dropped.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidArgument` for a non-token name, a value containing
    /// `;` or a line break, or an empty domain.
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl AsRef<str>,
    ) -> HttpResult<Self> {
        let name = name.into();
        let value = value.into();

        if !is_token(&name) {
            return Err(HttpError::InvalidArgument(format!(
                "Invalid cookie name: '{name}'"
            )));
        }
        if value.contains([';', '\r', '\n']) {
            return Err(HttpError::InvalidArgument(format!(
                "Invalid value for cookie '{name}'"
            )));
        }

        let domain = normalize_domain(domain.as_ref());
        if domain.is_empty() {
            return Err(HttpError::InvalidArgument(format!(
                "Cookie '{name}' needs a domain"
            )));
        }

        Ok(Self {
            name,
            value,
            domain,
            path: "/".to_string(),
            expires: None,
            secure: false,
            http_only: false,
            host_only: false,
            write_sequence: 0,
        })
    }

    /// Paths not starting with `/` fall back to `/`.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = if path.starts_with('/') {
            path
        } else {
            "/".to_string()
        };
        self
    }

    #[must_use]
    pub fn with_expires(mut self, expires: Option<DateTime<Utc>>) -> Self {
        self.expires = expires;
        self
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Host-only cookies match their exact host and no subdomains.
    #[must_use]
    pub fn with_host_only(mut self, host_only: bool) -> Self {
        self.host_only = host_only;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.expires
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn is_http_only(&self) -> bool {
        self.http_only
    }

    pub fn is_host_only(&self) -> bool {
        self.host_only
    }

    pub fn is_session(&self) -> bool {
        self.expires.is_none()
    }

    /// Position of the last write in the owning store; later writes have higher values.
    pub fn write_sequence(&self) -> u64 {
        self.write_sequence
    }

    pub(crate) fn set_write_sequence(&mut self, sequence: u64) {
        self.write_sequence = sequence;
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }

    pub fn same_identity(&self, other: &Cookie) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }

    /// Exact host match, or a subdomain on a label boundary unless host-only.
    pub fn matches_domain(&self, host: &str) -> bool {
        let host = normalize_domain(host);
        if host == self.domain {
            return true;
        }
        !self.host_only
            && host.len() > self.domain.len()
            && host.ends_with(&self.domain)
            && host.as_bytes()[host.len() - self.domain.len() - 1] == b'.'
    }

    /// Segment-aligned path prefix match.
    pub fn matches_path(&self, request_path: &str) -> bool {
        path_matches(&self.path, request_path)
    }

    /// Full match against a request URL, expiry excluded.
    pub fn matches_url(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        (!self.secure || url.scheme() == "https")
            && self.matches_domain(host)
            && self.matches_path(url.path())
    }

    /// `name=value` as sent in a `Cookie` header.
    pub fn to_pair(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

pub(crate) fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// True when `cookie_path` is a segment-aligned prefix of `request_path`.
pub fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    let request_path = if request_path.is_empty() {
        "/"
    } else {
        request_path
    };

    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/')
            || request_path.as_bytes().get(cookie_path.len()) == Some(&b'/'))
}

/// Default cookie path for a request path: everything up to the last `/`.
pub fn default_path(request_path: &str) -> String {
    if !request_path.starts_with('/') {
        return "/".to_string();
    }
    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => request_path[..index].to_string(),
    }
}
