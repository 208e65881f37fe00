use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use url::Url;

use crate::errors::{HttpError, HttpResult};
use crate::headers::SET_COOKIE;
use crate::message::{Request, Response};

use super::cookie::{default_path, normalize_domain, Cookie};
use super::set_cookie::SetCookie;

/// A cookie jar.
///
/// WHY: The client needs one place that remembers what servers set and decides which
/// cookies go back out on each request, and callers may want to bring their own
/// storage.
///
/// WHAT: Implementors provide storage (`add_cookie`, `get_matching_cookies`, `cookies`,
/// `clear`); header absorption and `Cookie` header rendering are provided on top.
///
/// HOW: Matching evicts expired cookies as it finds them, so the jar never needs a
/// background sweep.
pub trait CookieStore {
    /// Inserts a cookie, replacing one with the same `(name, domain, path)`.
    fn add_cookie(&mut self, cookie: Cookie);

    /// Non-expired cookies that apply to `url`, in insertion order.
    ///
    /// `now` defaults to the current time. Expired cookies met along the way are
    /// removed.
    fn get_matching_cookies(
        &mut self,
        url: &Url,
        include_session_cookies: bool,
        now: Option<DateTime<Utc>>,
    ) -> Vec<Cookie>;

    /// Snapshot of every stored cookie.
    fn cookies(&self) -> Vec<Cookie>;

    fn clear(&mut self);

    fn len(&self) -> usize {
        self.cookies().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores a parsed `Set-Cookie` header. The header must carry a domain.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidArgument` when the domain is missing or the cookie
    /// is invalid.
    fn add_cookie_from_header(&mut self, header: &SetCookie) -> HttpResult<()> {
        let domain = header.domain.as_deref().ok_or_else(|| {
            HttpError::InvalidArgument(format!("Cookie '{}' has no domain", header.name))
        })?;

        let cookie = Cookie::new(&header.name, &header.value, domain)?
            .with_path(header.path.clone().unwrap_or_else(|| "/".to_string()))
            .with_expires(header.expires_at(Utc::now()))
            .with_secure(header.secure)
            .with_http_only(header.http_only);

        self.add_cookie(cookie);
        Ok(())
    }

    /// Absorbs every `Set-Cookie` header of `response`.
    ///
    /// A missing domain defaults to the request host (host-only) and a missing path to
    /// the directory of the request path. Headers that do not parse, or whose domain
    /// does not cover the request host, are skipped. Returns how many were stored.
    fn read_cookies_from_response(&mut self, response: &Response, request_url: &Url) -> usize {
        let Some(host) = request_url.host_str() else {
            return 0;
        };
        let host = normalize_domain(host);
        let now = Utc::now();
        let mut stored = 0;

        for raw in response.headers().get_all(SET_COOKIE) {
            let header = match SetCookie::parse(raw) {
                Ok(header) => header,
                Err(err) => {
                    tracing::warn!("Skipping Set-Cookie header: {err}");
                    continue;
                }
            };

            let (domain, host_only) = match header.domain.as_deref() {
                Some(domain) => (normalize_domain(domain), false),
                None => (host.clone(), true),
            };
            let path = header
                .path
                .clone()
                .unwrap_or_else(|| default_path(request_url.path()));

            let cookie = match Cookie::new(&header.name, &header.value, &domain) {
                Ok(cookie) => cookie
                    .with_path(path)
                    .with_expires(header.expires_at(now))
                    .with_secure(header.secure)
                    .with_http_only(header.http_only)
                    .with_host_only(host_only),
                Err(err) => {
                    tracing::warn!("Skipping Set-Cookie header: {err}");
                    continue;
                }
            };

            if !cookie.matches_domain(&host) {
                tracing::warn!(
                    "Rejecting cookie '{}' for domain '{}' set by host '{host}'",
                    cookie.name(),
                    cookie.domain()
                );
                continue;
            }

            self.add_cookie(cookie);
            stored += 1;
        }

        stored
    }

    /// Serialized `Cookie` header value for `request`, or `None` when nothing matches.
    ///
    /// When several cookies share a name only the one with the longest path is sent,
    /// the most recently written one winning ties.
    fn get_cookies_for_request(&mut self, request: &Request) -> Option<String> {
        let matches = self.get_matching_cookies(request.uri(), true, None);

        let mut selected: Vec<Cookie> = Vec::with_capacity(matches.len());
        for cookie in matches {
            match selected.iter_mut().find(|c| c.name() == cookie.name()) {
                Some(existing) => {
                    let longer = cookie.path().len() > existing.path().len();
                    let newer = cookie.path().len() == existing.path().len()
                        && cookie.write_sequence() > existing.write_sequence();
                    if longer || newer {
                        *existing = cookie;
                    }
                }
                None => selected.push(cookie),
            }
        }

        if selected.is_empty() {
            return None;
        }

        Some(
            selected
                .iter()
                .map(Cookie::to_pair)
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// In-memory cookie jar.
#[derive(Debug, Default, Clone)]
pub struct MemoryCookieStore {
    cookies: Vec<Cookie>,
    sequence: u64,
}

impl MemoryCookieStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CookieStore for MemoryCookieStore {
    fn add_cookie(&mut self, mut cookie: Cookie) {
        self.sequence += 1;
        cookie.set_write_sequence(self.sequence);

        match self.cookies.iter_mut().find(|c| c.same_identity(&cookie)) {
            Some(existing) => *existing = cookie,
            None => self.cookies.push(cookie),
        }
    }

    fn get_matching_cookies(
        &mut self,
        url: &Url,
        include_session_cookies: bool,
        now: Option<DateTime<Utc>>,
    ) -> Vec<Cookie> {
        let now = now.unwrap_or_else(Utc::now);

        let before = self.cookies.len();
        self.cookies.retain(|cookie| !cookie.is_expired(now));
        if self.cookies.len() != before {
            tracing::debug!("Evicted {} expired cookies", before - self.cookies.len());
        }

        self.cookies
            .iter()
            .filter(|cookie| include_session_cookies || !cookie.is_session())
            .filter(|cookie| cookie.matches_url(url))
            .cloned()
            .collect()
    }

    fn cookies(&self) -> Vec<Cookie> {
        self.cookies.clone()
    }

    fn clear(&mut self) {
        self.cookies.clear();
    }

    fn len(&self) -> usize {
        self.cookies.len()
    }
}

/// A [`MemoryCookieStore`] shared between clients behind a mutex.
#[derive(Debug, Default, Clone)]
pub struct SharedCookieStore {
    inner: Arc<Mutex<MemoryCookieStore>>,
}

impl SharedCookieStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryCookieStore> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CookieStore for SharedCookieStore {
    fn add_cookie(&mut self, cookie: Cookie) {
        self.lock().add_cookie(cookie);
    }

    fn get_matching_cookies(
        &mut self,
        url: &Url,
        include_session_cookies: bool,
        now: Option<DateTime<Utc>>,
    ) -> Vec<Cookie> {
        self.lock()
            .get_matching_cookies(url, include_session_cookies, now)
    }

    fn cookies(&self) -> Vec<Cookie> {
        self.lock().cookies()
    }

    fn clear(&mut self) {
        self.lock().clear();
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn url(value: &str) -> Url {
        Url::parse(value).unwrap()
    }

    /// WHY: Same (name, domain, path) must keep one entry with the latest value
    /// WHAT: Adds the same cookie twice and one with a different path
    #[test]
    fn test_add_cookie_replaces_same_identity() {
        let mut store = MemoryCookieStore::new();
        store.add_cookie(Cookie::new("a", "1", "example.com").unwrap());
        store.add_cookie(Cookie::new("b", "x", "example.com").unwrap());
        store.add_cookie(Cookie::new("a", "2", "example.com").unwrap());
        store.add_cookie(Cookie::new("a", "3", "example.com").unwrap().with_path("/sub"));

        assert_eq!(store.len(), 3);
        let cookies = store.cookies();
        assert_eq!(cookies[0].name(), "a");
        assert_eq!(cookies[0].value(), "2");
        assert_eq!(cookies[1].name(), "b");
    }

    /// WHY: Matching combines domain, path, secure and expiry rules
    /// WHAT: Stores several cookies and matches them against one URL
    #[test]
    fn test_get_matching_cookies_applies_all_rules() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut store = MemoryCookieStore::new();
        store.add_cookie(Cookie::new("root", "1", "example.com").unwrap());
        store.add_cookie(Cookie::new("foo", "1", "example.com").unwrap().with_path("/foo"));
        store.add_cookie(Cookie::new("other", "1", "notexample.com").unwrap());
        store.add_cookie(Cookie::new("sec", "1", "example.com").unwrap().with_secure(true));
        store.add_cookie(
            Cookie::new("old", "1", "example.com")
                .unwrap()
                .with_expires(Some(now - Duration::seconds(1))),
        );
        store.add_cookie(
            Cookie::new("kept", "1", "example.com")
                .unwrap()
                .with_expires(Some(now + Duration::days(1))),
        );

        let names: Vec<String> = store
            .get_matching_cookies(&url("http://www.example.com/foo/bar"), true, Some(now))
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["root", "foo", "kept"]);

        // expired cookie evicted lazily
        assert_eq!(store.len(), 5);

        let names: Vec<String> = store
            .get_matching_cookies(&url("https://example.com/foobar"), false, Some(now))
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["kept"]);
    }

    /// WHY: The Cookie header sends one value per name, the most specific one
    /// WHAT: Two cookies named "id" on different paths
    #[test]
    fn test_get_cookies_for_request_prefers_longest_path() {
        let mut store = MemoryCookieStore::new();
        store.add_cookie(Cookie::new("id", "root", "example.com").unwrap());
        store.add_cookie(Cookie::new("lang", "en", "example.com").unwrap());
        store.add_cookie(Cookie::new("id", "deep", "example.com").unwrap().with_path("/app"));

        let request = Request::get("http://example.com/app/page").unwrap();
        assert_eq!(
            store.get_cookies_for_request(&request).as_deref(),
            Some("id=deep; lang=en")
        );

        let request = Request::get("http://example.com/other").unwrap();
        assert_eq!(
            store.get_cookies_for_request(&request).as_deref(),
            Some("id=root; lang=en")
        );
    }

    /// WHY: Equal paths under different domains tie, the latest write wins
    /// WHAT: Rewrites the first cookie after the second was stored
    #[test]
    fn test_get_cookies_for_request_tie_goes_to_latest_write() {
        let mut store = MemoryCookieStore::new();
        store.add_cookie(Cookie::new("id", "one", "example.com").unwrap());
        store.add_cookie(Cookie::new("id", "two", "www.example.com").unwrap());
        store.add_cookie(Cookie::new("id", "three", "example.com").unwrap());

        let request = Request::get("http://www.example.com/").unwrap();
        assert_eq!(
            store.get_cookies_for_request(&request).as_deref(),
            Some("id=three")
        );

        let request = Request::get("http://elsewhere.org/").unwrap();
        assert_eq!(store.get_cookies_for_request(&request), None);
    }

    /// WHY: Response cookies without Domain/Path need sensible defaults
    /// WHAT: Reads Set-Cookie headers and checks host-only and default path
    #[test]
    fn test_read_cookies_from_response_defaults() {
        let response = Response::new(200)
            .unwrap()
            .with_header("Set-Cookie", "session=abc")
            .unwrap()
            .with_header("Set-Cookie", "wide=1; Domain=example.com; Path=/")
            .unwrap()
            .with_header("Set-Cookie", "evil=1; Domain=attacker.org")
            .unwrap()
            .with_header("Set-Cookie", "garbage")
            .unwrap();

        let mut store = MemoryCookieStore::new();
        let stored =
            store.read_cookies_from_response(&response, &url("http://www.example.com/docs/page"));
        assert_eq!(stored, 2);

        let cookies = store.cookies();
        assert_eq!(cookies[0].domain(), "www.example.com");
        assert!(cookies[0].is_host_only());
        assert_eq!(cookies[0].path(), "/docs");
        assert!(!cookies[1].is_host_only());

        let names: Vec<String> = store
            .get_matching_cookies(&url("http://api.example.com/docs"), true, None)
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["wide"]);
    }

    /// WHY: add_cookie_from_header stores explicit header data only
    /// WHAT: Requires a domain
    #[test]
    fn test_add_cookie_from_header_requires_domain() {
        let mut store = MemoryCookieStore::new();
        let header = SetCookie::parse("a=1; Path=/x").unwrap();
        assert!(store.add_cookie_from_header(&header).unwrap_err().is_invalid_argument());

        let header = SetCookie::parse("a=1; Domain=example.com; Max-Age=100").unwrap();
        store.add_cookie_from_header(&header).unwrap();
        assert!(!store.cookies()[0].is_session());
    }

    /// WHY: One jar can serve several clients
    /// WHAT: Writes through one handle and reads through a clone
    #[test]
    fn test_shared_store_is_shared() {
        let mut first = SharedCookieStore::new();
        let second = first.clone();
        first.add_cookie(Cookie::new("a", "1", "example.com").unwrap());
        assert_eq!(second.len(), 1);

        let mut second = second;
        second.clear();
        assert!(first.is_empty());
    }
}
