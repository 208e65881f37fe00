//! High-level HTTP client.
//!
//! WHY: One logical call can take several round trips: redirects are followed, cookies
//! flow back and forth and default headers get merged in. Callers should only see the
//! final response.
//!
//! WHAT: [`Client`] owns a [`Transport`] and a [`CookieStore`], both injectable, and
//! drives the redirect loop over them.
//!
//! HOW: Each hop decorates the request, hands it to the transport, absorbs `Set-Cookie`
//! headers and, for a followable redirect, rebuilds the request for the new location.

mod auth;
mod options;
mod redirects;

pub use auth::{AuthType, Credentials};
pub use options::{ClientOptions, DEFAULT_USER_AGENT};
pub use redirects::{
    build_followup_request, resolve_location, strip_sensitive_headers_for_redirect,
    switches_to_get,
};

use crate::cookies::{Cookie, CookieStore, MemoryCookieStore};
use crate::entity::Body;
use crate::errors::{HttpError, HttpResult};
use crate::headers::{Headers, AUTHORIZATION, COOKIE, USER_AGENT};
use crate::message::{Request, Response};
use crate::transport::{Socket, Transport};

/// Anything that turns a request into a response.
pub trait Dispatchable {
    /// # Errors
    ///
    /// Whatever the underlying call fails with.
    fn dispatch(&mut self, request: Request) -> HttpResult<Response>;
}

/// HTTP client with redirect following and a cookie jar.
///
/// # Type Parameters
///
/// * `T` - transport the requests go through. Defaults to [`Socket`].
/// * `C` - cookie jar. Defaults to [`MemoryCookieStore`].
///
/// # Examples
///
/// ```ignore
/// let mut client = Client::new();
/// let response = client.get("http://example.com/")?;
/// ```
#[derive(Debug)]
pub struct Client<T: Transport = Socket, C: CookieStore = MemoryCookieStore> {
    options: ClientOptions,
    transport: T,
    cookies: C,
    headers: Headers,
    credentials: Option<Credentials>,
    redirect_counter: u8,
}

impl Client<Socket, MemoryCookieStore> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(ClientOptions::default())
    }

    #[must_use]
    pub fn with_options(options: ClientOptions) -> Self {
        let transport = Socket::with_options(options.transport.clone());
        Self::with_transport(options, transport)
    }
}

impl Default for Client<Socket, MemoryCookieStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> Client<T, MemoryCookieStore> {
    /// Client over a caller-provided transport with an empty in-memory jar.
    ///
    /// The transport is configured with `options.transport`.
    pub fn with_transport(options: ClientOptions, mut transport: T) -> Self {
        transport.configure(&options.transport);
        Self {
            options,
            transport,
            cookies: MemoryCookieStore::new(),
            headers: Headers::new(),
            credentials: None,
            redirect_counter: 0,
        }
    }
}

impl<T: Transport, C: CookieStore> Client<T, C> {
    /// Swaps the cookie jar, for example for a [`crate::cookies::SharedCookieStore`].
    #[must_use]
    pub fn with_cookie_store<S: CookieStore>(self, cookies: S) -> Client<T, S> {
        Client {
            options: self.options,
            transport: self.transport,
            cookies,
            headers: self.headers,
            credentials: self.credentials,
            redirect_counter: 0,
        }
    }

    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Replaces the options and reconfigures the transport.
    pub fn set_options(&mut self, options: ClientOptions) {
        self.transport.configure(&options.transport);
        self.options = options;
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    #[must_use]
    pub fn cookie_store(&self) -> &C {
        &self.cookies
    }

    pub fn cookie_store_mut(&mut self) -> &mut C {
        &mut self.cookies
    }

    /// Redirects followed by the last call.
    #[must_use]
    pub fn redirections_count(&self) -> u8 {
        self.redirect_counter
    }

    /// Headers added to every request that does not set them itself.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn set_headers(&mut self, headers: Headers) {
        self.headers = headers;
    }

    /// Sends `Authorization` on every request to the host a call starts at.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidArgument` for empty credentials or a Basic user name
    /// containing ':'.
    pub fn set_auth(&mut self, user: &str, password: &str, auth_type: AuthType) -> HttpResult<()> {
        self.credentials = Some(Credentials::new(user, password, auth_type)?);
        Ok(())
    }

    pub fn clear_auth(&mut self) {
        self.credentials = None;
    }

    /// Stores a cookie for `domain`, URL-encoding the value when `encode_cookies` is on.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidArgument` for an empty value or an invalid cookie.
    pub fn add_cookie(&mut self, name: &str, value: &str, domain: &str) -> HttpResult<()> {
        if value.is_empty() {
            return Err(HttpError::InvalidArgument(format!(
                "Cookie '{name}' has an empty value"
            )));
        }

        let value = if self.options.encode_cookies {
            url::form_urlencoded::byte_serialize(value.as_bytes()).collect::<String>()
        } else {
            value.to_string()
        };

        let cookie = Cookie::new(name, value, domain)?.with_http_only(true);
        self.cookies.add_cookie(cookie);
        Ok(())
    }

    /// Replaces the jar's content with `pairs`, all scoped to `domain`.
    ///
    /// # Errors
    ///
    /// Fails on the first pair `add_cookie` rejects; earlier pairs stay stored.
    pub fn set_cookies<'a, I>(&mut self, domain: &str, pairs: I) -> HttpResult<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.clear_cookies();
        for (name, value) in pairs {
            self.add_cookie(name, value, domain)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn cookies(&self) -> Vec<Cookie> {
        self.cookies.cookies()
    }

    pub fn clear_cookies(&mut self) {
        self.cookies.clear();
    }

    /// Performs one logical call, following redirects up to `max_redirects`.
    ///
    /// A 3xx response comes back when the limit is reached, when it carries no
    /// `Location`, or when its follow-up would have to replay a streamed body.
    ///
    /// # Errors
    ///
    /// Transport failures and unresolvable redirect locations. Reaching the redirect
    /// limit is not an error.
    pub fn send(&mut self, mut request: Request) -> HttpResult<Response> {
        self.redirect_counter = 0;
        let origin_host = request.uri().host_str().unwrap_or_default().to_ascii_lowercase();

        loop {
            self.prepare_request(&mut request, &origin_host)?;
            tracing::info!("Sending {} {}", request.method(), request.uri());

            let response = self.transport.send(&mut request)?;
            let stored = self
                .cookies
                .read_cookies_from_response(&response, request.uri());
            if stored > 0 {
                tracing::debug!("Stored {stored} cookies from {}", request.uri());
            }

            if !response.is_redirect() || self.redirect_counter >= self.options.max_redirects {
                return Ok(response);
            }
            let Some(location) = response.location() else {
                return Ok(response);
            };

            let target = resolve_location(request.uri(), location)?;
            tracing::info!("Following {} redirect to {target}", response.status());

            match build_followup_request(
                request,
                response.status(),
                target,
                self.options.strict_redirects,
            )? {
                Some(next) => {
                    request = next;
                    self.redirect_counter += 1;
                }
                None => return Ok(response),
            }
        }
    }

    /// # Errors
    ///
    /// Invalid URI or a failed call.
    pub fn get(&mut self, uri: &str) -> HttpResult<Response> {
        self.send(Request::get(uri)?)
    }

    /// # Errors
    ///
    /// Invalid URI or a failed call.
    pub fn post(&mut self, uri: &str, body: impl Into<Body>) -> HttpResult<Response> {
        self.send(Request::post(uri)?.with_body(body))
    }

    /// # Errors
    ///
    /// Invalid URI or a failed call.
    pub fn put(&mut self, uri: &str, body: impl Into<Body>) -> HttpResult<Response> {
        self.send(Request::put(uri)?.with_body(body))
    }

    /// # Errors
    ///
    /// Invalid URI or a failed call.
    pub fn delete(&mut self, uri: &str) -> HttpResult<Response> {
        self.send(Request::delete(uri)?)
    }

    fn prepare_request(&mut self, request: &mut Request, origin_host: &str) -> HttpResult<()> {
        let same_origin = request
            .uri()
            .host_str()
            .is_some_and(|host| host.eq_ignore_ascii_case(origin_host));

        for header in &self.headers {
            if header.is(AUTHORIZATION) && !same_origin {
                continue;
            }
            if !request.headers().has(header.name()) {
                request.headers_mut().add_header(header.clone());
            }
        }

        if !self.options.user_agent.is_empty() && !request.headers().has(USER_AGENT) {
            request
                .headers_mut()
                .set(USER_AGENT, self.options.user_agent.clone())?;
        }

        if let Some(credentials) = &self.credentials {
            if same_origin && !request.headers().has(AUTHORIZATION) {
                request
                    .headers_mut()
                    .set(AUTHORIZATION, credentials.header_value())?;
            }
        }

        if let Some(cookie_header) = self.cookies.get_cookies_for_request(request) {
            request.headers_mut().set(COOKIE, cookie_header)?;
        }
        Ok(())
    }
}

impl<T: Transport, C: CookieStore> Dispatchable for Client<T, C> {
    fn dispatch(&mut self, request: Request) -> HttpResult<Response> {
        self.send(request)
    }
}
