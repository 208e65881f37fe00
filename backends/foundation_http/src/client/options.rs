use std::path::PathBuf;

use serde::Deserialize;

use crate::config;
use crate::errors::HttpResult;
use crate::transport::SocketOptions;

pub const DEFAULT_USER_AGENT: &str = concat!("foundation_http/", env!("CARGO_PKG_VERSION"));

/// Client behaviour plus the options handed to the socket transport.
///
/// Keys are camelCase so one TOML document can carry both layers:
///
/// ```toml
/// maxRedirects = 3
/// keepAlive = false
/// sslVerifyPeer = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientOptions {
    /// Redirects followed per call; zero disables following.
    pub max_redirects: u8,

    /// Keep the method and body on 301/302 instead of switching to GET.
    pub strict_redirects: bool,

    pub user_agent: String,

    /// URL-encode values passed to `Client::add_cookie`.
    pub encode_cookies: bool,

    #[serde(flatten)]
    pub transport: SocketOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_redirects: 5,
            strict_redirects: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            encode_cookies: true,
            transport: SocketOptions::default(),
        }
    }
}

impl ClientOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_redirects(mut self, max_redirects: u8) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    #[must_use]
    pub fn with_strict_redirects(mut self, strict: bool) -> Self {
        self.strict_redirects = strict;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn with_encode_cookies(mut self, encode: bool) -> Self {
        self.encode_cookies = encode;
        self
    }

    #[must_use]
    pub fn with_transport(mut self, transport: SocketOptions) -> Self {
        self.transport = transport;
        self
    }

    /// # Errors
    ///
    /// Returns `HttpError::Configuration` for documents that do not deserialize.
    pub fn from_toml_str(content: &str) -> HttpResult<Self> {
        config::from_toml_str(content)
    }

    /// # Errors
    ///
    /// Returns `HttpError::Configuration` when the file cannot be read or parsed.
    pub fn from_path(path: impl Into<PathBuf>) -> HttpResult<Self> {
        config::from_path(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::CryptoMethod;

    /// WHY: Callers rely on five redirects, lenient 301/302 and encoded cookies
    /// WHAT: Checks Default
    #[test]
    fn test_defaults() {
        let options = ClientOptions::default();
        assert_eq!(options.max_redirects, 5);
        assert!(!options.strict_redirects);
        assert!(options.encode_cookies);
        assert!(options.user_agent.starts_with("foundation_http/"));
        assert!(options.transport.keep_alive);
    }

    /// WHY: Client and transport options share one flat document
    /// WHAT: Loads both layers from TOML
    #[test]
    fn test_from_toml_str_flattens_transport() {
        let options = ClientOptions::from_toml_str(
            r#"
            maxRedirects = 2
            strictRedirects = true
            userAgent = "probe/1.0"
            keepAlive = false
            timeout = 5
            sslCryptoMethod = "tls13"
            "#,
        )
        .unwrap();

        assert_eq!(options.max_redirects, 2);
        assert!(options.strict_redirects);
        assert_eq!(options.user_agent, "probe/1.0");
        assert!(!options.transport.keep_alive);
        assert_eq!(options.transport.timeout, 5);
        assert_eq!(options.transport.tls.crypto_method, CryptoMethod::Tls13);
        assert!(options.encode_cookies);
    }

    /// WHY: A mistyped value must surface as a configuration error
    /// WHAT: Loads a string where a number is expected
    #[test]
    fn test_from_toml_str_rejects_bad_types() {
        let err = ClientOptions::from_toml_str("maxRedirects = \"many\"").unwrap_err();
        assert!(err.is_configuration());
    }
}
