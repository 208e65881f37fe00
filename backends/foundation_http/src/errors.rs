use derive_more::From;
use std::io;

pub type HttpResult<T> = std::result::Result<T, HttpError>;

/// DNS resolution errors.
///
/// These errors occur during DNS hostname resolution.
#[derive(From, Debug, Clone)]
pub enum DnsError {
    /// DNS resolution failed for the given hostname.
    #[from(ignore)]
    ResolutionFailed(String),

    /// Invalid hostname provided.
    #[from(ignore)]
    InvalidHost(String),

    /// No addresses found for the given hostname.
    #[from(ignore)]
    NoAddressesFound(String),

    /// I/O error during DNS resolution.
    #[from(ignore)]
    IoError(String),
}

impl From<io::Error> for DnsError {
    fn from(err: io::Error) -> Self {
        DnsError::IoError(err.to_string())
    }
}

impl std::error::Error for DnsError {}

impl core::fmt::Display for DnsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResolutionFailed(host) => {
                write!(f, "DNS resolution failed for host: {host}")
            }
            Self::InvalidHost(host) => {
                write!(f, "Invalid hostname: {host}")
            }
            Self::NoAddressesFound(host) => {
                write!(f, "No addresses found for host: {host}")
            }
            Self::IoError(err) => {
                write!(f, "I/O error during DNS resolution: {err}")
            }
        }
    }
}

/// Errors raised by the HTTP engine.
///
/// WHY: Callers need to tell apart a bad configuration, a broken connection, a server
/// speaking broken HTTP and a bad value they passed in. All four are fatal to the
/// current `send` call and none are retried internally.
///
/// WHAT: One enum with a variant per category, each carrying a readable message.
#[derive(From, Debug)]
pub enum HttpError {
    /// Invalid or missing configuration (unsupported TLS option, empty scripted transport).
    #[from(ignore)]
    Configuration(String),

    /// TCP connect, TLS handshake, read/write failure, timeout or premature EOF.
    #[from(ignore)]
    Connection(String),

    /// The peer sent something that is not valid HTTP/1.x.
    #[from(ignore)]
    Protocol(String),

    /// A caller supplied value was rejected (method token, URI, cookie, credentials).
    #[from(ignore)]
    InvalidArgument(String),

    /// DNS resolution error, surfaced as a connection failure category.
    #[from]
    Dns(DnsError),
}

impl HttpError {
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Dns(_))
    }

    #[must_use]
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}

impl std::error::Error for HttpError {}

impl From<io::Error> for HttpError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                HttpError::Connection(format!("operation timed out: {err}"))
            }
            _ => HttpError::Connection(err.to_string()),
        }
    }
}

impl From<url::ParseError> for HttpError {
    fn from(err: url::ParseError) -> Self {
        HttpError::InvalidArgument(format!("Invalid URI: {err}"))
    }
}

impl From<toml::de::Error> for HttpError {
    fn from(err: toml::de::Error) -> Self {
        HttpError::Configuration(format!("failed to deserialize options: {err}"))
    }
}

#[cfg(feature = "ssl-rustls")]
impl From<rustls::Error> for HttpError {
    fn from(err: rustls::Error) -> Self {
        HttpError::Connection(format!("Unable to enable crypto on TCP connection: {err}"))
    }
}

impl core::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            Self::Connection(msg) => write!(f, "Connection error: {msg}"),
            Self::Protocol(msg) => write!(f, "Protocol error: {msg}"),
            Self::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            Self::Dns(err) => write!(f, "DNS error: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// WHY: Verify DnsError::ResolutionFailed creates correct error message
    /// WHAT: Tests that the error message includes the hostname
    #[test]
    fn test_dns_error_resolution_failed_display() {
        let error = DnsError::ResolutionFailed("example.com".to_string());
        let display = format!("{error}");
        assert!(display.contains("DNS resolution failed"));
        assert!(display.contains("example.com"));
    }

    /// WHY: DNS failures must count as connection failures for callers
    /// WHAT: Converts a DnsError and checks the category helpers
    #[test]
    fn test_dns_error_is_connection_category() {
        let error = HttpError::from(DnsError::NoAddressesFound("localhost".into()));
        assert!(error.is_connection());
        assert!(!error.is_protocol());
        assert!(format!("{error}").contains("localhost"));
    }

    /// WHY: Timeouts surface from std as io errors and must read as connection errors
    /// WHAT: Converts a TimedOut io::Error and checks message and category
    #[test]
    fn test_io_timeout_becomes_connection_error() {
        let error = HttpError::from(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert!(error.is_connection());
        assert!(format!("{error}").contains("timed out"));
    }

    /// WHY: Bad URIs are caller mistakes, not connection problems
    /// WHAT: Converts a url::ParseError into InvalidArgument
    #[test]
    fn test_url_parse_error_is_invalid_argument() {
        let err = url::Url::parse("not a url").unwrap_err();
        let error = HttpError::from(err);
        assert!(error.is_invalid_argument());
    }

    /// WHY: Verify error types implement std::error::Error trait
    /// WHAT: Tests that errors can be used with error handling infrastructure
    #[test]
    fn test_errors_implement_std_error() {
        let dns_error: &dyn std::error::Error = &DnsError::InvalidHost(String::new());
        let http_error: &dyn std::error::Error = &HttpError::Protocol("bad".to_string());

        assert!(!dns_error.to_string().is_empty());
        assert!(!http_error.to_string().is_empty());
    }
}
