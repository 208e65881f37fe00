use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::config;
use crate::errors::HttpResult;

/// TLS protocol versions the socket may negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CryptoMethod {
    /// TLS 1.2 or 1.3.
    #[default]
    Any,
    Tls12,
    Tls13,
}

/// TLS settings of the socket transport.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TlsOptions {
    /// PEM file holding the client certificate chain and its private key.
    #[serde(rename = "sslCertificate")]
    pub certificate: Option<PathBuf>,

    /// Passphrase of the client key. Encrypted keys are not supported.
    #[serde(rename = "sslPassphrase")]
    pub passphrase: Option<String>,

    #[serde(rename = "sslVerifyPeer")]
    pub verify_peer: bool,

    /// PEM bundle of trusted roots, replacing the built-in set.
    #[serde(rename = "sslCaFile")]
    pub ca_file: Option<PathBuf>,

    #[serde(rename = "sslCryptoMethod")]
    pub crypto_method: CryptoMethod,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            certificate: None,
            passphrase: None,
            verify_peer: true,
            ca_file: None,
            crypto_method: CryptoMethod::Any,
        }
    }
}

/// Settings of the socket transport.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SocketOptions {
    /// Keep the connection open between calls to the same host:port.
    pub keep_alive: bool,

    /// Connect, read and write timeout in seconds. Zero disables it.
    pub timeout: u64,

    #[serde(flatten)]
    pub tls: TlsOptions,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            keep_alive: true,
            timeout: 30,
            tls: TlsOptions::default(),
        }
    }
}

impl SocketOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    #[must_use]
    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    #[must_use]
    pub fn with_verify_peer(mut self, verify_peer: bool) -> Self {
        self.tls.verify_peer = verify_peer;
        self
    }

    /// The timeout as a `Duration`, `None` when disabled.
    #[must_use]
    pub fn timeout_duration(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
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
