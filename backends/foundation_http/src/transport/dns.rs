use std::net::{SocketAddr, ToSocketAddrs};

use crate::errors::DnsError;

/// Turns a host and port into socket addresses.
///
/// Pluggable so tests and callers can pin hosts to known addresses.
pub trait DnsResolver: Send + Sync + Clone {
    /// Resolves `host:port`.
    ///
    /// # Errors
    ///
    /// Returns `DnsError` if resolution fails or yields nothing.
    fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, DnsError>;
}

/// Resolver using the operating system through `std::net::ToSocketAddrs`.
#[derive(Debug, Clone, Default)]
pub struct SystemDnsResolver;

impl SystemDnsResolver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl DnsResolver for SystemDnsResolver {
    fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, DnsError> {
        if host.is_empty() {
            return Err(DnsError::InvalidHost(host.to_string()));
        }

        // bracketed IPv6 literals come straight from the URL
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        let addrs: Vec<SocketAddr> = (bare, port)
            .to_socket_addrs()
            .map_err(|err| DnsError::ResolutionFailed(format!("{host}: {err}")))?
            .collect();

        if addrs.is_empty() {
            return Err(DnsError::NoAddressesFound(host.to_string()));
        }

        Ok(addrs)
    }
}

/// Resolves every host to one fixed address, ignoring the requested port.
#[derive(Debug, Clone)]
pub struct StaticSocketAddr(SocketAddr);

impl Default for StaticSocketAddr {
    /// Localhost, port 80.
    fn default() -> Self {
        Self(SocketAddr::from(([127, 0, 0, 1], 80)))
    }
}

impl StaticSocketAddr {
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl DnsResolver for StaticSocketAddr {
    fn resolve(&self, _host: &str, _port: u16) -> Result<Vec<SocketAddr>, DnsError> {
        Ok(vec![self.0])
    }
}
