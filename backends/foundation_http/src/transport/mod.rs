//! Wire transports.
//!
//! A [`Transport`] turns one request into one response. [`Socket`] speaks HTTP/1.x over
//! TCP or TLS; [`TestTransport`] replays scripted responses.

pub mod chunked;
mod connection;
mod dns;
pub mod encoding;
mod mock;
mod options;
mod socket;
#[cfg(feature = "ssl-rustls")]
mod tls;

use crate::errors::HttpResult;
use crate::message::{Request, Response};

pub use connection::Remote;
pub use dns::{DnsResolver, StaticSocketAddr, SystemDnsResolver};
pub use encoding::{BodyFilter, ContentEncodings, FilterFactory};
pub use mock::{SentRequest, TestTransport};
pub use options::{CryptoMethod, SocketOptions, TlsOptions};
pub use socket::{Socket, SocketState, DEFAULT_MAX_LINE_LENGTH};
#[cfg(feature = "ssl-rustls")]
pub use tls::RustlsConnector;

/// Sends one request over the wire and reads one response.
///
/// The transport may add headers it needs (`Host`, `Connection`, framing) and consumes
/// streamed bodies.
pub trait Transport {
    /// # Errors
    ///
    /// Connection, protocol and configuration failures; the response is discarded.
    fn send(&mut self, request: &mut Request) -> HttpResult<Response>;

    /// Applies new socket-level options. Transports without sockets ignore them.
    fn configure(&mut self, _options: &SocketOptions) {}
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, request: &mut Request) -> HttpResult<Response> {
        (**self).send(request)
    }

    fn configure(&mut self, options: &SocketOptions) {
        (**self).configure(options);
    }
}
