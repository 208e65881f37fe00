//! TCP/TLS connection used by the socket transport.
//!
//! WHY: The socket keeps one open stream between calls and must tell whether that
//! stream still points at the host it is about to talk to.
//!
//! WHAT: `HttpStream` hides plain versus TLS streams behind `Read`/`Write`;
//! `Connection` adds buffering, the remote key and line reading.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::errors::{HttpError, HttpResult};

use super::dns::DnsResolver;

#[cfg(feature = "ssl-rustls")]
use super::tls::TlsStream;

/// Plain TCP or TLS over TCP.
pub enum HttpStream {
    Plain(TcpStream),
    #[cfg(feature = "ssl-rustls")]
    Tls(Box<TlsStream>),
}

impl core::fmt::Debug for HttpStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(stream) => write!(f, "HttpStream::Plain({:?})", stream.peer_addr().ok()),
            #[cfg(feature = "ssl-rustls")]
            Self::Tls(stream) => write!(f, "HttpStream::Tls({:?})", stream.sock.peer_addr().ok()),
        }
    }
}

impl HttpStream {
    fn tcp(&self) -> &TcpStream {
        match self {
            Self::Plain(stream) => stream,
            #[cfg(feature = "ssl-rustls")]
            Self::Tls(stream) => &stream.sock,
        }
    }
}

impl Read for HttpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(stream) => stream.read(buf),
            #[cfg(feature = "ssl-rustls")]
            Self::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for HttpStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(stream) => stream.write(buf),
            #[cfg(feature = "ssl-rustls")]
            Self::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(stream) => stream.flush(),
            #[cfg(feature = "ssl-rustls")]
            Self::Tls(stream) => stream.flush(),
        }
    }
}

/// Where a connection goes: host, port and whether TLS is on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub host: String,
    pub port: u16,
    pub secure: bool,
}

impl core::fmt::Display for Remote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// An open, buffered connection to one remote.
#[derive(Debug)]
pub struct Connection {
    reader: BufReader<HttpStream>,
    remote: Remote,
}

/// Resolves the remote and connects to the first address that answers.
///
/// # Errors
///
/// DNS failures and refused or timed out connects.
pub fn connect_tcp<R: DnsResolver>(
    remote: &Remote,
    resolver: &R,
    timeout: Option<Duration>,
) -> HttpResult<TcpStream> {
    let addrs = resolver.resolve(&remote.host, remote.port)?;

    let mut last_error = None;
    for addr in addrs {
        let attempt = match timeout {
            Some(duration) => TcpStream::connect_timeout(&addr, duration),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(tcp) => {
                tcp.set_read_timeout(timeout)?;
                tcp.set_write_timeout(timeout)?;
                tcp.set_nodelay(true)?;
                return Ok(tcp);
            }
            Err(err) => {
                tracing::debug!("Connect to {addr} failed: {err}");
                last_error = Some(err);
            }
        }
    }

    let reason = last_error.map_or_else(|| "no address answered".to_string(), |e| e.to_string());
    Err(HttpError::Connection(format!(
        "Unable to connect to {remote}: {reason}"
    )))
}

impl Connection {
    #[must_use]
    pub fn new(stream: HttpStream, remote: Remote) -> Self {
        tracing::info!("Connected to {remote}");
        Self {
            reader: BufReader::new(stream),
            remote,
        }
    }

    #[must_use]
    pub fn remote(&self) -> &Remote {
        &self.remote
    }

    #[must_use]
    pub fn is_for(&self, remote: &Remote) -> bool {
        &self.remote == remote
    }

    /// True when the peer closed the idle connection or sent unsolicited data.
    ///
    /// Pending bytes on a TLS socket are not conclusive (session tickets arrive after
    /// the handshake), so only EOF marks a TLS connection stale.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        if !self.reader.buffer().is_empty() {
            return true;
        }

        let stream = self.reader.get_ref();
        let tcp = stream.tcp();
        if tcp.set_nonblocking(true).is_err() {
            return true;
        }
        let mut probe = [0u8; 1];
        let stale = match tcp.peek(&mut probe) {
            Ok(0) => true,
            Ok(_) => matches!(stream, HttpStream::Plain(_)),
            Err(err) => err.kind() != io::ErrorKind::WouldBlock,
        };
        tcp.set_nonblocking(false).is_err() || stale
    }

    /// Reads one line without its line ending. `None` means EOF before any byte.
    ///
    /// # Errors
    ///
    /// I/O failures, or `HttpError::Protocol` when the line exceeds `max_length`.
    pub fn read_line(&mut self, max_length: usize) -> HttpResult<Option<String>> {
        read_line(&mut self.reader, max_length)
    }

    pub fn reader_mut(&mut self) -> &mut BufReader<HttpStream> {
        &mut self.reader
    }

    /// # Errors
    ///
    /// Write failures.
    pub fn write_all(&mut self, data: &[u8]) -> HttpResult<()> {
        self.reader.get_mut().write_all(data)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Flush failures.
    pub fn flush(&mut self) -> HttpResult<()> {
        self.reader.get_mut().flush()?;
        Ok(())
    }

    pub fn shutdown(mut self) {
        #[cfg(feature = "ssl-rustls")]
        if let HttpStream::Tls(stream) = self.reader.get_mut() {
            stream.conn.send_close_notify();
            if let Err(err) = stream.flush() {
                tracing::debug!("close_notify to {} failed: {err}", self.remote);
            }
        }

        if let Err(err) = self.reader.get_ref().tcp().shutdown(Shutdown::Both) {
            tracing::debug!("Shutdown of {} reported: {err}", self.remote);
        }
    }
}

/// Reads one line from `reader`, stripping CRLF or LF.
///
/// Returns `None` on EOF before any byte was read. A final line without a line ending
/// is returned as is.
///
/// # Errors
///
/// I/O failures, or `HttpError::Protocol` when no line ending shows up within
/// `max_length` bytes.
pub fn read_line<B: BufRead>(reader: &mut B, max_length: usize) -> HttpResult<Option<String>> {
    let mut buf = Vec::new();
    let limit = u64::try_from(max_length).unwrap_or(u64::MAX);
    let read = reader.take(limit).read_until(b'\n', &mut buf)?;

    if read == 0 {
        return Ok(None);
    }
    if buf.last() != Some(&b'\n') && buf.len() >= max_length {
        return Err(HttpError::Protocol(format!(
            "Line exceeds the maximum length of {max_length} bytes"
        )));
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}
