//! rustls client setup for the socket transport.

use std::net::TcpStream;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, verify_tls12_signature, verify_tls13_signature, WebPkiSupportedAlgorithms};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{
    ClientConfig, ClientConnection, DigitallySignedStruct, RootCertStore, SignatureScheme,
    StreamOwned, SupportedProtocolVersion,
};

use crate::errors::{HttpError, HttpResult};

use super::options::{CryptoMethod, TlsOptions};

pub type TlsStream = StreamOwned<ClientConnection, TcpStream>;

/// Builds client TLS sessions from [`TlsOptions`].
#[derive(Clone)]
pub struct RustlsConnector(Arc<ClientConfig>);

impl core::fmt::Debug for RustlsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RustlsConnector").finish()
    }
}

impl RustlsConnector {
    /// # Errors
    ///
    /// Returns `HttpError::Configuration` for a passphrase, unreadable CA or
    /// certificate files, or a protocol set rustls refuses.
    pub fn from_options(options: &TlsOptions) -> HttpResult<Self> {
        if options.passphrase.is_some() {
            return Err(HttpError::Configuration(
                "encrypted client keys are not supported, remove sslPassphrase and provide an unencrypted key"
                    .to_string(),
            ));
        }

        let provider = Arc::new(ring::default_provider());
        let versions: &[&'static SupportedProtocolVersion] = match options.crypto_method {
            CryptoMethod::Any => rustls::DEFAULT_VERSIONS,
            CryptoMethod::Tls12 => &[&rustls::version::TLS12],
            CryptoMethod::Tls13 => &[&rustls::version::TLS13],
        };

        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(versions)
            .map_err(|err| HttpError::Configuration(format!("TLS protocol versions: {err}")))?;

        let builder = if options.verify_peer {
            builder.with_root_certificates(root_store(options)?)
        } else {
            tracing::warn!("TLS peer verification is disabled");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert {
                    algorithms: provider.signature_verification_algorithms,
                }))
        };

        let config = match &options.certificate {
            Some(path) => {
                let certs = CertificateDer::pem_file_iter(path)
                    .and_then(|certs| certs.collect::<Result<Vec<_>, _>>())
                    .map_err(|err| {
                        HttpError::Configuration(format!(
                            "unable to read client certificate {}: {err}",
                            path.display()
                        ))
                    })?;
                let key = PrivateKeyDer::from_pem_file(path).map_err(|err| {
                    HttpError::Configuration(format!(
                        "unable to read client key {}: {err}",
                        path.display()
                    ))
                })?;
                builder
                    .with_client_auth_cert(certs, key)
                    .map_err(|err| HttpError::Configuration(format!("client certificate: {err}")))?
            }
            None => builder.with_no_client_auth(),
        };

        Ok(Self(Arc::new(config)))
    }

    /// Runs the TLS handshake over a connected TCP stream.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Connection` when the handshake fails.
    pub fn handshake(&self, host: &str, mut tcp: TcpStream) -> HttpResult<TlsStream> {
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        let server_name = ServerName::try_from(bare.to_string())
            .map_err(|err| HttpError::InvalidArgument(format!("invalid TLS server name {host}: {err}")))?;

        let mut session = ClientConnection::new(self.0.clone(), server_name)?;
        while session.is_handshaking() {
            session.complete_io(&mut tcp).map_err(|err| {
                HttpError::Connection(format!(
                    "Unable to enable crypto on TCP connection {host}: {err}"
                ))
            })?;
        }

        tracing::debug!(
            "TLS enabled for {host} ({:?})",
            session.protocol_version()
        );
        Ok(StreamOwned::new(session, tcp))
    }
}

fn root_store(options: &TlsOptions) -> HttpResult<RootCertStore> {
    let Some(ca_file) = &options.ca_file else {
        return Ok(RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        });
    };

    let read_error = |err: &dyn std::fmt::Display| {
        HttpError::Configuration(format!("unable to read CA file {}: {err}", ca_file.display()))
    };

    let mut store = RootCertStore::empty();
    for cert in CertificateDer::pem_file_iter(ca_file).map_err(|err| read_error(&err))? {
        let cert = cert.map_err(|err| read_error(&err))?;
        store.add(cert).map_err(|err| read_error(&err))?;
    }

    if store.is_empty() {
        return Err(HttpError::Configuration(format!(
            "CA file {} holds no certificates",
            ca_file.display()
        )));
    }
    Ok(store)
}

/// Accepts any server certificate while still checking handshake signatures.
#[derive(Debug)]
struct AcceptAnyServerCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
