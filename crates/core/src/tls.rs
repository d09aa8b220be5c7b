//! TLS configuration and stream wrapping.
//!
//! Both sides use rustls with the ring provider. The server presents a PEM
//! certificate chain and key; the client either verifies the server against a
//! PEM CA bundle or, when verification is off, accepts any certificate while
//! still checking handshake signatures.

use crate::config::TlsConfig;
use crate::error::{ConfigError, Result, TransportError};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{
    ClientConfig, ClientConnection, DigitallySignedStruct, RootCertStore, ServerConfig,
    ServerConnection, SignatureScheme, StreamOwned,
};
use std::io::BufReader;
use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub type ServerTlsStream = StreamOwned<ServerConnection, TcpStream>;
pub type ClientTlsStream = StreamOwned<ClientConnection, TcpStream>;

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn invalid_material(origin: &str, reason: impl ToString) -> crate::Error {
    ConfigError::InvalidTlsMaterial {
        path: origin.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| invalid_material(&path.display().to_string(), e))
}

/// Parse every certificate in a PEM buffer.
pub fn parse_certs(pem: &[u8], origin: &str) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(pem);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| invalid_material(origin, format!("failed to parse certificate: {e}")))?;

    if certs.is_empty() {
        return Err(invalid_material(origin, "no certificates found in PEM data"));
    }
    Ok(certs)
}

/// Parse the first private key (PKCS#8, PKCS#1 or SEC1) in a PEM buffer.
pub fn parse_key(pem: &[u8], origin: &str) -> Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(pem);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| invalid_material(origin, format!("failed to parse private key: {e}")))?
        .ok_or_else(|| invalid_material(origin, "no private key found in PEM data"))
}

/// Server config from PEM certificate chain and key bytes.
pub fn server_config_from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Arc<ServerConfig>> {
    build_server_config(
        parse_certs(cert_pem, "certificate")?,
        parse_key(key_pem, "private key")?,
    )
}

/// Server config from the files named in `tls`.
pub fn server_config(tls: &TlsConfig) -> Result<Arc<ServerConfig>> {
    let cert_path = tls
        .cert_file
        .as_deref()
        .ok_or(ConfigError::MissingTlsMaterial("tls.cert_file"))?;
    let key_path = tls
        .key_file
        .as_deref()
        .ok_or(ConfigError::MissingTlsMaterial("tls.key_file"))?;

    build_server_config(
        parse_certs(&read_pem(cert_path)?, &cert_path.display().to_string())?,
        parse_key(&read_pem(key_path)?, &key_path.display().to_string())?,
    )
}

fn build_server_config(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<Arc<ServerConfig>> {
    let config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(TransportError::Tls)?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(TransportError::Tls)?;

    Ok(Arc::new(config))
}

/// Client config: verify against `tls.cert_file` when `tls.verify` is set,
/// otherwise accept any server certificate.
pub fn client_config(tls: &TlsConfig) -> Result<Arc<ClientConfig>> {
    let provider = provider();
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(TransportError::Tls)?;

    let config = if tls.verify {
        let ca_path = tls
            .cert_file
            .as_deref()
            .ok_or(ConfigError::MissingTlsMaterial("tls.cert_file"))?;
        let origin = ca_path.display().to_string();

        let mut roots = RootCertStore::empty();
        for cert in parse_certs(&read_pem(ca_path)?, &origin)? {
            roots.add(cert).map_err(|e| invalid_material(&origin, e))?;
        }
        builder.with_root_certificates(roots).with_no_client_auth()
    } else {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
            .with_no_client_auth()
    };

    Ok(Arc::new(config))
}

/// Run the server side of the handshake on an accepted socket.
pub fn accept(config: &Arc<ServerConfig>, mut sock: TcpStream) -> Result<ServerTlsStream> {
    let mut conn = ServerConnection::new(Arc::clone(config)).map_err(TransportError::Tls)?;
    while conn.is_handshaking() {
        conn.complete_io(&mut sock)?;
    }
    debug!(peer = ?sock.peer_addr().ok(), "TLS handshake complete");
    Ok(StreamOwned::new(conn, sock))
}

/// Run the client side of the handshake against `host`.
pub fn connect(config: &Arc<ClientConfig>, host: &str, mut sock: TcpStream) -> Result<ClientTlsStream> {
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| TransportError::InvalidServerName(host.to_string()))?;

    let mut conn =
        ClientConnection::new(Arc::clone(config), server_name).map_err(TransportError::Tls)?;
    while conn.is_handshaking() {
        conn.complete_io(&mut sock)?;
    }
    debug!(host, "TLS handshake complete");
    Ok(StreamOwned::new(conn, sock))
}

/// Skips certificate chain validation; signatures are still checked so the
/// peer must hold the key for the certificate it presents.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::path::PathBuf;

    fn self_signed() -> (String, String) {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        (certified.cert.pem(), certified.signing_key.serialize_pem())
    }

    #[test]
    fn test_server_config_from_generated_cert() {
        let (cert, key) = self_signed();
        assert!(server_config_from_pem(cert.as_bytes(), key.as_bytes()).is_ok());
    }

    #[test]
    fn test_server_config_from_files() {
        let (cert, key) = self_signed();
        let dir = tempfile::tempdir().unwrap();
        let cert_file = dir.path().join("cert.pem");
        let key_file = dir.path().join("key.pem");
        std::fs::write(&cert_file, cert).unwrap();
        std::fs::write(&key_file, key).unwrap();

        let tls = TlsConfig {
            enabled: true,
            verify: false,
            cert_file: Some(cert_file),
            key_file: Some(key_file),
        };
        assert!(server_config(&tls).is_ok());
    }

    #[test]
    fn test_missing_material() {
        let tls = TlsConfig {
            enabled: true,
            ..TlsConfig::default()
        };
        assert!(matches!(
            server_config(&tls),
            Err(Error::Config(ConfigError::MissingTlsMaterial("tls.cert_file")))
        ));

        let verifying = TlsConfig {
            enabled: true,
            verify: true,
            ..TlsConfig::default()
        };
        assert!(matches!(
            client_config(&verifying),
            Err(Error::Config(ConfigError::MissingTlsMaterial(_)))
        ));
    }

    #[test]
    fn test_unreadable_or_empty_pem() {
        assert!(matches!(
            parse_certs(b"not a certificate", "inline"),
            Err(Error::Config(ConfigError::InvalidTlsMaterial { .. }))
        ));
        assert!(matches!(
            parse_key(b"", "inline"),
            Err(Error::Config(ConfigError::InvalidTlsMaterial { .. }))
        ));

        let tls = TlsConfig {
            enabled: true,
            verify: false,
            cert_file: Some(PathBuf::from("/nonexistent/cert.pem")),
            key_file: Some(PathBuf::from("/nonexistent/key.pem")),
        };
        assert!(matches!(
            server_config(&tls),
            Err(Error::Config(ConfigError::InvalidTlsMaterial { .. }))
        ));
    }

    #[test]
    fn test_client_config_without_verification() {
        assert!(client_config(&TlsConfig::default()).is_ok());
    }
}
