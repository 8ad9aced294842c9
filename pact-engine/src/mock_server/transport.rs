//! Connection wrappers for mock server listeners.

use crate::error::Result;
use async_trait::async_trait;
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use std::{fmt::Debug, io, sync::Arc};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_rustls::TlsAcceptor;

/// A byte stream hyper can serve HTTP over.
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> TransportStream for T {}

/// A named transport layered over accepted TCP connections.
#[async_trait]
pub trait CustomTransport: Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Scheme of the server URL.
    fn scheme(&self) -> &str {
        "http"
    }

    async fn accept(&self, stream: TcpStream) -> io::Result<Box<dyn TransportStream>>;
}

/// TLS with a CA and server certificate generated per mock server.
#[derive(Clone)]
pub struct TlsTransport {
    acceptor: TlsAcceptor,
    ca_certificate: String,
}

impl TlsTransport {
    pub fn generate(host: &str) -> Result<Self> {
        let ca_key = KeyPair::generate()?;
        let mut ca_params = CertificateParams::new(Vec::<String>::new())?;
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "Pact mock server CA");
        let ca = ca_params.self_signed(&ca_key)?;

        let mut names = vec!["localhost".to_string(), "127.0.0.1".to_string()];
        if !names.iter().any(|name| name == host) {
            names.push(host.to_string());
        }
        let server_key = KeyPair::generate()?;
        let mut server_params = CertificateParams::new(names)?;
        server_params
            .distinguished_name
            .push(DnType::CommonName, "Pact mock server");
        let server = server_params.signed_by(&server_key, &ca, &ca_key)?;

        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(server_key.serialize_der()));
        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![server.der().clone(), ca.der().clone()], key)?;

        Ok(TlsTransport {
            acceptor: TlsAcceptor::from(Arc::new(config)),
            ca_certificate: ca.pem(),
        })
    }

    /// PEM of the CA that signed the server certificate.
    pub fn ca_certificate(&self) -> &str {
        &self.ca_certificate
    }
}

impl Debug for TlsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl CustomTransport for TlsTransport {
    fn name(&self) -> &str {
        "https"
    }

    fn scheme(&self) -> &str {
        "https"
    }

    async fn accept(&self, stream: TcpStream) -> io::Result<Box<dyn TransportStream>> {
        let stream = self.acceptor.accept(stream).await?;
        Ok(Box::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_a_ca_certificate() {
        let transport = TlsTransport::generate("127.0.0.1").unwrap();
        assert!(transport.ca_certificate().starts_with("-----BEGIN CERTIFICATE-----"));
        assert_eq!(transport.scheme(), "https");
    }
}
