//! TLS contexts for both sides of the relay.
//!
//! # Responsibilities
//! - Build the server context presented to streaming clients
//! - Build the mutual-TLS client context presented to the real host
//! - Decide which host certificates are acceptable ([`TrustPolicy`])
//! - Recognize certificate rejections inside opaque transport errors
//!
//! # Design Decisions
//! - The ring provider is selected explicitly; no process-wide default is installed
//! - Host certificates are self-signed, so chain validation is replaced by either
//!   "accept anything" or an exact DER pin. Handshake signatures are always checked.

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, ServerConfig, SignatureScheme};
use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

use crate::identity::{IdentityError, IdentityProvider};

/// Errors raised while assembling a TLS context.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("TLS configuration rejected: {0}")]
    Rustls(#[from] rustls::Error),

    #[error("unusable pinned certificate {}: {reason}", path.display())]
    PinnedCertificate { path: PathBuf, reason: String },
}

/// Which host certificates the client side accepts.
#[derive(Debug, Clone, Default)]
pub enum TrustPolicy {
    /// Any certificate is accepted. Each acceptance is logged at warn level.
    #[default]
    AcceptAnyCertificate,
    /// Only this exact certificate is accepted.
    Pinned(CertificateDer<'static>),
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Server context presenting `identity`. Client certificates are not requested.
pub fn server_config(identity: &dyn IdentityProvider) -> Result<Arc<ServerConfig>, TlsError> {
    let chain = identity.certificate_chain()?;
    let key = identity.private_key()?;

    let config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(chain, key)?;

    Ok(Arc::new(config))
}

/// Acceptor wrapping [`server_config`].
pub fn acceptor(identity: &dyn IdentityProvider) -> Result<TlsAcceptor, TlsError> {
    Ok(TlsAcceptor::from(server_config(identity)?))
}

/// Client context presenting `identity` and verifying the host per `trust`.
pub fn client_config(identity: &dyn IdentityProvider, trust: &TrustPolicy) -> Result<ClientConfig, TlsError> {
    let chain = identity.certificate_chain()?;
    let key = identity.private_key()?;
    let provider = provider();

    let verifier: Arc<dyn ServerCertVerifier> = match trust {
        TrustPolicy::AcceptAnyCertificate => Arc::new(AcceptAnyVerifier::new(&provider)),
        TrustPolicy::Pinned(cert) => Arc::new(PinnedVerifier::new(cert.clone(), &provider)),
    };

    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_client_auth_cert(chain, key)?;

    Ok(config)
}

/// Read the first certificate of a PEM file for [`TrustPolicy::Pinned`].
pub fn load_pinned_certificate(path: &Path) -> Result<CertificateDer<'static>, TlsError> {
    let bad = |reason: String| TlsError::PinnedCertificate {
        path: path.to_path_buf(),
        reason,
    };

    let pem = std::fs::read(path).map_err(|e| bad(e.to_string()))?;
    let first = rustls_pemfile::certs(&mut pem.as_slice())
        .next()
        .ok_or_else(|| bad("no PEM certificate blocks".to_string()))?
        .map_err(|e| bad(e.to_string()));
    first
}

/// Whether `err`, or anything it wraps, is a rejected peer certificate.
///
/// `io::Error` does not expose its payload through `source()`, so payloads
/// are inspected separately.
pub fn is_certificate_error(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if matches!(e.downcast_ref::<rustls::Error>(), Some(rustls::Error::InvalidCertificate(_))) {
            return true;
        }
        if let Some(inner) = e.downcast_ref::<std::io::Error>().and_then(|io| io.get_ref()) {
            if is_certificate_error(inner) {
                return true;
            }
        }
        current = e.source();
    }
    false
}

#[derive(Debug)]
struct AcceptAnyVerifier {
    algorithms: WebPkiSupportedAlgorithms,
}

impl AcceptAnyVerifier {
    fn new(provider: &CryptoProvider) -> Self {
        Self {
            algorithms: provider.signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for AcceptAnyVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        tracing::warn!(server = ?server_name, "Accepting unverified host certificate");
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[derive(Debug)]
struct PinnedVerifier {
    pinned: CertificateDer<'static>,
    algorithms: WebPkiSupportedAlgorithms,
}

impl PinnedVerifier {
    fn new(pinned: CertificateDer<'static>, provider: &CryptoProvider) -> Self {
        Self {
            pinned,
            algorithms: provider.signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for PinnedVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if end_entity.as_ref() == self.pinned.as_ref() {
            Ok(ServerCertVerified::assertion())
        } else {
            tracing::warn!(server = ?server_name, "Host certificate does not match the pinned certificate");
            Err(rustls::Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
