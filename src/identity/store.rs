//! Lazily materialized, file-backed identity.

use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::identity::generate::{self, GeneratedArtifacts};
use crate::identity::{IdentityError, IdentityProvider, IdentityRole};

/// A loaded certificate chain and private key.
///
/// Always built from the on-disk encodings, whether those bytes came from
/// disk or from the generator, so every consumer sees the same representation.
#[derive(Debug)]
pub struct Identity {
    chain: Vec<CertificateDer<'static>>,
    key: PrivatePkcs8KeyDer<'static>,
    certificate_pem: Vec<u8>,
}

impl Identity {
    /// Parse a PEM certificate chain and a PKCS#8 DER RSA key.
    ///
    /// The paths are only used to label errors.
    pub fn from_artifacts(
        certificate_pem: &[u8],
        key_der: &[u8],
        cert_path: &Path,
        key_path: &Path,
    ) -> Result<Self, IdentityError> {
        let chain = parse_chain(certificate_pem, cert_path)?;

        RsaPrivateKey::from_pkcs8_der(key_der).map_err(|e| IdentityError::BadKey {
            path: key_path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            chain,
            key: PrivatePkcs8KeyDer::from(key_der.to_vec()),
            certificate_pem: certificate_pem.to_vec(),
        })
    }

    /// Certificate chain, leaf first.
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    /// A copy of the private key for a TLS config.
    pub fn key(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(self.key.clone_key())
    }

    /// The certificate file contents, as the pairing exchange sends them.
    pub fn certificate_pem(&self) -> &[u8] {
        &self.certificate_pem
    }
}

impl IdentityProvider for Identity {
    fn certificate_chain(&self) -> Result<Vec<CertificateDer<'static>>, IdentityError> {
        Ok(self.chain.clone())
    }

    fn private_key(&self) -> Result<PrivateKeyDer<'static>, IdentityError> {
        Ok(self.key())
    }
}

fn parse_chain(pem: &[u8], path: &Path) -> Result<Vec<CertificateDer<'static>>, IdentityError> {
    let bad = |reason: String| IdentityError::BadCertificate {
        path: path.to_path_buf(),
        reason,
    };

    let chain = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| bad(e.to_string()))?;
    if chain.is_empty() {
        return Err(bad("no PEM certificate blocks".to_string()));
    }

    for cert in &chain {
        x509_parser::parse_x509_certificate(cert.as_ref()).map_err(|e| bad(e.to_string()))?;
    }

    Ok(chain)
}

/// Certificate + key pair persisted in two files, loaded or generated on first use.
///
/// Exactly one load-or-generate sequence runs per store, even when the first
/// callers arrive concurrently. Afterwards the identity is immutable.
#[derive(Debug)]
pub struct IdentityStore {
    role: IdentityRole,
    cert_path: PathBuf,
    key_path: PathBuf,
    ready: OnceLock<Arc<Identity>>,
    init_lock: Mutex<()>,
}

impl IdentityStore {
    /// Create a store over a certificate file and a key file. Nothing is read yet.
    pub fn new(role: IdentityRole, cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            role,
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            ready: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    /// Which role generated certificates are named for.
    pub fn role(&self) -> IdentityRole {
        self.role
    }

    /// Path of the PEM certificate file.
    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    /// Path of the DER key file.
    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// The identity, loading or generating it on first call.
    pub fn identity(&self) -> Result<Arc<Identity>, IdentityError> {
        if let Some(identity) = self.ready.get() {
            return Ok(Arc::clone(identity));
        }

        let _guard = self.init_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(identity) = self.ready.get() {
            return Ok(Arc::clone(identity));
        }

        let identity = Arc::new(self.load_or_generate()?);
        let _ = self.ready.set(Arc::clone(&identity));
        Ok(identity)
    }

    fn load_or_generate(&self) -> Result<Identity, IdentityError> {
        if let Some(identity) = self.load()? {
            tracing::info!(
                role = ?self.role,
                cert = %self.cert_path.display(),
                chain_len = identity.chain().len(),
                "Loaded identity from disk"
            );
            return Ok(identity);
        }

        let generated = generate::generate(self.role)?;
        tracing::info!(role = ?self.role, "Generated new identity");

        if let Err(e) = self.persist(&generated) {
            tracing::warn!(
                role = ?self.role,
                cert = %self.cert_path.display(),
                error = %e,
                "Failed to save generated identity; pairing will be lost on restart"
            );
            return self.from_generated(&generated);
        }
        tracing::info!(cert = %self.cert_path.display(), "Saved generated identity");

        match self.load()? {
            Some(identity) => Ok(identity),
            None => self.from_generated(&generated),
        }
    }

    /// `Ok(None)` when either file is absent; an error when one is present but unusable.
    fn load(&self) -> Result<Option<Identity>, IdentityError> {
        let cert = read_optional(&self.cert_path)?;
        let key = read_optional(&self.key_path)?;

        match (cert, key) {
            (Some(cert), Some(key)) => {
                Identity::from_artifacts(&cert, &key, &self.cert_path, &self.key_path).map(Some)
            }
            _ => {
                tracing::info!(role = ?self.role, "Certificate or key missing; a new identity is needed");
                Ok(None)
            }
        }
    }

    fn persist(&self, generated: &GeneratedArtifacts) -> io::Result<()> {
        for path in [&self.cert_path, &self.key_path] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.cert_path, generated.certificate_pem.as_bytes())?;
        fs::write(&self.key_path, &generated.key_der)
    }

    fn from_generated(&self, generated: &GeneratedArtifacts) -> Result<Identity, IdentityError> {
        Identity::from_artifacts(
            generated.certificate_pem.as_bytes(),
            &generated.key_der,
            &self.cert_path,
            &self.key_path,
        )
    }
}

impl IdentityProvider for IdentityStore {
    fn certificate_chain(&self) -> Result<Vec<CertificateDer<'static>>, IdentityError> {
        Ok(self.identity()?.chain().to_vec())
    }

    fn private_key(&self) -> Result<PrivateKeyDer<'static>, IdentityError> {
        Ok(self.identity()?.key())
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, IdentityError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        // A file standing in for a parent directory also means the artifact is absent.
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => Ok(None),
        Err(source) => Err(IdentityError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::traits::PublicKeyParts;
    use x509_parser::prelude::*;

    fn store_in(dir: &Path, role: IdentityRole) -> IdentityStore {
        IdentityStore::new(role, dir.join("test.crt"), dir.join("test.key"))
    }

    #[test]
    fn generates_and_persists_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path(), IdentityRole::Client);

        let identity = store.identity().unwrap();
        assert_eq!(identity.chain().len(), 1);

        let pem = fs::read_to_string(store.cert_path()).unwrap();
        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(!pem.contains('\r'));
        assert_eq!(pem.as_bytes(), identity.certificate_pem());

        let key_der = fs::read(store.key_path()).unwrap();
        let key = RsaPrivateKey::from_pkcs8_der(&key_der).unwrap();
        assert_eq!(key.size() * 8, 2048);

        let (_, cert) = parse_x509_certificate(identity.chain()[0].as_ref()).unwrap();
        let cn = cert.subject().iter_common_name().next().unwrap().as_str().unwrap();
        assert_eq!(cn, "NVIDIA GameStream Client");
        assert_eq!(cert.subject(), cert.issuer());
        assert_eq!(
            cert.signature_algorithm.algorithm.to_id_string(),
            "1.2.840.113549.1.1.11"
        );
        let lifetime = cert.validity().not_after.timestamp() - cert.validity().not_before.timestamp();
        assert!(lifetime >= 20 * 365 * 86_400);
    }

    #[test]
    fn reloads_the_same_identity_in_a_new_store() {
        let dir = tempfile::tempdir().unwrap();
        let first = store_in(dir.path(), IdentityRole::Server).identity().unwrap();
        let second = store_in(dir.path(), IdentityRole::Server).identity().unwrap();

        assert_eq!(first.chain(), second.chain());
        assert_eq!(first.key().secret_der(), second.key().secret_der());
    }

    #[test]
    fn concurrent_first_use_generates_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path(), IdentityRole::Server);

        let identities: Vec<Arc<Identity>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8).map(|_| scope.spawn(|| store.identity().unwrap())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for identity in &identities {
            assert!(Arc::ptr_eq(identity, &identities[0]));
        }
        let on_disk = fs::read(store.cert_path()).unwrap();
        assert_eq!(on_disk, identities[0].certificate_pem());
    }

    #[test]
    fn corrupt_certificate_is_an_error_and_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path(), IdentityRole::Server);
        fs::write(store.cert_path(), b"not a certificate").unwrap();
        fs::write(store.key_path(), b"not a key").unwrap();

        let err = store.identity().unwrap_err();
        assert!(matches!(err, IdentityError::BadCertificate { .. }));
        assert_eq!(fs::read(store.cert_path()).unwrap(), b"not a certificate");
    }

    #[test]
    fn corrupt_key_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let valid = store_in(dir.path(), IdentityRole::Client).identity().unwrap();
        let store = store_in(dir.path(), IdentityRole::Client);
        fs::write(store.key_path(), b"garbage").unwrap();

        let err = store.identity().unwrap_err();
        assert!(matches!(err, IdentityError::BadKey { .. }));
        assert_eq!(fs::read(store.cert_path()).unwrap(), valid.certificate_pem());
    }

    #[test]
    fn missing_key_triggers_regeneration() {
        let dir = tempfile::tempdir().unwrap();
        let original = store_in(dir.path(), IdentityRole::Client).identity().unwrap();
        fs::remove_file(dir.path().join("test.key")).unwrap();

        let regenerated = store_in(dir.path(), IdentityRole::Client).identity().unwrap();
        assert_ne!(original.chain(), regenerated.chain());
        assert!(dir.path().join("test.key").exists());
    }

    #[test]
    fn loads_a_concatenated_chain() {
        let dir = tempfile::tempdir().unwrap();
        let leaf = store_in(dir.path(), IdentityRole::Server).identity().unwrap();
        let other_dir = tempfile::tempdir().unwrap();
        let other = store_in(other_dir.path(), IdentityRole::Server).identity().unwrap();

        let mut chain_pem = leaf.certificate_pem().to_vec();
        chain_pem.extend_from_slice(other.certificate_pem());
        fs::write(dir.path().join("test.crt"), &chain_pem).unwrap();

        let reloaded = store_in(dir.path(), IdentityRole::Server).identity().unwrap();
        assert_eq!(reloaded.chain().len(), 2);
        assert_eq!(reloaded.chain()[0], leaf.chain()[0]);
    }

    #[test]
    fn unwritable_location_still_yields_an_identity() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"a file, not a directory").unwrap();
        let store = IdentityStore::new(
            IdentityRole::Server,
            blocker.join("nested").join("test.crt"),
            blocker.join("nested").join("test.key"),
        );

        let identity = store.identity().unwrap();
        assert_eq!(identity.chain().len(), 1);
        assert!(!store.cert_path().exists());
    }

    #[test]
    fn unreadable_existing_artifact_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("test.crt");
        fs::create_dir(&cert_path).unwrap();
        let store = IdentityStore::new(IdentityRole::Server, &cert_path, dir.path().join("test.key"));

        assert!(matches!(store.identity(), Err(IdentityError::Read { .. })));
        assert!(!dir.path().join("test.key").exists());
    }
}
