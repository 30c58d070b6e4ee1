//! Self-signed certificate generation.

use rand::RngCore;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, SerialNumber};
use rsa::pkcs8::EncodePrivateKey;
use rsa::RsaPrivateKey;
use time::OffsetDateTime;

use crate::identity::{IdentityError, IdentityRole};

/// RSA modulus size for generated keys.
pub const KEY_BITS: usize = 2048;

/// Lifetime of generated certificates.
pub const VALIDITY_YEARS: i32 = 20;

/// Freshly generated identity, in the exact on-disk encodings.
pub struct GeneratedArtifacts {
    /// PEM certificate with LF-only line endings.
    pub certificate_pem: String,
    /// PKCS#8 DER private key.
    pub key_der: Vec<u8>,
}

/// Generate an RSA key and a self-signed SHA-256-with-RSA certificate for `role`.
pub fn generate(role: IdentityRole) -> Result<GeneratedArtifacts, IdentityError> {
    let mut rng = rand::thread_rng();

    let rsa_key = RsaPrivateKey::new(&mut rng, KEY_BITS)
        .map_err(|e| IdentityError::Generate(format!("RSA key generation failed: {e}")))?;
    let pkcs8 = rsa_key
        .to_pkcs8_der()
        .map_err(|e| IdentityError::Generate(format!("PKCS#8 encoding failed: {e}")))?;
    let key_der = pkcs8.as_bytes().to_vec();

    // An RSA PKCS#8 key is signed with PKCS_RSA_SHA256.
    let key_pair = KeyPair::try_from(key_der.as_slice())
        .map_err(|e| IdentityError::Generate(format!("unusable signing key: {e}")))?;

    let mut serial = [0u8; 8];
    rng.fill_bytes(&mut serial);

    let params = certificate_params(role, serial, OffsetDateTime::now_utc());
    let certificate = params
        .self_signed(&key_pair)
        .map_err(|e| IdentityError::Generate(format!("certificate signing failed: {e}")))?;

    Ok(GeneratedArtifacts {
        certificate_pem: normalize_line_endings(&certificate.pem()),
        key_der,
    })
}

fn certificate_params(role: IdentityRole, serial: [u8; 8], now: OffsetDateTime) -> CertificateParams {
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, role.common_name());

    let mut params = CertificateParams::default();
    params.distinguished_name = name;
    params.serial_number = Some(serial_number(serial));
    params.not_before = now;
    params.not_after = now
        .replace_year(now.year() + VALIDITY_YEARS)
        .unwrap_or_else(|_| now + time::Duration::days(365 * i64::from(VALIDITY_YEARS) + 5));
    params
}

/// Eight random bytes read as a signed big-endian integer, made non-negative.
fn serial_number(bytes: [u8; 8]) -> SerialNumber {
    let magnitude = i64::from_be_bytes(bytes).unsigned_abs();
    SerialNumber::from_slice(&magnitude.to_be_bytes())
}

/// The host's PEM parser rejects carriage returns.
pub fn normalize_line_endings(pem: &str) -> String {
    pem.replace('\r', "")
}
