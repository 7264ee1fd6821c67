//! Transaction signing identity derived from client credentials.
//!
//! Proposals are signed with the organization's enrollment key (ECDSA
//! P-256 over a SHA-256 digest). Key material never appears in `Debug`
//! output or logs.

use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use p256::SecretKey;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::chain::error::IdentityError;

/// Signing identity for one chain: enrollment certificate plus the
/// corresponding EC private key, tagged with the organization's MSP id.
pub struct SigningIdentity {
    msp_id: String,
    certificate_pem: String,
    key: SigningKey,
}

impl SigningIdentity {
    /// Build an identity from PEM-encoded credential bytes as read from
    /// the configured paths.
    ///
    /// The key may be SEC1 (`EC PRIVATE KEY`) or PKCS#8 (`PRIVATE KEY`).
    pub fn from_pem(
        msp_id: &str,
        cert_pem: &[u8],
        key_pem: &[u8],
    ) -> Result<Self, IdentityError> {
        let cert = pem::parse(cert_pem).map_err(|e| IdentityError::InvalidPem(e.to_string()))?;
        if cert.tag() != "CERTIFICATE" {
            return Err(IdentityError::UnexpectedTag {
                expected: "CERTIFICATE",
                got: cert.tag().to_string(),
            });
        }

        let parsed = pem::parse(key_pem).map_err(|e| IdentityError::InvalidPem(e.to_string()))?;
        let secret = match parsed.tag() {
            "EC PRIVATE KEY" => SecretKey::from_sec1_der(parsed.contents())
                .map_err(|e| IdentityError::InvalidKey(e.to_string()))?,
            "PRIVATE KEY" => {
                use p256::pkcs8::DecodePrivateKey;
                SecretKey::from_pkcs8_der(parsed.contents())
                    .map_err(|e| IdentityError::InvalidKey(e.to_string()))?
            }
            other => {
                return Err(IdentityError::UnexpectedTag {
                    expected: "EC PRIVATE KEY",
                    got: other.to_string(),
                })
            }
        };

        Ok(Self {
            msp_id: msp_id.to_string(),
            certificate_pem: String::from_utf8_lossy(cert_pem).into_owned(),
            key: SigningKey::from(&secret),
        })
    }

    /// MSP id of the organization this identity acts for.
    pub fn msp_id(&self) -> &str {
        &self.msp_id
    }

    /// Enrollment certificate presented to peers alongside signatures.
    pub fn certificate_pem(&self) -> &str {
        &self.certificate_pem
    }

    /// Sign a proposal payload: DER-encoded ECDSA P-256 signature
    /// (SHA-256 message digest).
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signature: Signature = self.key.sign(message);
        signature.to_der().as_bytes().to_vec()
    }

    /// Hex digest used as the transaction id seed for a payload.
    pub fn payload_digest(message: &[u8]) -> String {
        hex::encode(Sha256::digest(message))
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("msp_id", &self.msp_id)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use p256::pkcs8::EncodePrivateKey;

    /// Deterministic test identity built from a fixed scalar.
    pub(crate) fn test_identity(msp_id: &str) -> SigningIdentity {
        let secret = SecretKey::from_slice(&[0x42u8; 32]).unwrap();
        let key_der = secret.to_pkcs8_der().unwrap();
        let key_block = pem::Pem::new("PRIVATE KEY", key_der.as_bytes().to_vec());
        let cert_block = pem::Pem::new("CERTIFICATE", vec![0u8; 16]);

        SigningIdentity::from_pem(
            msp_id,
            pem::encode(&cert_block).as_bytes(),
            pem::encode(&key_block).as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn signs_deterministic_length_der() {
        let identity = test_identity("ForensicLabMSP");
        let sig = identity.sign(b"proposal-bytes");
        // DER ECDSA signatures are about 70 bytes for P-256.
        assert!((64..=72).contains(&sig.len()));
    }

    #[test]
    fn rejects_wrong_pem_tag() {
        let block = pem::Pem::new("RSA PRIVATE KEY", vec![0u8; 8]);
        let cert = pem::Pem::new("CERTIFICATE", vec![0u8; 8]);
        let result = SigningIdentity::from_pem(
            "ForensicLabMSP",
            pem::encode(&cert).as_bytes(),
            pem::encode(&block).as_bytes(),
        );
        assert!(matches!(result, Err(IdentityError::UnexpectedTag { .. })));
    }

    #[test]
    fn debug_redacts_key_material() {
        let identity = test_identity("ForensicLabMSP");
        let debug = format!("{identity:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("42"));
    }
}
