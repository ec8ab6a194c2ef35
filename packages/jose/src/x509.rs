//! X.509 certificate handling for `x5c` chains
//!
//! Certificates are only ever validated, never issued. A chain is a leaf
//! first list where every certificate is signed by its successor.

use crate::algorithm::Algorithm;
use crate::error::{JoseError, JoseResult};
use crate::key::handles::VerifyingHandle;
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256, Sha384, Sha512};
use const_oid::ObjectIdentifier;
use const_oid::db::{rfc5912, rfc8410};
use tracing::{trace, warn};
use x509_cert::Certificate;
use x509_cert::der::{Decode, Encode};

/// Parse one DER encoded certificate.
///
/// # Errors
///
/// Returns [`JoseError::Format`] when the bytes are not a certificate.
pub fn parse_certificate(der: &[u8]) -> JoseResult<Certificate> {
    Certificate::from_der(der).map_err(|e| JoseError::Format(format!("Invalid certificate: {e}")))
}

/// Parse a standard base64 certificate, as carried by `x5c` members.
///
/// # Errors
///
/// Returns [`JoseError::Format`] for bad base64 or bad DER.
pub fn parse_base64_certificate(encoded: &str) -> JoseResult<Certificate> {
    let der = STANDARD
        .decode(encoded.trim())
        .map_err(|e| JoseError::Format(format!("Invalid x5c entry: {e}")))?;
    parse_certificate(&der)
}

/// DER encoded SubjectPublicKeyInfo of `cert`
///
/// # Errors
///
/// Fails only if the public key info cannot be re-encoded.
pub fn public_key_der(cert: &Certificate) -> JoseResult<Vec<u8>> {
    cert.tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| JoseError::Format(format!("Invalid subject public key: {e}")))
}

/// Check that `now` lies inside the certificate's validity window.
///
/// # Errors
///
/// Returns [`JoseError::Certificate`] for expired or not yet valid certificates.
pub fn check_validity(cert: &Certificate, now: DateTime<Utc>) -> JoseResult<()> {
    let validity = &cert.tbs_certificate.validity;
    let not_before = validity.not_before.to_unix_duration().as_secs();
    let not_after = validity.not_after.to_unix_duration().as_secs();
    let now = u64::try_from(now.timestamp()).unwrap_or(0);

    if now < not_before {
        return Err(JoseError::certificate("certificate is not yet valid"));
    }
    if now > not_after {
        return Err(JoseError::certificate("certificate has expired"));
    }
    Ok(())
}

/// Validate a leaf first certificate chain.
///
/// Every certificate must be inside its validity window, each certificate's
/// issuer must be the next one's subject, and each signature must verify
/// under the next certificate's key. With `anchored` the last certificate
/// is a trust anchor and must be self-signed.
///
/// # Errors
///
/// Returns [`JoseError::Certificate`] naming the first failing link.
pub fn check_chain(chain: &[Certificate], anchored: bool, now: DateTime<Utc>) -> JoseResult<()> {
    if chain.is_empty() {
        return Err(JoseError::certificate("empty certificate chain"));
    }

    for (index, cert) in chain.iter().enumerate() {
        check_validity(cert, now)
            .inspect_err(|e| warn!(index, error = %e, "certificate rejected"))?;
    }

    for (index, pair) in chain.windows(2).enumerate() {
        let (subject, issuer) = (&pair[0], &pair[1]);
        if subject.tbs_certificate.issuer != issuer.tbs_certificate.subject {
            warn!(index, "certificate issuer does not match the next subject");
            return Err(JoseError::Certificate(format!(
                "certificate {index} is not issued by certificate {}",
                index + 1
            )));
        }
        verify_signed_by(subject, issuer)
            .inspect_err(|e| warn!(index, error = %e, "certificate rejected"))?;
        trace!(index, "certificate link verified");
    }

    if anchored {
        if let Some(root) = chain.last() {
            if root.tbs_certificate.issuer != root.tbs_certificate.subject {
                return Err(JoseError::certificate("trust anchor is not self-signed"));
            }
            verify_signed_by(root, root)?;
        }
    }
    Ok(())
}

// not in the const-oid database
const SECP_256_K_1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.10");

/// How a certificate signature algorithm OID is verified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    /// The OID fixes both hash and key type, as one JWS algorithm does
    Jws(Algorithm),
    /// ECDSA with this hash; the curve is whatever the issuer key uses
    Ecdsa(CertificateDigest),
}

/// Hash named by an `ecdsa-with-SHA*` OID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateDigest {
    /// SHA-256
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl CertificateDigest {
    fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            CertificateDigest::Sha256 => Sha256::digest(data).to_vec(),
            CertificateDigest::Sha384 => Sha384::digest(data).to_vec(),
            CertificateDigest::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

/// Verify `cert`'s signature with the public key of `issuer`.
///
/// # Errors
///
/// Returns [`JoseError::Certificate`] for unsupported signature algorithms,
/// an issuer key of the wrong type, or a signature that does not verify.
pub fn verify_signed_by(cert: &Certificate, issuer: &Certificate) -> JoseResult<()> {
    let tbs = cert
        .tbs_certificate
        .to_der()
        .map_err(|e| JoseError::Format(format!("Invalid certificate body: {e}")))?;
    let signature = cert
        .signature
        .as_bytes()
        .ok_or_else(|| JoseError::certificate("certificate signature has unused bits"))?;
    let issuer_key = public_key_der(issuer)?;
    let mismatch =
        |_: JoseError| JoseError::certificate("issuer key does not match the signature algorithm");

    let verified = match signature_scheme(&cert.signature_algorithm.oid)? {
        SignatureScheme::Jws(algorithm) => VerifyingHandle::from_spki(algorithm, &issuer_key)
            .map_err(mismatch)?
            .verify(algorithm, &tbs, signature),
        SignatureScheme::Ecdsa(hash) => {
            let curve = ec_key_algorithm(issuer)?;
            VerifyingHandle::from_spki(curve, &issuer_key)
                .map_err(mismatch)?
                .verify_prehash(&hash.digest(&tbs), signature)
        }
    };

    if verified {
        Ok(())
    } else {
        Err(JoseError::certificate("certificate signature does not verify"))
    }
}

/// Map a certificate signature algorithm OID to its verification scheme.
///
/// # Errors
///
/// Returns [`JoseError::Certificate`] for OIDs outside the supported set.
pub fn signature_scheme(oid: &ObjectIdentifier) -> JoseResult<SignatureScheme> {
    match *oid {
        rfc5912::SHA_1_WITH_RSA_ENCRYPTION => Ok(SignatureScheme::Jws(Algorithm::RS1)),
        rfc5912::SHA_256_WITH_RSA_ENCRYPTION => Ok(SignatureScheme::Jws(Algorithm::RS256)),
        rfc5912::SHA_384_WITH_RSA_ENCRYPTION => Ok(SignatureScheme::Jws(Algorithm::RS384)),
        rfc5912::SHA_512_WITH_RSA_ENCRYPTION => Ok(SignatureScheme::Jws(Algorithm::RS512)),
        rfc5912::ECDSA_WITH_SHA_256 => Ok(SignatureScheme::Ecdsa(CertificateDigest::Sha256)),
        rfc5912::ECDSA_WITH_SHA_384 => Ok(SignatureScheme::Ecdsa(CertificateDigest::Sha384)),
        rfc5912::ECDSA_WITH_SHA_512 => Ok(SignatureScheme::Ecdsa(CertificateDigest::Sha512)),
        rfc8410::ID_ED_25519 => Ok(SignatureScheme::Jws(Algorithm::EdDSA)),
        other => Err(JoseError::Certificate(format!(
            "unsupported certificate signature algorithm {other}"
        ))),
    }
}

// ECDSA algorithm for the named curve of an EC subject key
fn ec_key_algorithm(cert: &Certificate) -> JoseResult<Algorithm> {
    let spki = &cert.tbs_certificate.subject_public_key_info;
    if spki.algorithm.oid != rfc5912::ID_EC_PUBLIC_KEY {
        return Err(JoseError::certificate(
            "issuer key does not match the signature algorithm",
        ));
    }
    let curve = spki
        .algorithm
        .parameters
        .as_ref()
        .ok_or_else(|| JoseError::certificate("issuer EC key names no curve"))?
        .decode_as::<ObjectIdentifier>()
        .map_err(|e| JoseError::Certificate(format!("Invalid issuer curve: {e}")))?;

    match curve {
        rfc5912::SECP_256_R_1 => Ok(Algorithm::ES256),
        rfc5912::SECP_384_R_1 => Ok(Algorithm::ES384),
        rfc5912::SECP_521_R_1 => Ok(Algorithm::ES512),
        SECP_256_K_1 => Ok(Algorithm::ES256K),
        other => Err(JoseError::Certificate(format!("unsupported issuer curve {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pem;
    use chrono::TimeZone;

    fn cert(pem_text: &str) -> Certificate {
        parse_certificate(&pem::parse(pem_text).unwrap().der).unwrap()
    }

    fn root() -> Certificate {
        cert(include_str!("../tests/fixtures/root_ca.pem"))
    }

    fn intermediate() -> Certificate {
        cert(include_str!("../tests/fixtures/intermediate_ca.pem"))
    }

    fn leaf() -> Certificate {
        cert(include_str!("../tests/fixtures/leaf.pem"))
    }

    #[test]
    fn chain_links_to_anchor() {
        let chain = vec![leaf(), intermediate(), root()];
        check_chain(&chain, true, Utc::now()).unwrap();
        check_chain(&chain[..2], false, Utc::now()).unwrap();
    }

    #[test]
    fn out_of_order_chain_is_rejected() {
        let chain = vec![leaf(), root()];
        let err = check_chain(&chain, false, Utc::now()).unwrap_err();
        assert!(matches!(err, JoseError::Certificate(_)));
    }

    #[test]
    fn rogue_root_with_same_name_is_rejected() {
        let rogue = cert(include_str!("../tests/fixtures/rogue_root.pem"));
        let chain = vec![leaf(), intermediate(), rogue];
        assert!(check_chain(&chain, false, Utc::now()).is_err());
    }

    #[test]
    fn anchor_must_be_self_signed() {
        let chain = vec![leaf(), intermediate()];
        assert!(check_chain(&chain, true, Utc::now()).is_err());
    }

    #[test]
    fn validity_window_is_enforced() {
        let expired = cert(include_str!("../tests/fixtures/expired.pem"));
        assert!(matches!(
            check_validity(&expired, Utc::now()),
            Err(JoseError::Certificate(_))
        ));
        let then = Utc.with_ymd_and_hms(2000, 6, 1, 0, 0, 0).unwrap();
        check_validity(&expired, then).unwrap();
        let before = Utc.with_ymd_and_hms(1999, 1, 1, 0, 0, 0).unwrap();
        assert!(check_validity(&expired, before).is_err());
    }

    #[test]
    fn rsa_self_signed_certificate_verifies() {
        let rsa = cert(include_str!("../tests/fixtures/rsa_cert.pem"));
        verify_signed_by(&rsa, &rsa).unwrap();
    }

    #[test]
    fn ecdsa_hash_is_independent_of_curve() {
        assert_eq!(
            signature_scheme(&rfc5912::ECDSA_WITH_SHA_256).unwrap(),
            SignatureScheme::Ecdsa(CertificateDigest::Sha256)
        );
        assert_eq!(ec_key_algorithm(&root()).unwrap(), Algorithm::ES256);
        let rsa = cert(include_str!("../tests/fixtures/rsa_cert.pem"));
        assert!(ec_key_algorithm(&rsa).is_err());
    }

    #[test]
    fn p384_issuer_signing_with_sha256_verifies() {
        let root = cert(include_str!("../tests/fixtures/p384_root_ca.pem"));
        let leaf = cert(include_str!("../tests/fixtures/p384_issued_leaf.pem"));
        verify_signed_by(&leaf, &root).unwrap();
        check_chain(&[leaf, root], true, Utc::now()).unwrap();
    }

    #[test]
    fn unsupported_signature_oid_is_rejected() {
        assert!(signature_scheme(&rfc5912::ID_EC_PUBLIC_KEY).is_err());
    }

    #[test]
    fn x5c_entries_are_standard_base64() {
        let der = pem::parse(include_str!("../tests/fixtures/leaf.pem")).unwrap().der;
        let parsed = parse_base64_certificate(&STANDARD.encode(&der)).unwrap();
        assert_eq!(parsed, leaf());
        assert!(parse_base64_certificate("not base64!").is_err());
    }
}
