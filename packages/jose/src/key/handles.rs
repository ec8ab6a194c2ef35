//! Signature primitives behind key material
//!
//! A handle is built once from a [`KeyDescription`](super::KeyDescription)
//! part and never mutated. All primitives sign and verify through `&self`,
//! so handles are shared across threads without locking.

use super::description::{PrivateMaterial, PublicMaterial};
use crate::algorithm::{Algorithm, AlgorithmFamily};
use crate::error::{JoseError, JoseResult};
use ed25519_dalek::pkcs8::{DecodePrivateKey as _, DecodePublicKey as _};
use hmac::{Hmac, Mac};
use rand_core::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey as _, DecodeRsaPublicKey as _};
use rsa::traits::PublicKeyParts as _;
use rsa::{BigUint, Pkcs1v15Sign, Pss, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;
use tracing::debug;
use zeroize::Zeroizing;

// one trait set covers every RustCrypto curve crate
use p256::ecdsa::signature::{Signer as _, Verifier as _, hazmat::PrehashVerifier as _};
use std::fmt::Display;

type HmacSha256 = Hmac<Sha256>;
type HmacSha384 = Hmac<Sha384>;
type HmacSha512 = Hmac<Sha512>;

/// HMAC key. The MAC state is rebuilt per call from the secret.
pub(crate) struct MacKey {
    algorithm: Algorithm,
    secret: Zeroizing<Vec<u8>>,
}

impl MacKey {
    pub(crate) fn new(algorithm: Algorithm, secret: Zeroizing<Vec<u8>>) -> JoseResult<Self> {
        if !algorithm.is_symmetric() {
            return Err(JoseError::unsupported_algorithm(algorithm.name()));
        }
        if secret.is_empty() {
            return Err(JoseError::missing_key_material("empty HMAC secret"));
        }
        Ok(Self { algorithm, secret })
    }

    pub(crate) fn sign(&self, data: &[u8]) -> JoseResult<Vec<u8>> {
        fn mac<M: Mac + hmac::digest::KeyInit>(secret: &[u8], data: &[u8]) -> JoseResult<Vec<u8>> {
            let mut mac = <M as Mac>::new_from_slice(secret)
                .map_err(|_| JoseError::invalid_key("Invalid HMAC key"))?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }

        match self.algorithm {
            Algorithm::HS256 => mac::<HmacSha256>(&self.secret, data),
            Algorithm::HS384 => mac::<HmacSha384>(&self.secret, data),
            Algorithm::HS512 => mac::<HmacSha512>(&self.secret, data),
            other => Err(JoseError::unsupported_algorithm(other.name())),
        }
    }

    /// Constant time comparison against a freshly computed MAC.
    pub(crate) fn verify(&self, signature: &[u8], data: &[u8]) -> JoseResult<bool> {
        let expected = self.sign(data)?;
        Ok(expected.ct_eq(signature).into())
    }
}

/// Private key capable of producing signatures
pub(crate) enum SigningHandle {
    Rsa(Box<RsaPrivateKey>),
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
    P521(p521::ecdsa::SigningKey),
    K256(k256::ecdsa::SigningKey),
    Ed25519(Box<ed25519_dalek::SigningKey>),
}

impl SigningHandle {
    pub(crate) fn from_private(
        algorithm: Algorithm,
        material: &PrivateMaterial,
    ) -> JoseResult<Self> {
        let bad = |e: &dyn Display| rejected(algorithm, "private", e);

        match (algorithm.family(), material) {
            (AlgorithmFamily::Rsa | AlgorithmFamily::RsaPss, PrivateMaterial::Pkcs8(der)) => {
                let key = RsaPrivateKey::from_pkcs8_der(der).map_err(|e| bad(&e))?;
                Ok(SigningHandle::Rsa(Box::new(key)))
            }
            (AlgorithmFamily::Rsa | AlgorithmFamily::RsaPss, PrivateMaterial::RsaPkcs1(der)) => {
                let key = RsaPrivateKey::from_pkcs1_der(der).map_err(|e| bad(&e))?;
                Ok(SigningHandle::Rsa(Box::new(key)))
            }
            (
                AlgorithmFamily::Rsa | AlgorithmFamily::RsaPss,
                PrivateMaterial::Rsa { n, e, d, p, q },
            ) => {
                let key = RsaPrivateKey::from_components(
                    BigUint::from_bytes_be(n),
                    BigUint::from_bytes_be(e),
                    BigUint::from_bytes_be(d),
                    vec![BigUint::from_bytes_be(p), BigUint::from_bytes_be(q)],
                )
                .map_err(|e| bad(&e))?;
                Ok(SigningHandle::Rsa(Box::new(key)))
            }
            (AlgorithmFamily::Ecdsa, PrivateMaterial::Pkcs8(der)) => match algorithm {
                Algorithm::ES256 => p256::ecdsa::SigningKey::from_pkcs8_der(der)
                    .map(SigningHandle::P256)
                    .map_err(|e| bad(&e)),
                Algorithm::ES384 => p384::ecdsa::SigningKey::from_pkcs8_der(der)
                    .map(SigningHandle::P384)
                    .map_err(|e| bad(&e)),
                Algorithm::ES512 => {
                    let secret = p521::SecretKey::from_pkcs8_der(der).map_err(|e| bad(&e))?;
                    p521::ecdsa::SigningKey::from_bytes(&secret.to_bytes())
                        .map(SigningHandle::P521)
                        .map_err(|e| bad(&e))
                }
                Algorithm::ES256K => k256::ecdsa::SigningKey::from_pkcs8_der(der)
                    .map(SigningHandle::K256)
                    .map_err(|e| bad(&e)),
                other => Err(JoseError::unsupported_algorithm(other.name())),
            },
            (AlgorithmFamily::Ecdsa, PrivateMaterial::Ec { d }) => match algorithm {
                Algorithm::ES256 => p256::ecdsa::SigningKey::from_slice(&left_pad(d, 32)?)
                    .map(SigningHandle::P256)
                    .map_err(|e| bad(&e)),
                Algorithm::ES384 => p384::ecdsa::SigningKey::from_slice(&left_pad(d, 48)?)
                    .map(SigningHandle::P384)
                    .map_err(|e| bad(&e)),
                Algorithm::ES512 => {
                    let secret =
                        p521::SecretKey::from_slice(&left_pad(d, 66)?).map_err(|e| bad(&e))?;
                    p521::ecdsa::SigningKey::from_bytes(&secret.to_bytes())
                        .map(SigningHandle::P521)
                        .map_err(|e| bad(&e))
                }
                Algorithm::ES256K => k256::ecdsa::SigningKey::from_slice(&left_pad(d, 32)?)
                    .map(SigningHandle::K256)
                    .map_err(|e| bad(&e)),
                other => Err(JoseError::unsupported_algorithm(other.name())),
            },
            (AlgorithmFamily::EdDsa, PrivateMaterial::Pkcs8(der)) => {
                ed25519_dalek::SigningKey::from_pkcs8_der(der)
                    .map(|key| SigningHandle::Ed25519(Box::new(key)))
                    .map_err(|e| bad(&e))
            }
            (AlgorithmFamily::EdDsa, PrivateMaterial::Okp { d }) => {
                let seed: [u8; 32] = d
                    .as_slice()
                    .try_into()
                    .map_err(|_| JoseError::invalid_key("Ed25519 private key must be 32 bytes"))?;
                Ok(SigningHandle::Ed25519(Box::new(ed25519_dalek::SigningKey::from_bytes(&seed))))
            }
            _ => Err(JoseError::InvalidKey(format!(
                "private key material does not fit {algorithm}"
            ))),
        }
    }

    /// Sign `data`. ECDSA signatures are returned DER encoded.
    pub(crate) fn sign(&self, algorithm: Algorithm, data: &[u8]) -> JoseResult<Vec<u8>> {
        match self {
            SigningHandle::Rsa(key) => {
                let hashed = digest(algorithm, data)?;
                let result = if algorithm.family() == AlgorithmFamily::RsaPss {
                    key.sign_with_rng(&mut OsRng, pss_scheme(algorithm)?, &hashed)
                } else {
                    key.sign_with_rng(&mut OsRng, pkcs1_scheme(algorithm)?, &hashed)
                };
                result.map_err(|e| JoseError::Provider(format!("{algorithm} signing failed: {e}")))
            }
            SigningHandle::P256(key) => {
                let sig: p256::ecdsa::Signature = key.sign(data);
                Ok(sig.to_der().as_bytes().to_vec())
            }
            SigningHandle::P384(key) => {
                let sig: p384::ecdsa::Signature = key.sign(data);
                Ok(sig.to_der().as_bytes().to_vec())
            }
            SigningHandle::P521(key) => {
                let sig: p521::ecdsa::Signature = key.sign(data);
                Ok(sig.to_der().as_bytes().to_vec())
            }
            SigningHandle::K256(key) => {
                let sig: k256::ecdsa::Signature = key.sign(data);
                Ok(sig.to_der().as_bytes().to_vec())
            }
            SigningHandle::Ed25519(key) => Ok(key.sign(data).to_bytes().to_vec()),
        }
    }

    /// Modulus length in bytes for RSA keys
    pub(crate) fn modulus_len(&self) -> Option<usize> {
        match self {
            SigningHandle::Rsa(key) => Some(key.size()),
            _ => None,
        }
    }
}

/// Public key capable of checking signatures
pub(crate) enum VerifyingHandle {
    Rsa(Box<RsaPublicKey>),
    P256(p256::ecdsa::VerifyingKey),
    P384(p384::ecdsa::VerifyingKey),
    P521(p521::ecdsa::VerifyingKey),
    K256(k256::ecdsa::VerifyingKey),
    Ed25519(ed25519_dalek::VerifyingKey),
}

impl VerifyingHandle {
    pub(crate) fn from_public(algorithm: Algorithm, material: &PublicMaterial) -> JoseResult<Self> {
        let bad = |e: &dyn Display| rejected(algorithm, "public", e);

        match (algorithm.family(), material) {
            (_, PublicMaterial::Spki(der)) => Self::from_spki(algorithm, der),
            (AlgorithmFamily::Rsa | AlgorithmFamily::RsaPss, PublicMaterial::RsaPkcs1(der)) => {
                let key = RsaPublicKey::from_pkcs1_der(der).map_err(|e| bad(&e))?;
                Ok(VerifyingHandle::Rsa(Box::new(key)))
            }
            (AlgorithmFamily::Rsa | AlgorithmFamily::RsaPss, PublicMaterial::Rsa { n, e }) => {
                let key = RsaPublicKey::new(BigUint::from_bytes_be(n), BigUint::from_bytes_be(e))
                    .map_err(|e| bad(&e))?;
                Ok(VerifyingHandle::Rsa(Box::new(key)))
            }
            (AlgorithmFamily::Ecdsa, PublicMaterial::Ec { x, y }) => {
                let size = match algorithm {
                    Algorithm::ES384 => 48,
                    Algorithm::ES512 => 66,
                    _ => 32,
                };
                let mut sec1 = Vec::with_capacity(1 + 2 * size);
                sec1.push(0x04);
                sec1.extend_from_slice(&left_pad(x, size)?);
                sec1.extend_from_slice(&left_pad(y, size)?);

                match algorithm {
                    Algorithm::ES256 => p256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                        .map(VerifyingHandle::P256)
                        .map_err(|e| bad(&e)),
                    Algorithm::ES384 => p384::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                        .map(VerifyingHandle::P384)
                        .map_err(|e| bad(&e)),
                    Algorithm::ES512 => p521::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                        .map(VerifyingHandle::P521)
                        .map_err(|e| bad(&e)),
                    Algorithm::ES256K => k256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                        .map(VerifyingHandle::K256)
                        .map_err(|e| bad(&e)),
                    other => Err(JoseError::unsupported_algorithm(other.name())),
                }
            }
            (AlgorithmFamily::EdDsa, PublicMaterial::Okp { x }) => {
                let bytes: [u8; 32] = x
                    .as_slice()
                    .try_into()
                    .map_err(|_| JoseError::invalid_key("Ed25519 public key must be 32 bytes"))?;
                ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                    .map(VerifyingHandle::Ed25519)
                    .map_err(|e| bad(&e))
            }
            _ => Err(JoseError::InvalidKey(format!(
                "public key material does not fit {algorithm}"
            ))),
        }
    }

    /// Build a handle from a DER SubjectPublicKeyInfo, as found in certificates.
    pub(crate) fn from_spki(algorithm: Algorithm, der: &[u8]) -> JoseResult<Self> {
        let bad = |e: &dyn Display| rejected(algorithm, "public", e);

        match algorithm {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::RS1
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => RsaPublicKey::from_public_key_der(der)
                .map(|key| VerifyingHandle::Rsa(Box::new(key)))
                .map_err(|e| bad(&e)),
            Algorithm::ES256 => p256::ecdsa::VerifyingKey::from_public_key_der(der)
                .map(VerifyingHandle::P256)
                .map_err(|e| bad(&e)),
            Algorithm::ES384 => p384::ecdsa::VerifyingKey::from_public_key_der(der)
                .map(VerifyingHandle::P384)
                .map_err(|e| bad(&e)),
            Algorithm::ES512 => {
                let public = p521::PublicKey::from_public_key_der(der).map_err(|e| bad(&e))?;
                p521::ecdsa::VerifyingKey::from_affine(*public.as_affine())
                    .map(VerifyingHandle::P521)
                    .map_err(|e| bad(&e))
            }
            Algorithm::ES256K => k256::ecdsa::VerifyingKey::from_public_key_der(der)
                .map(VerifyingHandle::K256)
                .map_err(|e| bad(&e)),
            Algorithm::EdDSA => ed25519_dalek::VerifyingKey::from_public_key_der(der)
                .map(VerifyingHandle::Ed25519)
                .map_err(|e| bad(&e)),
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 | Algorithm::None => {
                Err(JoseError::unsupported_algorithm(algorithm.name()))
            }
        }
    }

    /// Check `signature` over `data`.
    ///
    /// ECDSA signatures must be DER and RSA signatures exactly the modulus
    /// length; the caller normalizes both. Malformed signatures verify as
    /// `false`.
    pub(crate) fn verify(&self, algorithm: Algorithm, data: &[u8], signature: &[u8]) -> bool {
        let outcome = match self {
            VerifyingHandle::Rsa(key) => match digest(algorithm, data) {
                Ok(hashed) => {
                    let result = if algorithm.family() == AlgorithmFamily::RsaPss {
                        pss_scheme(algorithm).and_then(|scheme| {
                            key.verify(scheme, &hashed, signature)
                                .map_err(|e| JoseError::Provider(e.to_string()))
                        })
                    } else {
                        pkcs1_scheme(algorithm).and_then(|scheme| {
                            key.verify(scheme, &hashed, signature)
                                .map_err(|e| JoseError::Provider(e.to_string()))
                        })
                    };
                    result.map_err(|e| e.to_string())
                }
                Err(e) => Err(e.to_string()),
            },
            VerifyingHandle::P256(key) => p256::ecdsa::Signature::from_der(signature)
                .and_then(|sig| key.verify(data, &sig))
                .map_err(|e| e.to_string()),
            VerifyingHandle::P384(key) => p384::ecdsa::Signature::from_der(signature)
                .and_then(|sig| key.verify(data, &sig))
                .map_err(|e| e.to_string()),
            VerifyingHandle::P521(key) => p521::ecdsa::Signature::from_der(signature)
                .and_then(|sig| key.verify(data, &sig))
                .map_err(|e| e.to_string()),
            VerifyingHandle::K256(key) => k256::ecdsa::Signature::from_der(signature)
                .and_then(|sig| {
                    // secp256k1 verification only accepts low-S signatures
                    let sig = sig.normalize_s().unwrap_or(sig);
                    key.verify(data, &sig)
                })
                .map_err(|e| e.to_string()),
            VerifyingHandle::Ed25519(key) => ed25519_dalek::Signature::from_slice(signature)
                .and_then(|sig| key.verify(data, &sig))
                .map_err(|e| e.to_string()),
        };

        match outcome {
            Ok(()) => true,
            Err(reason) => {
                debug!(%algorithm, %reason, "signature rejected");
                false
            }
        }
    }

    /// Check a DER ECDSA signature over a digest the caller computed.
    ///
    /// Certificates pair curves and hashes freely, so the hash is not
    /// implied by the curve here. Non-ECDSA handles verify as `false`.
    pub(crate) fn verify_prehash(&self, digest: &[u8], signature: &[u8]) -> bool {
        let outcome = match self {
            VerifyingHandle::P256(key) => p256::ecdsa::Signature::from_der(signature)
                .and_then(|sig| key.verify_prehash(&widen(digest, 32), &sig))
                .map_err(|e| e.to_string()),
            VerifyingHandle::P384(key) => p384::ecdsa::Signature::from_der(signature)
                .and_then(|sig| key.verify_prehash(&widen(digest, 48), &sig))
                .map_err(|e| e.to_string()),
            VerifyingHandle::P521(key) => p521::ecdsa::Signature::from_der(signature)
                .and_then(|sig| key.verify_prehash(&widen(digest, 66), &sig))
                .map_err(|e| e.to_string()),
            VerifyingHandle::K256(key) => k256::ecdsa::Signature::from_der(signature)
                .and_then(|sig| {
                    let sig = sig.normalize_s().unwrap_or(sig);
                    key.verify_prehash(&widen(digest, 32), &sig)
                })
                .map_err(|e| e.to_string()),
            VerifyingHandle::Rsa(_) | VerifyingHandle::Ed25519(_) => {
                Err("not an ECDSA key".to_string())
            }
        };

        match outcome {
            Ok(()) => true,
            Err(reason) => {
                debug!(%reason, "prehashed signature rejected");
                false
            }
        }
    }

    /// Modulus length in bytes for RSA keys
    pub(crate) fn modulus_len(&self) -> Option<usize> {
        match self {
            VerifyingHandle::Rsa(key) => Some(key.size()),
            _ => None,
        }
    }
}

fn rejected(algorithm: Algorithm, part: &str, reason: &dyn Display) -> JoseError {
    JoseError::InvalidKey(format!("{algorithm} {part} key: {reason}"))
}

fn digest(algorithm: Algorithm, data: &[u8]) -> JoseResult<Vec<u8>> {
    match algorithm {
        Algorithm::RS1 => Ok(Sha1::digest(data).to_vec()),
        Algorithm::RS256 | Algorithm::PS256 => Ok(Sha256::digest(data).to_vec()),
        Algorithm::RS384 | Algorithm::PS384 => Ok(Sha384::digest(data).to_vec()),
        Algorithm::RS512 | Algorithm::PS512 => Ok(Sha512::digest(data).to_vec()),
        other => Err(JoseError::unsupported_algorithm(other.name())),
    }
}

fn pkcs1_scheme(algorithm: Algorithm) -> JoseResult<Pkcs1v15Sign> {
    match algorithm {
        Algorithm::RS1 => Ok(Pkcs1v15Sign::new::<Sha1>()),
        Algorithm::RS256 => Ok(Pkcs1v15Sign::new::<Sha256>()),
        Algorithm::RS384 => Ok(Pkcs1v15Sign::new::<Sha384>()),
        Algorithm::RS512 => Ok(Pkcs1v15Sign::new::<Sha512>()),
        other => Err(JoseError::unsupported_algorithm(other.name())),
    }
}

fn pss_scheme(algorithm: Algorithm) -> JoseResult<Pss> {
    match algorithm {
        Algorithm::PS256 => Ok(Pss::new::<Sha256>()),
        Algorithm::PS384 => Ok(Pss::new::<Sha384>()),
        Algorithm::PS512 => Ok(Pss::new::<Sha512>()),
        other => Err(JoseError::unsupported_algorithm(other.name())),
    }
}

// left-padding keeps the integer value of a digest shorter than the field
fn widen(digest: &[u8], size: usize) -> Vec<u8> {
    let mut out = vec![0u8; size.saturating_sub(digest.len())];
    out.extend_from_slice(digest);
    out
}

/// Left-pad an unsigned big-endian integer to `size` bytes.
pub(crate) fn left_pad(bytes: &[u8], size: usize) -> JoseResult<Vec<u8>> {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    let trimmed = &bytes[start..];
    if trimmed.len() > size {
        return Err(JoseError::InvalidKey(format!(
            "integer of {} bytes exceeds {size} bytes",
            trimmed.len()
        )));
    }
    let mut out = vec![0u8; size];
    out[size - trimmed.len()..].copy_from_slice(trimmed);
    Ok(out)
}
