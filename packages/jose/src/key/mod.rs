//! Key material: one key plus its algorithm and usage metadata
//!
//! [`KeyMaterial`] is built in two steps. A [`KeyDescription`] is parsed from
//! the external representation, then the signature handles are built from
//! it. The result is immutable and can be shared freely between threads.

pub mod description;
pub(crate) mod handles;
pub mod store;

pub use description::{KeyDescription, KeyUse, PrivateMaterial, PublicMaterial};
pub use store::{KeyStore, KeyStoreEntry, MemoryKeyStore};

use crate::algorithm::{Algorithm, AlgorithmFamily};
use crate::codec;
use crate::error::{JoseError, JoseResult};
use crate::options::PubSecKeyOptions;
use crate::x509;
use chrono::Utc;
use handles::{MacKey, SigningHandle, VerifyingHandle, left_pad};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::debug;

/// A cryptographic key with its algorithm, identity and capabilities.
///
/// At most one signing and one verifying capability are present. HMAC keys
/// carry a single MAC that does both.
pub struct KeyMaterial {
    algorithm: Algorithm,
    kid: Option<String>,
    label: String,
    key_use: KeyUse,
    usage: u8,
    signature_len: usize,
    asn1: bool,
    mac: Option<MacKey>,
    signing: Option<SigningHandle>,
    verifying: Option<VerifyingHandle>,
}

impl KeyMaterial {
    /// Usage bit for signature keys
    pub const USE_SIGNATURE: u8 = 1;
    /// Usage bit for encryption keys
    pub const USE_ENCRYPTION: u8 = 2;

    /// Build key material from PEM text, or a raw secret for HMAC algorithms.
    ///
    /// A private key block yields a signing-only key; a public key or
    /// certificate block yields a verifying-only key.
    ///
    /// # Errors
    ///
    /// Returns format errors for malformed PEM and construction errors for
    /// key bytes the algorithm cannot use.
    pub fn from_pem(options: &PubSecKeyOptions) -> JoseResult<Self> {
        let desc =
            KeyDescription::from_pem(options.algorithm, &options.buffer, options.id.clone())?;
        Self::from_description(desc)
    }

    /// Build key material from a JWK object with ASN.1 transcoding of ECDSA
    /// signatures.
    ///
    /// # Errors
    ///
    /// Fails for an unknown `kty`, an `alg` invalid for the `kty`, missing
    /// members, or an `x5c` chain that does not validate.
    pub fn from_jwk(json: &Value) -> JoseResult<Self> {
        Self::from_jwk_with_asn1(json, true)
    }

    /// Build key material from a JWK converted out of a COSE key.
    ///
    /// COSE carries ECDSA signatures in DER, so no transcoding is applied.
    ///
    /// # Errors
    ///
    /// See [`KeyMaterial::from_jwk`].
    pub fn from_cose_jwk(json: &Value) -> JoseResult<Self> {
        Self::from_jwk_with_asn1(json, false)
    }

    /// Build key material from a JWK object with an explicit ECDSA encoding.
    ///
    /// # Errors
    ///
    /// See [`KeyMaterial::from_jwk`].
    pub fn from_jwk_with_asn1(json: &Value, asn1: bool) -> JoseResult<Self> {
        Self::from_description(KeyDescription::from_jwk(json, asn1)?)
    }

    /// Build key material from a DER certificate and an optional PKCS#8
    /// private key.
    ///
    /// Without a private key the result only verifies.
    ///
    /// # Errors
    ///
    /// Fails for symmetric algorithms, unparsable input or a key that does
    /// not fit `algorithm`.
    pub fn from_certificate(
        algorithm: Algorithm,
        certificate_der: &[u8],
        private_key_der: Option<&[u8]>,
    ) -> JoseResult<Self> {
        Self::from_description(KeyDescription::from_certificate(
            algorithm,
            certificate_der,
            private_key_der,
        )?)
    }

    /// Build an HMAC key from raw secret bytes.
    ///
    /// # Errors
    ///
    /// Fails for non-HMAC algorithms and empty secrets.
    pub fn from_secret(
        algorithm: Algorithm,
        secret: &[u8],
        kid: Option<String>,
    ) -> JoseResult<Self> {
        Self::from_description(KeyDescription::from_secret(algorithm, secret, kid)?)
    }

    /// Build the signature handles for a parsed description.
    ///
    /// # Errors
    ///
    /// Returns construction errors when the described material cannot be
    /// turned into a usable key, and a missing key material error when the
    /// description carries no key at all.
    pub fn from_description(desc: KeyDescription) -> JoseResult<Self> {
        let algorithm = desc.algorithm;
        let label = match &desc.kid {
            Some(kid) => kid.clone(),
            None => {
                let digest = hex::encode(Sha256::digest(&desc.fingerprint));
                format!("{algorithm}#{}", &digest[..16])
            }
        };

        let mut material = KeyMaterial {
            algorithm,
            kid: desc.kid.clone(),
            label,
            key_use: desc.key_use,
            usage: match desc.key_use {
                KeyUse::Sig => Self::USE_SIGNATURE,
                KeyUse::Enc => Self::USE_ENCRYPTION,
            },
            signature_len: algorithm.signature_len(),
            asn1: desc.asn1 && algorithm.uses_asn1(),
            mac: None,
            signing: None,
            verifying: None,
        };

        if algorithm.family() == AlgorithmFamily::Hmac {
            let secret = desc
                .secret
                .ok_or_else(|| JoseError::missing_key_material("HMAC key requires a secret"))?;
            material.mac = Some(MacKey::new(algorithm, secret)?);
            return Ok(material);
        }

        if !desc.x5c.is_empty() {
            material.verifying = Some(Self::chain_leaf(algorithm, &desc.x5c)?);
        } else if let Some(public) = &desc.public {
            material.verifying = Some(VerifyingHandle::from_public(algorithm, public)?);
        }
        if let Some(private) = &desc.private {
            material.signing = Some(SigningHandle::from_private(algorithm, private)?);
        }

        let modulus = material
            .verifying
            .as_ref()
            .and_then(VerifyingHandle::modulus_len)
            .or_else(|| material.signing.as_ref().and_then(SigningHandle::modulus_len));
        if let Some(len) = modulus {
            material.signature_len = len;
        }

        if material.signing.is_none() && material.verifying.is_none() {
            return Err(JoseError::MissingKeyMaterial(format!(
                "no usable key for {algorithm}"
            )));
        }
        Ok(material)
    }

    // the chain is trusted only after every link has been checked
    fn chain_leaf(algorithm: Algorithm, chain: &[Vec<u8>]) -> JoseResult<VerifyingHandle> {
        let certs = chain
            .iter()
            .map(|der| x509::parse_certificate(der))
            .collect::<JoseResult<Vec<_>>>()?;
        x509::check_chain(&certs, false, Utc::now())
            .map_err(|e| JoseError::InvalidKey(format!("x5c chain rejected: {e}")))?;
        let leaf = certs
            .first()
            .ok_or_else(|| JoseError::format("x5c chain is empty"))?;
        VerifyingHandle::from_spki(algorithm, &x509::public_key_der(leaf)?)
    }

    /// Signature algorithm
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Key id, if one was supplied
    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    /// Identity used to detect replacements of the same logical key
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Declared key use
    #[must_use]
    pub fn key_use(&self) -> KeyUse {
        self.key_use
    }

    /// Usage bitmask of [`Self::USE_SIGNATURE`] and [`Self::USE_ENCRYPTION`]
    #[must_use]
    pub fn usage(&self) -> u8 {
        self.usage
    }

    /// True when any bit of `mask` is in the usage bitmask.
    #[must_use]
    pub fn is_for(&self, mask: u8) -> bool {
        self.usage & mask != 0
    }

    /// True when a private key or MAC is present.
    #[must_use]
    pub fn can_sign(&self) -> bool {
        self.mac.is_some() || self.signing.is_some()
    }

    /// True when a public key or MAC is present.
    #[must_use]
    pub fn can_verify(&self) -> bool {
        self.mac.is_some() || self.verifying.is_some()
    }

    /// Raw signature length in bytes (the modulus size for RSA)
    #[must_use]
    pub fn signature_len(&self) -> usize {
        self.signature_len
    }

    /// True for HMAC keys
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        self.algorithm.is_symmetric()
    }

    /// True when ECDSA signatures are transcoded between DER and raw form.
    #[must_use]
    pub fn uses_asn1(&self) -> bool {
        self.asn1
    }

    /// Sign `data` and return the JWS signature bytes.
    ///
    /// # Errors
    ///
    /// Returns [`JoseError::MissingKeyMaterial`] for verify-only keys and
    /// provider errors from the primitive.
    pub fn sign(&self, data: &[u8]) -> JoseResult<Vec<u8>> {
        if let Some(mac) = &self.mac {
            return mac.sign(data);
        }
        let signing = self
            .signing
            .as_ref()
            .ok_or_else(|| JoseError::missing_key_material("key has no private part"))?;

        let signature = signing.sign(self.algorithm, data)?;
        if self.asn1 {
            codec::to_jws(&signature, self.signature_len)
        } else {
            Ok(signature)
        }
    }

    /// Verify `signature` over `data`.
    ///
    /// Raw ECDSA signatures are converted to DER first and short RSA
    /// signatures are left-padded to the modulus size. Signatures that cannot
    /// be interpreted verify as `false`.
    ///
    /// # Errors
    ///
    /// Returns [`JoseError::MissingKeyMaterial`] for sign-only keys.
    pub fn verify(&self, signature: &[u8], data: &[u8]) -> JoseResult<bool> {
        if let Some(mac) = &self.mac {
            return mac.verify(signature, data);
        }
        let verifying = self
            .verifying
            .as_ref()
            .ok_or_else(|| JoseError::missing_key_material("key has no public part"))?;

        if self.asn1 && !codec::is_asn1(signature) {
            return match codec::to_asn1(signature) {
                Ok(der) => Ok(verifying.verify(self.algorithm, data, &der)),
                Err(e) => {
                    debug!(algorithm = %self.algorithm, error = %e, "signature not transcodable");
                    Ok(false)
                }
            };
        }

        if self.algorithm.is_rsa() {
            return match signature.len().cmp(&self.signature_len) {
                std::cmp::Ordering::Less => match left_pad(signature, self.signature_len) {
                    Ok(padded) => Ok(verifying.verify(self.algorithm, data, &padded)),
                    Err(_) => Ok(false),
                },
                std::cmp::Ordering::Equal => Ok(verifying.verify(self.algorithm, data, signature)),
                std::cmp::Ordering::Greater => {
                    debug!(
                        algorithm = %self.algorithm,
                        len = signature.len(),
                        "signature longer than modulus"
                    );
                    Ok(false)
                }
            };
        }

        Ok(verifying.verify(self.algorithm, data, signature))
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("algorithm", &self.algorithm)
            .field("kid", &self.kid)
            .field("label", &self.label)
            .field("key_use", &self.key_use)
            .field("can_sign", &self.can_sign())
            .field("can_verify", &self.can_verify())
            .field("signature_len", &self.signature_len)
            .finish_non_exhaustive()
    }
}
