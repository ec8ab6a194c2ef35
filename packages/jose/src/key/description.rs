//! Format parsing for key material
//!
//! Everything here turns an external representation (PEM text, JWK JSON,
//! certificate bytes, raw secrets) into a [`KeyDescription`] without touching
//! any signature primitive. The crypto handles are built from the
//! description in [`super::handles`].

use crate::algorithm::{Algorithm, AlgorithmFamily};
use crate::error::{JoseError, JoseResult};
use crate::pem::{self, PemKind};
use crate::x509;
use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use zeroize::Zeroizing;

/// Intended use of a key, from the JWK `use` member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyUse {
    /// Signatures
    #[default]
    Sig,
    /// Encryption
    Enc,
}

impl KeyUse {
    /// JWK wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            KeyUse::Sig => "sig",
            KeyUse::Enc => "enc",
        }
    }
}

/// Public half of a key, in whichever encoding the source used
#[derive(Debug, Clone)]
pub enum PublicMaterial {
    /// DER SubjectPublicKeyInfo
    Spki(Vec<u8>),
    /// DER PKCS#1 `RSAPublicKey`
    RsaPkcs1(Vec<u8>),
    /// RSA modulus and exponent, unsigned big-endian
    Rsa {
        /// Modulus
        n: Vec<u8>,
        /// Public exponent
        e: Vec<u8>,
    },
    /// Elliptic curve point coordinates, unsigned big-endian
    Ec {
        /// X coordinate
        x: Vec<u8>,
        /// Y coordinate
        y: Vec<u8>,
    },
    /// Octet key pair public key
    Okp {
        /// Public key bytes
        x: Vec<u8>,
    },
}

/// Private half of a key
#[derive(Clone)]
pub enum PrivateMaterial {
    /// DER PKCS#8 `PrivateKeyInfo`
    Pkcs8(Zeroizing<Vec<u8>>),
    /// DER PKCS#1 `RSAPrivateKey`
    RsaPkcs1(Zeroizing<Vec<u8>>),
    /// RSA CRT components
    Rsa {
        /// Modulus
        n: Vec<u8>,
        /// Public exponent
        e: Vec<u8>,
        /// Private exponent
        d: Zeroizing<Vec<u8>>,
        /// First prime
        p: Zeroizing<Vec<u8>>,
        /// Second prime
        q: Zeroizing<Vec<u8>>,
    },
    /// Elliptic curve private scalar
    Ec {
        /// Scalar, unsigned big-endian
        d: Zeroizing<Vec<u8>>,
    },
    /// Octet key pair seed
    Okp {
        /// Private key bytes
        d: Zeroizing<Vec<u8>>,
    },
}

impl std::fmt::Debug for PrivateMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            PrivateMaterial::Pkcs8(_) => "Pkcs8",
            PrivateMaterial::RsaPkcs1(_) => "RsaPkcs1",
            PrivateMaterial::Rsa { .. } => "Rsa",
            PrivateMaterial::Ec { .. } => "Ec",
            PrivateMaterial::Okp { .. } => "Okp",
        };
        f.debug_tuple("PrivateMaterial").field(&kind).finish()
    }
}

/// Normalized description of one key, independent of its source format
#[derive(Clone)]
pub struct KeyDescription {
    /// Algorithm the key is bound to
    pub algorithm: Algorithm,
    /// Key id
    pub kid: Option<String>,
    /// Declared use
    pub key_use: KeyUse,
    /// Whether ECDSA signatures travel as raw `r || s` (JWS) or DER (COSE)
    pub asn1: bool,
    /// Public material
    pub public: Option<PublicMaterial>,
    /// Private material
    pub private: Option<PrivateMaterial>,
    /// HMAC secret
    pub secret: Option<Zeroizing<Vec<u8>>>,
    /// DER certificates from a JWK `x5c` member, leaf first
    pub x5c: Vec<Vec<u8>>,
    /// Canonical source bytes used to derive a label when no `kid` is present
    pub fingerprint: Vec<u8>,
}

impl std::fmt::Debug for KeyDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyDescription")
            .field("algorithm", &self.algorithm)
            .field("kid", &self.kid)
            .field("key_use", &self.key_use)
            .field("asn1", &self.asn1)
            .field("public", &self.public)
            .field("private", &self.private)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("x5c", &self.x5c.len())
            .finish()
    }
}

impl KeyDescription {
    fn new(algorithm: Algorithm, kid: Option<String>) -> Self {
        Self {
            algorithm,
            kid,
            key_use: KeyUse::Sig,
            asn1: true,
            public: None,
            private: None,
            secret: None,
            x5c: Vec::new(),
            fingerprint: Vec::new(),
        }
    }

    /// Describe a key given as PEM text.
    ///
    /// For HMAC algorithms the text is the raw secret and no PEM structure
    /// is required.
    ///
    /// # Errors
    ///
    /// Returns a format error for malformed PEM and an unsupported algorithm
    /// error for `none`.
    pub fn from_pem(algorithm: Algorithm, pem_text: &str, kid: Option<String>) -> JoseResult<Self> {
        let mut desc = Self::new(algorithm, kid);
        desc.fingerprint = pem_text.as_bytes().to_vec();

        match algorithm.family() {
            AlgorithmFamily::None => return Err(JoseError::unsupported_algorithm(algorithm.name())),
            AlgorithmFamily::Hmac => {
                desc.secret = Some(Zeroizing::new(pem_text.as_bytes().to_vec()));
                return Ok(desc);
            }
            _ => {}
        }

        let block = pem::parse(pem_text)?;
        match block.kind {
            PemKind::Certificate => {
                let cert = x509::parse_certificate(&block.der)?;
                x509::check_validity(&cert, Utc::now())?;
                desc.public = Some(PublicMaterial::Spki(x509::public_key_der(&cert)?));
            }
            PemKind::PublicKey => desc.public = Some(PublicMaterial::Spki(block.der)),
            PemKind::PrivateKey => {
                desc.private = Some(PrivateMaterial::Pkcs8(Zeroizing::new(block.der)));
            }
            PemKind::RsaPublicKey | PemKind::RsaPrivateKey if !algorithm.is_rsa() => {
                return Err(JoseError::invalid_key(
                    "PKCS#1 PEM blocks only carry RSA keys",
                ));
            }
            PemKind::RsaPublicKey => desc.public = Some(PublicMaterial::RsaPkcs1(block.der)),
            PemKind::RsaPrivateKey => {
                desc.private = Some(PrivateMaterial::RsaPkcs1(Zeroizing::new(block.der)));
            }
        }
        Ok(desc)
    }

    /// Describe a key from a JWK JSON object.
    ///
    /// `asn1` selects the ECDSA signature encoding: `true` for JWS, `false`
    /// for keys coming out of COSE structures.
    ///
    /// # Errors
    ///
    /// Returns a format error for malformed members, an unsupported algorithm
    /// error for an unknown `kty` or an `alg` not valid for it, and a missing
    /// key material error when neither public nor private members are set.
    pub fn from_jwk(json: &Value, asn1: bool) -> JoseResult<Self> {
        let doc: JwkDocument = serde_json::from_value(json.clone())
            .map_err(|e| JoseError::Format(format!("Invalid JWK: {e}")))?;

        let algorithm = doc.algorithm()?;
        let mut desc = Self::new(algorithm, doc.kid.clone());
        desc.asn1 = asn1;
        desc.fingerprint = doc.thumbprint_input(json)?;
        desc.key_use = match doc.key_use.as_deref() {
            None | Some("sig") => KeyUse::Sig,
            Some("enc") => KeyUse::Enc,
            Some(other) => return Err(JoseError::Format(format!("Unsupported JWK use: {other}"))),
        };

        match algorithm.family() {
            AlgorithmFamily::Rsa | AlgorithmFamily::RsaPss => doc.rsa_members(&mut desc)?,
            AlgorithmFamily::Ecdsa => doc.ec_members(&mut desc)?,
            AlgorithmFamily::EdDsa => doc.okp_members(&mut desc)?,
            AlgorithmFamily::Hmac => {
                let k = doc
                    .k
                    .as_deref()
                    .ok_or_else(|| JoseError::missing_key_material("oct key requires 'k'"))?;
                desc.secret = Some(Zeroizing::new(b64url("k", k)?));
            }
            AlgorithmFamily::None => return Err(JoseError::unsupported_algorithm(algorithm.name())),
        }

        if desc.public.is_none()
            && desc.private.is_none()
            && desc.secret.is_none()
            && desc.x5c.is_empty()
        {
            return Err(JoseError::missing_key_material(&format!(
                "no key members for kty {}",
                doc.kty
            )));
        }
        Ok(desc)
    }

    /// Describe a key from a DER certificate and an optional PKCS#8 private key.
    ///
    /// # Errors
    ///
    /// Fails for symmetric algorithms, `none`, or an unparsable certificate.
    pub fn from_certificate(
        algorithm: Algorithm,
        certificate_der: &[u8],
        private_key_der: Option<&[u8]>,
    ) -> JoseResult<Self> {
        if matches!(algorithm.family(), AlgorithmFamily::Hmac | AlgorithmFamily::None) {
            return Err(JoseError::unsupported_algorithm(algorithm.name()));
        }
        let cert = x509::parse_certificate(certificate_der)?;

        let mut desc = Self::new(algorithm, None);
        desc.public = Some(PublicMaterial::Spki(x509::public_key_der(&cert)?));
        desc.fingerprint = certificate_der.to_vec();
        if let Some(private) = private_key_der {
            desc.fingerprint.extend_from_slice(private);
            desc.private = Some(PrivateMaterial::Pkcs8(Zeroizing::new(private.to_vec())));
        }
        Ok(desc)
    }

    /// Describe an HMAC key from raw secret bytes.
    ///
    /// # Errors
    ///
    /// Fails for non-HMAC algorithms and empty secrets.
    pub fn from_secret(
        algorithm: Algorithm,
        secret: &[u8],
        kid: Option<String>,
    ) -> JoseResult<Self> {
        if !algorithm.is_symmetric() {
            return Err(JoseError::unsupported_algorithm(algorithm.name()));
        }
        if secret.is_empty() {
            return Err(JoseError::missing_key_material("empty HMAC secret"));
        }
        let mut desc = Self::new(algorithm, kid);
        desc.secret = Some(Zeroizing::new(secret.to_vec()));
        desc.fingerprint = secret.to_vec();
        Ok(desc)
    }
}

/// Serde view of a JWK object (RFC 7517 member names)
#[derive(Debug, Deserialize)]
struct JwkDocument {
    kty: String,
    kid: Option<String>,
    alg: Option<String>,
    #[serde(rename = "use")]
    key_use: Option<String>,
    // RSA
    n: Option<String>,
    e: Option<String>,
    d: Option<String>,
    p: Option<String>,
    q: Option<String>,
    dp: Option<String>,
    dq: Option<String>,
    qi: Option<String>,
    x5c: Option<Vec<String>>,
    // EC / OKP
    crv: Option<String>,
    x: Option<String>,
    y: Option<String>,
    // oct
    k: Option<String>,
}

impl JwkDocument {
    // RFC 7638 member set, so member order and private parts do not change it
    fn thumbprint_input(&self, json: &Value) -> JoseResult<Vec<u8>> {
        let required: &[&str] = match self.kty.as_str() {
            "RSA" | "RSASSA" => &["e", "kty", "n"],
            "EC" => &["crv", "kty", "x", "y"],
            "OKP" => &["crv", "kty", "x"],
            "oct" => &["k", "kty"],
            _ => &["kty"],
        };
        let mut members: BTreeMap<&str, &Value> = required
            .iter()
            .filter_map(|name| json.get(*name).map(|value| (*name, value)))
            .collect();
        // certificate-only keys are identified by their chain
        if members.len() == 1 {
            if let Some(x5c) = json.get("x5c") {
                members.insert("x5c", x5c);
            }
        }
        Ok(serde_json::to_vec(&members)?)
    }

    fn algorithm(&self) -> JoseResult<Algorithm> {
        let default = match self.kty.as_str() {
            "RSA" | "RSASSA" => "RS256",
            "EC" => "ES256",
            "oct" => "HS256",
            "OKP" => "EdDSA",
            other => return Err(JoseError::unsupported_algorithm(&format!("kty {other}"))),
        };
        let algorithm: Algorithm = self.alg.as_deref().unwrap_or(default).parse()?;

        let family_ok = match self.kty.as_str() {
            "RSA" | "RSASSA" => algorithm.is_rsa(),
            "EC" => algorithm.family() == AlgorithmFamily::Ecdsa,
            "oct" => algorithm.is_symmetric(),
            _ => algorithm == Algorithm::EdDSA,
        };
        if !family_ok {
            return Err(JoseError::UnsupportedAlgorithm(format!(
                "{algorithm} for kty {}",
                self.kty
            )));
        }
        Ok(algorithm)
    }

    fn rsa_members(&self, desc: &mut KeyDescription) -> JoseResult<()> {
        if let (Some(n), Some(e)) = (&self.n, &self.e) {
            desc.public = Some(PublicMaterial::Rsa {
                n: b64url("n", n)?,
                e: b64url("e", e)?,
            });
        }

        // the CRT parameters are all required even though only p and q are used
        if let (Some(n), Some(e), Some(d), Some(p), Some(q), Some(_), Some(_), Some(_)) = (
            &self.n, &self.e, &self.d, &self.p, &self.q, &self.dp, &self.dq, &self.qi,
        ) {
            desc.private = Some(PrivateMaterial::Rsa {
                n: b64url("n", n)?,
                e: b64url("e", e)?,
                d: Zeroizing::new(b64url("d", d)?),
                p: Zeroizing::new(b64url("p", p)?),
                q: Zeroizing::new(b64url("q", q)?),
            });
        }

        if let Some(chain) = &self.x5c {
            if chain.is_empty() {
                return Err(JoseError::format("x5c chain is empty"));
            }
            desc.x5c = chain
                .iter()
                .map(|cert| {
                    STANDARD
                        .decode(cert)
                        .map_err(|e| JoseError::Format(format!("Invalid x5c entry: {e}")))
                })
                .collect::<JoseResult<_>>()?;
        }
        Ok(())
    }

    fn ec_members(&self, desc: &mut KeyDescription) -> JoseResult<()> {
        let crv = self
            .crv
            .as_deref()
            .ok_or_else(|| JoseError::missing_key_material("EC key requires 'crv'"))?;
        if desc.algorithm.curve() != Some(crv) {
            return Err(JoseError::UnsupportedAlgorithm(format!(
                "curve {crv} for {}",
                desc.algorithm
            )));
        }

        if let (Some(x), Some(y)) = (&self.x, &self.y) {
            desc.public = Some(PublicMaterial::Ec {
                x: b64url("x", x)?,
                y: b64url("y", y)?,
            });
            if let Some(d) = &self.d {
                desc.private = Some(PrivateMaterial::Ec {
                    d: Zeroizing::new(b64url("d", d)?),
                });
            }
        }
        Ok(())
    }

    fn okp_members(&self, desc: &mut KeyDescription) -> JoseResult<()> {
        match self.crv.as_deref() {
            Some("Ed25519") => {}
            Some(other) => {
                return Err(JoseError::UnsupportedAlgorithm(format!("curve {other} for EdDSA")));
            }
            None => return Err(JoseError::missing_key_material("OKP key requires 'crv'")),
        }
        if let Some(x) = &self.x {
            desc.public = Some(PublicMaterial::Okp { x: b64url("x", x)? });
            if let Some(d) = &self.d {
                desc.private = Some(PrivateMaterial::Okp {
                    d: Zeroizing::new(b64url("d", d)?),
                });
            }
        }
        Ok(())
    }
}

fn b64url(member: &str, value: &str) -> JoseResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|e| JoseError::Format(format!("Invalid base64url in '{member}': {e}")))
}
