//! JWS algorithm identifiers
//!
//! Every algorithm the engine understands is a variant of [`Algorithm`].
//! Strings coming from headers, JWKs or configuration are mapped into the
//! enum at the boundary, so an unknown name never reaches the key rings.

use crate::error::{JoseError, JoseResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Signature algorithm (RFC 7518 names plus the legacy `RS1`).
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Algorithm {
    /// HMAC with SHA-256
    HS256,
    /// HMAC with SHA-384
    HS384,
    /// HMAC with SHA-512
    HS512,
    /// RSASSA-PKCS1-v1_5 with SHA-256
    RS256,
    /// RSASSA-PKCS1-v1_5 with SHA-384
    RS384,
    /// RSASSA-PKCS1-v1_5 with SHA-512
    RS512,
    /// RSASSA-PKCS1-v1_5 with SHA-1, only for legacy COSE keys
    RS1,
    /// RSASSA-PSS with SHA-256
    PS256,
    /// RSASSA-PSS with SHA-384
    PS384,
    /// RSASSA-PSS with SHA-512
    PS512,
    /// ECDSA on P-256 with SHA-256
    ES256,
    /// ECDSA on P-384 with SHA-384
    ES384,
    /// ECDSA on P-521 with SHA-512
    ES512,
    /// ECDSA on secp256k1 with SHA-256
    ES256K,
    /// Ed25519
    EdDSA,
    /// Unsecured JWS
    #[serde(rename = "none")]
    None,
}

/// Primitive family behind an [`Algorithm`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmFamily {
    /// Symmetric MAC
    Hmac,
    /// RSA PKCS#1 v1.5
    Rsa,
    /// RSA PSS
    RsaPss,
    /// Elliptic curve DSA
    Ecdsa,
    /// Edwards curve DSA
    EdDsa,
    /// No signature
    None,
}

impl Algorithm {
    /// All algorithms, in declaration order.
    pub const ALL: [Algorithm; 16] = [
        Algorithm::HS256,
        Algorithm::HS384,
        Algorithm::HS512,
        Algorithm::RS256,
        Algorithm::RS384,
        Algorithm::RS512,
        Algorithm::RS1,
        Algorithm::PS256,
        Algorithm::PS384,
        Algorithm::PS512,
        Algorithm::ES256,
        Algorithm::ES384,
        Algorithm::ES512,
        Algorithm::ES256K,
        Algorithm::EdDSA,
        Algorithm::None,
    ];

    /// Wire name of the algorithm
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Algorithm::HS256 => "HS256",
            Algorithm::HS384 => "HS384",
            Algorithm::HS512 => "HS512",
            Algorithm::RS256 => "RS256",
            Algorithm::RS384 => "RS384",
            Algorithm::RS512 => "RS512",
            Algorithm::RS1 => "RS1",
            Algorithm::PS256 => "PS256",
            Algorithm::PS384 => "PS384",
            Algorithm::PS512 => "PS512",
            Algorithm::ES256 => "ES256",
            Algorithm::ES384 => "ES384",
            Algorithm::ES512 => "ES512",
            Algorithm::ES256K => "ES256K",
            Algorithm::EdDSA => "EdDSA",
            Algorithm::None => "none",
        }
    }

    /// Primitive family
    #[must_use]
    pub const fn family(self) -> AlgorithmFamily {
        match self {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => AlgorithmFamily::Hmac,
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 | Algorithm::RS1 => {
                AlgorithmFamily::Rsa
            }
            Algorithm::PS256 | Algorithm::PS384 | Algorithm::PS512 => AlgorithmFamily::RsaPss,
            Algorithm::ES256 | Algorithm::ES384 | Algorithm::ES512 | Algorithm::ES256K => {
                AlgorithmFamily::Ecdsa
            }
            Algorithm::EdDSA => AlgorithmFamily::EdDsa,
            Algorithm::None => AlgorithmFamily::None,
        }
    }

    /// True for HMAC algorithms, where one key both signs and verifies.
    #[must_use]
    pub const fn is_symmetric(self) -> bool {
        matches!(self.family(), AlgorithmFamily::Hmac)
    }

    /// True for RSA based algorithms (PKCS#1 v1.5 and PSS).
    #[must_use]
    pub const fn is_rsa(self) -> bool {
        matches!(self.family(), AlgorithmFamily::Rsa | AlgorithmFamily::RsaPss)
    }

    /// True when the primitive speaks DER but the JWS wire format is raw `r || s`.
    #[must_use]
    pub const fn uses_asn1(self) -> bool {
        matches!(self.family(), AlgorithmFamily::Ecdsa)
    }

    /// Nominal raw signature length in bytes.
    ///
    /// For RSA this is the 2048-bit default; key material reports the real
    /// modulus size.
    #[must_use]
    pub const fn signature_len(self) -> usize {
        match self {
            Algorithm::HS256 => 32,
            Algorithm::HS384 => 48,
            Algorithm::HS512 => 64,
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::RS1
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => 256,
            Algorithm::ES256 | Algorithm::ES256K => 64,
            Algorithm::ES384 => 96,
            Algorithm::ES512 => 132,
            Algorithm::EdDSA => 64,
            Algorithm::None => 0,
        }
    }

    /// JWK `crv` for elliptic curve algorithms
    #[must_use]
    pub const fn curve(self) -> Option<&'static str> {
        match self {
            Algorithm::ES256 => Some("P-256"),
            Algorithm::ES384 => Some("P-384"),
            Algorithm::ES512 => Some("P-521"),
            Algorithm::ES256K => Some("secp256k1"),
            Algorithm::EdDSA => Some("Ed25519"),
            _ => None,
        }
    }

    /// JWK `kty` for keys of this algorithm
    #[must_use]
    pub const fn key_type(self) -> &'static str {
        match self.family() {
            AlgorithmFamily::Hmac => "oct",
            AlgorithmFamily::Rsa => "RSA",
            AlgorithmFamily::RsaPss => "RSASSA",
            AlgorithmFamily::Ecdsa => "EC",
            AlgorithmFamily::EdDsa => "OKP",
            AlgorithmFamily::None => "none",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = JoseError;

    fn from_str(s: &str) -> JoseResult<Self> {
        Algorithm::ALL
            .iter()
            .copied()
            .find(|alg| alg.name() == s)
            .ok_or_else(|| JoseError::unsupported_algorithm(s))
    }
}
