//! Configuration types
//!
//! All options deserialize from camelCase JSON and every field has a
//! default, so partial configuration documents are accepted.

use crate::algorithm::Algorithm;
use crate::error::{JoseError, JoseResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fmt;
use std::str::FromStr;

/// Digest applied to a header `nonce` before verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NonceDigest {
    /// SHA-256
    #[serde(rename = "SHA-256")]
    Sha256,
    /// SHA-384
    #[serde(rename = "SHA-384")]
    Sha384,
    /// SHA-512
    #[serde(rename = "SHA-512")]
    Sha512,
}

impl NonceDigest {
    /// Digest name as used in configuration
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            NonceDigest::Sha256 => "SHA-256",
            NonceDigest::Sha384 => "SHA-384",
            NonceDigest::Sha512 => "SHA-512",
        }
    }

    /// Hash `data`
    #[must_use]
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            NonceDigest::Sha256 => Sha256::digest(data).to_vec(),
            NonceDigest::Sha384 => Sha384::digest(data).to_vec(),
            NonceDigest::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

impl fmt::Display for NonceDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NonceDigest {
    type Err = JoseError;

    fn from_str(s: &str) -> JoseResult<Self> {
        match s {
            "SHA-256" => Ok(NonceDigest::Sha256),
            "SHA-384" => Ok(NonceDigest::Sha384),
            "SHA-512" => Ok(NonceDigest::Sha512),
            other => Err(JoseError::UnsupportedAlgorithm(format!("nonce digest {other}"))),
        }
    }
}

/// Options for signing and validating tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JwtOptions {
    /// Signing algorithm
    pub algorithm: Algorithm,
    /// Extra header members
    pub header: Map<String, Value>,
    /// Do not add `iat` when signing
    pub no_timestamp: bool,
    /// Lifetime added as `exp` when signing, zero for none
    pub expires_in_seconds: u64,
    /// Audience added when signing and required when validating
    pub audience: Vec<String>,
    /// Issuer added when signing and required when validating
    pub issuer: Option<String>,
    /// Subject added when signing
    pub subject: Option<String>,
    /// Permissions injected into generated tokens
    pub permissions: Vec<String>,
    /// Clock skew tolerance in seconds
    pub leeway: u64,
    /// Skip time based claim checks
    pub ignore_expiration: bool,
    /// Nonce digest applied during verification
    pub nonce_algorithm: Option<NonceDigest>,
}

impl Default for JwtOptions {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::HS256,
            header: Map::new(),
            no_timestamp: false,
            expires_in_seconds: 0,
            audience: Vec::new(),
            issuer: None,
            subject: None,
            permissions: Vec::new(),
            leeway: 0,
            ignore_expiration: false,
            nonce_algorithm: None,
        }
    }
}

impl JwtOptions {
    /// Options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the signing algorithm
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Add an extra header member
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: Value) -> Self {
        self.header.insert(name.into(), value);
        self
    }

    /// Suppress `iat`
    #[must_use]
    pub fn with_no_timestamp(mut self, no_timestamp: bool) -> Self {
        self.no_timestamp = no_timestamp;
        self
    }

    /// Set the token lifetime
    #[must_use]
    pub fn with_expires_in_seconds(mut self, seconds: u64) -> Self {
        self.expires_in_seconds = seconds;
        self
    }

    /// Add an audience value
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience.push(audience.into());
        self
    }

    /// Set the issuer
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Set the subject
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Add a permission
    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    /// Set the clock skew tolerance
    #[must_use]
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway = seconds;
        self
    }

    /// Skip time based claim checks
    #[must_use]
    pub fn with_ignore_expiration(mut self, ignore: bool) -> Self {
        self.ignore_expiration = ignore;
        self
    }

    /// Set the nonce digest
    #[must_use]
    pub fn with_nonce_algorithm(mut self, digest: Option<NonceDigest>) -> Self {
        self.nonce_algorithm = digest;
        self
    }
}

/// PEM (or raw HMAC secret) key configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubSecKeyOptions {
    /// Algorithm the key is used with
    pub algorithm: Algorithm,
    /// PEM text, or the secret for HMAC algorithms
    pub buffer: String,
    /// Key id
    #[serde(default)]
    pub id: Option<String>,
}

impl PubSecKeyOptions {
    /// Key options without an id
    #[must_use]
    pub fn new(algorithm: Algorithm, buffer: impl Into<String>) -> Self {
        Self {
            algorithm,
            buffer: buffer.into(),
            id: None,
        }
    }

    /// Set the key id
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl fmt::Debug for PubSecKeyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PubSecKeyOptions")
            .field("algorithm", &self.algorithm)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Configuration of [`JwtAuth`](crate::auth::JwtAuth)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JwtAuthOptions {
    /// PEM keys and HMAC secrets
    pub pub_sec_keys: Vec<PubSecKeyOptions>,
    /// JWK objects
    pub jwks: Vec<Value>,
    /// Signing and validation options
    pub jwt_options: JwtOptions,
    /// Claim holding the permissions, `/` separates nested members
    pub permissions_claim_key: String,
    /// Verify tokens with the `x5c` header chain
    pub allow_embedded_key: bool,
    /// Base64 DER trust anchor for `x5c` chains
    #[serde(rename = "embeddedKeyRootCA")]
    pub embedded_key_root_ca: Option<String>,
}

impl Default for JwtAuthOptions {
    fn default() -> Self {
        Self {
            pub_sec_keys: Vec::new(),
            jwks: Vec::new(),
            jwt_options: JwtOptions::default(),
            permissions_claim_key: "permissions".to_string(),
            allow_embedded_key: false,
            embedded_key_root_ca: None,
        }
    }
}

impl JwtAuthOptions {
    /// Options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a PEM key
    #[must_use]
    pub fn with_pub_sec_key(mut self, key: PubSecKeyOptions) -> Self {
        self.pub_sec_keys.push(key);
        self
    }

    /// Add a JWK
    #[must_use]
    pub fn with_jwk(mut self, jwk: Value) -> Self {
        self.jwks.push(jwk);
        self
    }

    /// Replace the signing and validation options
    #[must_use]
    pub fn with_jwt_options(mut self, options: JwtOptions) -> Self {
        self.jwt_options = options;
        self
    }

    /// Set the permissions claim key
    #[must_use]
    pub fn with_permissions_claim_key(mut self, key: impl Into<String>) -> Self {
        self.permissions_claim_key = key.into();
        self
    }

    /// Enable the `x5c` verification path
    #[must_use]
    pub fn with_embedded_key(mut self, allow: bool) -> Self {
        self.allow_embedded_key = allow;
        self
    }

    /// Set the `x5c` trust anchor
    #[must_use]
    pub fn with_embedded_key_root_ca(mut self, root_ca: impl Into<String>) -> Self {
        self.embedded_key_root_ca = Some(root_ca.into());
        self
    }
}
