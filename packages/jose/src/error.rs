//! Error types for key material, signature transcoding and token processing

use thiserror::Error;

/// Result type used throughout the crate
pub type JoseResult<T> = Result<T, JoseError>;

/// Coarse classification of a [`JoseError`].
///
/// Callers branch on the kind instead of matching message strings. A
/// [`ErrorKind::NoSuchKey`] tells the caller that fetching fresh key material
/// may help, while [`ErrorKind::Signature`] means the candidates that exist
/// rejected the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed token, PEM, DER or JWK input
    Format,
    /// No key registered for the algorithm or key id
    NoSuchKey,
    /// Signature or certificate verification failed
    Signature,
    /// Key material could not be constructed
    Construction,
    /// Protocol misuse for the current security mode
    Policy,
    /// Standard claim validation failed
    Claims,
}

/// JOSE errors
#[derive(Debug, Error)]
pub enum JoseError {
    /// Structural defect in the input
    #[error("Invalid format: {0}")]
    Format(String),

    /// No candidate key for the algorithm, or none matching the token's `kid`
    #[error("No such key id: algorithm={algorithm}, kid={kid:?}")]
    NoSuchKeyId {
        /// Algorithm named by the token header
        algorithm: String,
        /// Key id named by the token header, if any
        kid: Option<String>,
    },

    /// Every candidate key rejected the signature
    #[error("Signature verification failed")]
    InvalidSignature,

    /// Certificate or certificate chain rejected
    #[error("Certificate validation failed: {0}")]
    Certificate(String),

    /// Algorithm name is unknown or not valid for the key type
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Key bytes or parameters are unusable
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Required key fields are absent
    #[error("Missing key material: {0}")]
    MissingKeyMaterial(String),

    /// Signature primitive could not be driven
    #[error("Crypto provider error: {0}")]
    Provider(String),

    /// Token or request not allowed in the current security mode
    #[error("Policy violation: {0}")]
    Policy(String),

    /// No signing key is registered for the requested algorithm
    #[error("Algorithm not supported/allowed: {0}")]
    AlgorithmNotAllowed(String),

    /// Token has expired
    #[error("Token has expired")]
    TokenExpired,

    /// Token not yet valid
    #[error("Token not yet valid")]
    TokenNotYetValid,

    /// Audience claim does not intersect the expected audience
    #[error("Invalid audience, expected one of: {0:?}")]
    InvalidAudience(Vec<String>),

    /// Issuer claim does not match
    #[error("Invalid issuer")]
    InvalidIssuer,

    /// Malformed standard claims
    #[error("Invalid claims: {0}")]
    InvalidClaims(String),

    /// Key store access failed
    #[error("Key store error: {0}")]
    KeyStore(String),

    /// JSON serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl JoseError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            JoseError::Format(_) | JoseError::Serialization(_) => ErrorKind::Format,
            JoseError::NoSuchKeyId { .. } => ErrorKind::NoSuchKey,
            JoseError::InvalidSignature | JoseError::Certificate(_) => ErrorKind::Signature,
            JoseError::UnsupportedAlgorithm(_)
            | JoseError::InvalidKey(_)
            | JoseError::MissingKeyMaterial(_)
            | JoseError::Provider(_)
            | JoseError::KeyStore(_) => ErrorKind::Construction,
            JoseError::Policy(_) | JoseError::AlgorithmNotAllowed(_) => ErrorKind::Policy,
            JoseError::TokenExpired
            | JoseError::TokenNotYetValid
            | JoseError::InvalidAudience(_)
            | JoseError::InvalidIssuer
            | JoseError::InvalidClaims(_) => ErrorKind::Claims,
        }
    }

    /// Create a format error
    #[inline]
    #[must_use]
    pub fn format(msg: &str) -> Self {
        JoseError::Format(msg.to_string())
    }

    /// Create a no-such-key error
    #[inline]
    #[must_use]
    pub fn no_such_key(algorithm: &str, kid: Option<&str>) -> Self {
        JoseError::NoSuchKeyId {
            algorithm: algorithm.to_string(),
            kid: kid.map(str::to_string),
        }
    }

    /// Create a certificate error
    #[inline]
    #[must_use]
    pub fn certificate(msg: &str) -> Self {
        JoseError::Certificate(msg.to_string())
    }

    /// Create an unsupported algorithm error
    #[inline]
    #[must_use]
    pub fn unsupported_algorithm(alg: &str) -> Self {
        JoseError::UnsupportedAlgorithm(alg.to_string())
    }

    /// Create an invalid key error
    #[inline]
    #[must_use]
    pub fn invalid_key(msg: &str) -> Self {
        JoseError::InvalidKey(msg.to_string())
    }

    /// Create a missing key material error
    #[inline]
    #[must_use]
    pub fn missing_key_material(msg: &str) -> Self {
        JoseError::MissingKeyMaterial(msg.to_string())
    }

    /// Create a provider error
    #[inline]
    #[must_use]
    pub fn provider(msg: &str) -> Self {
        JoseError::Provider(msg.to_string())
    }

    /// Create a policy error
    #[inline]
    #[must_use]
    pub fn policy(msg: &str) -> Self {
        JoseError::Policy(msg.to_string())
    }

    /// Create an invalid claims error
    #[inline]
    #[must_use]
    pub fn invalid_claims(msg: &str) -> Self {
        JoseError::InvalidClaims(msg.to_string())
    }

    /// Create a key store error
    #[inline]
    #[must_use]
    pub fn key_store(msg: &str) -> Self {
        JoseError::KeyStore(msg.to_string())
    }
}
