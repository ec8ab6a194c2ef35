//! JSON Web Key, JSON Web Signature and JSON Web Token primitives
//!
//! This crate provides:
//! - Key material from PEM, JWK, key stores and certificates
//! - HS*, RS*, PS*, ES*, ES256K and EdDSA signatures
//! - DER to raw transcoding of ECDSA signatures
//! - A token engine with per-algorithm key rings, key rotation and `kid` selection
//! - Optional verification with a token's embedded `x5c` chain
//! - Claim validation and a JWT authentication provider

pub mod algorithm;
pub mod auth;
pub mod claims;
pub mod codec;
mod error;
pub mod jwt;
pub mod key;
pub mod options;
pub mod pem;
pub mod ring;
pub mod token;
pub mod x509;

pub use algorithm::{Algorithm, AlgorithmFamily};
pub use auth::{AuthenticatedUser, JwtAuth};
pub use error::*;
pub use jwt::Jwt;
pub use key::{KeyMaterial, KeyStore, KeyStoreEntry, KeyUse, MemoryKeyStore};
pub use options::{JwtAuthOptions, JwtOptions, NonceDigest, PubSecKeyOptions};
pub use ring::KeyRing;
pub use token::{CompactToken, DecodedToken, JsonObject};
