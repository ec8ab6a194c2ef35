//! Loading key material from a key store
//!
//! Keys are looked up under their algorithm name as alias. HMAC aliases hold
//! secrets, the asymmetric aliases hold a certificate with an optional
//! private key.

use super::KeyMaterial;
use crate::algorithm::Algorithm;
use crate::error::{JoseError, JoseResult};
use crate::x509;
use chrono::Utc;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};
use zeroize::Zeroizing;

const SECRET_ALIASES: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

const CERTIFICATE_ALIASES: [Algorithm; 7] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::ES256K,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::ES512,
];

/// Native algorithm name and OID a key store reports for an alias.
#[must_use]
pub fn native_algorithm(alias: Algorithm) -> Option<(&'static str, &'static str)> {
    match alias {
        Algorithm::HS256 => Some(("HMacSHA256", "1.2.840.113549.2.9")),
        Algorithm::HS384 => Some(("HMacSHA384", "1.2.840.113549.2.10")),
        Algorithm::HS512 => Some(("HMacSHA512", "1.2.840.113549.2.11")),
        Algorithm::RS256 => Some(("SHA256withRSA", "1.2.840.113549.1.1.11")),
        Algorithm::RS384 => Some(("SHA384withRSA", "1.2.840.113549.1.1.12")),
        Algorithm::RS512 => Some(("SHA512withRSA", "1.2.840.113549.1.1.13")),
        Algorithm::ES256 | Algorithm::ES256K => Some(("SHA256withECDSA", "1.2.840.10045.4.3.2")),
        Algorithm::ES384 => Some(("SHA384withECDSA", "1.2.840.10045.4.3.3")),
        Algorithm::ES512 => Some(("SHA512withECDSA", "1.2.840.10045.4.3.4")),
        _ => None,
    }
}

fn matches_native(alias: Algorithm, reported: &str) -> bool {
    native_algorithm(alias)
        .is_some_and(|(name, oid)| reported.eq_ignore_ascii_case(name) || reported == oid)
}

/// One key store entry
#[derive(Clone)]
pub enum KeyStoreEntry {
    /// Symmetric secret with the algorithm name it was stored under
    Secret {
        /// Native algorithm name (`HMacSHA256`) or OID
        algorithm: String,
        /// Secret bytes
        key: Zeroizing<Vec<u8>>,
    },
    /// Certificate with an optional PKCS#8 private key
    PrivateKey {
        /// DER certificate
        certificate: Vec<u8>,
        /// DER PKCS#8 private key
        private_key: Option<Zeroizing<Vec<u8>>>,
    },
}

impl fmt::Debug for KeyStoreEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyStoreEntry::Secret { algorithm, .. } => f
                .debug_struct("Secret")
                .field("algorithm", algorithm)
                .finish_non_exhaustive(),
            KeyStoreEntry::PrivateKey { private_key, .. } => f
                .debug_struct("PrivateKey")
                .field("has_private_key", &private_key.is_some())
                .finish_non_exhaustive(),
        }
    }
}

/// Source of stored keys, addressed by alias
pub trait KeyStore: Send + Sync {
    /// Look up `alias`, unlocking it with `password` when protected.
    ///
    /// `Ok(None)` means the alias does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`JoseError::KeyStore`] when the entry exists but cannot be read.
    fn entry(&self, alias: &str, password: Option<&str>) -> JoseResult<Option<KeyStoreEntry>>;
}

/// In-memory key store
#[derive(Default, Clone)]
pub struct MemoryKeyStore {
    entries: HashMap<String, (KeyStoreEntry, Option<Zeroizing<String>>)>,
}

impl fmt::Debug for MemoryKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl MemoryKeyStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an unprotected entry.
    pub fn insert(&mut self, alias: impl Into<String>, entry: KeyStoreEntry) {
        self.entries.insert(alias.into(), (entry, None));
    }

    /// Store an entry that can only be read with `password`.
    pub fn insert_protected(
        &mut self,
        alias: impl Into<String>,
        entry: KeyStoreEntry,
        password: &str,
    ) {
        self.entries
            .insert(alias.into(), (entry, Some(Zeroizing::new(password.to_string()))));
    }

    /// Builder form of [`MemoryKeyStore::insert`]
    #[must_use]
    pub fn with_entry(mut self, alias: impl Into<String>, entry: KeyStoreEntry) -> Self {
        self.insert(alias, entry);
        self
    }
}

impl KeyStore for MemoryKeyStore {
    fn entry(&self, alias: &str, password: Option<&str>) -> JoseResult<Option<KeyStoreEntry>> {
        let Some((entry, expected)) = self.entries.get(alias) else {
            return Ok(None);
        };
        match expected {
            Some(expected) if password != Some(expected.as_str()) => {
                Err(JoseError::KeyStore(format!("cannot recover key for alias {alias}")))
            }
            _ => Ok(Some(entry.clone())),
        }
    }
}

impl KeyMaterial {
    /// Load every algorithm alias present in `store`.
    ///
    /// Secrets are read with `password`. Certificate entries are read with
    /// their own entry from `per_alias_passwords` when given, else with
    /// `password`. Aliases that are missing, unreadable, expired or stored
    /// under another algorithm are skipped.
    #[must_use]
    pub fn load_key_store(
        store: &dyn KeyStore,
        password: Option<&str>,
        per_alias_passwords: Option<&HashMap<String, String>>,
    ) -> Vec<KeyMaterial> {
        let mut keys = Vec::new();

        for alias in SECRET_ALIASES {
            match load_secret(store, alias, password) {
                Ok(Some(key)) => keys.push(key),
                Ok(None) => debug!(%alias, "key store has no entry"),
                Err(e) => warn!(%alias, error = %e, "Failed to load key for algorithm"),
            }
        }

        for alias in CERTIFICATE_ALIASES {
            let password = match per_alias_passwords {
                Some(map) => map.get(alias.name()).map(String::as_str),
                None => password,
            };
            match load_certificate(store, alias, password) {
                Ok(Some(key)) => keys.push(key),
                Ok(None) => debug!(%alias, "key store has no entry"),
                Err(e) => warn!(%alias, error = %e, "Failed to load key for algorithm"),
            }
        }

        keys
    }
}

fn load_secret(
    store: &dyn KeyStore,
    alias: Algorithm,
    password: Option<&str>,
) -> JoseResult<Option<KeyMaterial>> {
    match store.entry(alias.name(), password)? {
        None => Ok(None),
        Some(KeyStoreEntry::Secret { algorithm, key }) => {
            if !matches_native(alias, &algorithm) {
                return Err(JoseError::KeyStore(format!(
                    "The key algorithm {algorithm} does not match {alias}"
                )));
            }
            KeyMaterial::from_secret(alias, &key, None).map(Some)
        }
        Some(KeyStoreEntry::PrivateKey { .. }) => Err(JoseError::KeyStore(format!(
            "alias {alias} holds a key pair, expected a secret"
        ))),
    }
}

fn load_certificate(
    store: &dyn KeyStore,
    alias: Algorithm,
    password: Option<&str>,
) -> JoseResult<Option<KeyMaterial>> {
    match store.entry(alias.name(), password)? {
        None => Ok(None),
        Some(KeyStoreEntry::PrivateKey { certificate, private_key }) => {
            let cert = x509::parse_certificate(&certificate)?;
            x509::check_validity(&cert, Utc::now())?;

            // the issuer's signature algorithm is what the store reports
            let reported = cert.signature_algorithm.oid.to_string();
            if !matches_native(alias, &reported) {
                return Err(JoseError::KeyStore(format!(
                    "The certificate algorithm {reported} does not match {alias}"
                )));
            }
            KeyMaterial::from_certificate(
                alias,
                &certificate,
                private_key.as_deref().map(Vec::as_slice),
            )
            .map(Some)
        }
        Some(KeyStoreEntry::Secret { .. }) => Err(JoseError::KeyStore(format!(
            "alias {alias} holds a secret, expected a key pair"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(algorithm: &str) -> KeyStoreEntry {
        KeyStoreEntry::Secret {
            algorithm: algorithm.to_string(),
            key: Zeroizing::new(b"keystore-secret".to_vec()),
        }
    }

    #[test]
    fn native_names_match_case_insensitively_or_by_oid() {
        assert!(matches_native(Algorithm::HS256, "hmacsha256"));
        assert!(matches_native(Algorithm::HS384, "1.2.840.113549.2.10"));
        assert!(!matches_native(Algorithm::HS512, "HMacSHA256"));
        assert!(matches_native(Algorithm::ES256K, "SHA256withECDSA"));
    }

    #[test]
    fn mismatched_secret_is_skipped() {
        let store = MemoryKeyStore::new()
            .with_entry("HS256", secret("HMacSHA256"))
            .with_entry("HS384", secret("HMacSHA512"));
        let keys = KeyMaterial::load_key_store(&store, None, None);
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].algorithm(), Algorithm::HS256);
    }

    #[test]
    fn protected_entry_needs_password() {
        let mut store = MemoryKeyStore::new();
        store.insert_protected("HS512", secret("HMacSHA512"), "changeit");
        assert!(KeyMaterial::load_key_store(&store, None, None).is_empty());
        assert!(KeyMaterial::load_key_store(&store, Some("wrong"), None).is_empty());
        assert_eq!(KeyMaterial::load_key_store(&store, Some("changeit"), None).len(), 1);
    }

    #[test]
    fn debug_hides_secrets() {
        let printed = format!("{:?}", secret("HMacSHA256"));
        assert_eq!(printed, r#"Secret { algorithm: "HMacSHA256", .. }"#);
    }
}
