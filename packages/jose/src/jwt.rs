//! JWT token engine
//!
//! The engine keeps two maps of [`KeyRing`]s keyed by algorithm, one for
//! signing and one for verification. An engine without any key is in
//! unsecured mode and only produces and accepts `alg: none` tokens.
//!
//! ```no_run
//! use cryypt_jose::{Algorithm, Jwt, JwtOptions, KeyMaterial};
//! use serde_json::json;
//!
//! # fn main() -> cryypt_jose::JoseResult<()> {
//! let jwt = Jwt::new();
//! jwt.add_jwk(KeyMaterial::from_secret(Algorithm::HS256, b"secret", None)?);
//!
//! let mut claims = serde_json::Map::new();
//! claims.insert("sub".to_string(), json!("alice"));
//! let token = jwt.sign(&claims, &JwtOptions::new())?;
//! let payload = jwt.decode(&token)?;
//! assert_eq!(payload["sub"], "alice");
//! # Ok(())
//! # }
//! ```

use crate::algorithm::Algorithm;
use crate::error::{JoseError, JoseResult};
use crate::key::KeyMaterial;
use crate::options::{JwtOptions, NonceDigest};
use crate::ring::KeyRing;
use crate::token::{self, CompactToken, DecodedToken, JsonObject};
use crate::x509;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use x509_cert::Certificate;
use x509_cert::der::Encode;

/// Compact JWS/JWT engine with per-algorithm key rings
#[derive(Debug, Default)]
pub struct Jwt {
    sign_rings: DashMap<Algorithm, KeyRing>,
    verify_rings: DashMap<Algorithm, KeyRing>,
    allow_embedded_key: bool,
    root_ca: Option<Certificate>,
    nonce_digest: Option<NonceDigest>,
}

impl Jwt {
    /// Engine without keys, in unsecured mode
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable verification with the token's own `x5c` chain.
    ///
    /// Disabled by default. Whoever creates the token also creates the
    /// embedded certificate, so without a trust anchor set through
    /// [`Jwt::with_embedded_key_root_ca`] any self-signed certificate passes.
    #[must_use]
    pub fn with_embedded_key(mut self, allow: bool) -> Self {
        self.allow_embedded_key = allow;
        self
    }

    /// Anchor embedded `x5c` chains to a root certificate and enable the
    /// embedded key path.
    ///
    /// # Errors
    ///
    /// Returns a format error when `root_ca` is not standard base64 DER.
    pub fn with_embedded_key_root_ca(mut self, root_ca: &str) -> JoseResult<Self> {
        self.root_ca = Some(x509::parse_base64_certificate(root_ca)?);
        self.allow_embedded_key = true;
        Ok(self)
    }

    /// Digest the header `nonce` before verification.
    #[must_use]
    pub fn with_nonce_algorithm(mut self, digest: Option<NonceDigest>) -> Self {
        self.nonce_digest = digest;
        self
    }

    /// True when the embedded key path is enabled
    #[must_use]
    pub fn allows_embedded_key(&self) -> bool {
        self.allow_embedded_key
    }

    /// Register key material.
    ///
    /// Keys with a public part or MAC go to the verification ring, keys
    /// with a private part or MAC to the signing ring. An entry with the
    /// same label is replaced in place. Encryption keys are skipped.
    pub fn add_jwk(&self, key: KeyMaterial) -> &Self {
        if !key.is_for(KeyMaterial::USE_SIGNATURE) {
            warn!(
                label = key.label(),
                key_use = key.key_use().as_str(),
                "JWK skipped: use is not sig"
            );
            return self;
        }

        let algorithm = key.algorithm();
        let key = Arc::new(key);
        if key.can_verify() {
            self.verify_rings.entry(algorithm).or_default().insert(Arc::clone(&key));
        }
        if key.can_sign() {
            self.sign_rings.entry(algorithm).or_default().insert(key);
        }
        self
    }

    /// True when no key has been registered for signing or verification.
    #[must_use]
    pub fn is_unsecure(&self) -> bool {
        self.sign_rings.is_empty() && self.verify_rings.is_empty()
    }

    /// Algorithms with at least one key, plus `none`.
    #[must_use]
    pub fn available_algorithms(&self) -> BTreeSet<Algorithm> {
        let mut algorithms = BTreeSet::from([Algorithm::None]);
        algorithms.extend(self.sign_rings.iter().map(|entry| *entry.key()));
        algorithms.extend(self.verify_rings.iter().map(|entry| *entry.key()));
        algorithms
    }

    /// Number of verification keys registered for `algorithm`
    #[must_use]
    pub fn verify_key_count(&self, algorithm: Algorithm) -> usize {
        self.verify_rings.get(&algorithm).map_or(0, |ring| ring.len())
    }

    /// Number of signing keys registered for `algorithm`
    #[must_use]
    pub fn sign_key_count(&self, algorithm: Algorithm) -> usize {
        self.sign_rings.get(&algorithm).map_or(0, |ring| ring.len())
    }

    /// Verify `token` and return its claims.
    ///
    /// # Errors
    ///
    /// See [`Jwt::decode_full`].
    pub fn decode(&self, token: &str) -> JoseResult<JsonObject> {
        self.decode_full(token).map(|decoded| decoded.payload)
    }

    /// Verify `token` and return its header and claims.
    ///
    /// # Errors
    ///
    /// - [`JoseError::Format`] for malformed tokens
    /// - [`JoseError::Policy`] for a segment count or `alg` the current mode
    ///   does not accept
    /// - [`JoseError::NoSuchKeyId`] when no key is registered for the
    ///   algorithm or none matches the `kid`
    /// - [`JoseError::InvalidSignature`] when every candidate key rejected
    ///   the signature
    /// - [`JoseError::Certificate`] when an embedded chain does not validate
    pub fn decode_full(&self, token: &str) -> JoseResult<DecodedToken> {
        let token = CompactToken::parse(token)?;
        let unsecure = self.is_unsecure();

        if !self.allow_embedded_key {
            match (unsecure, token.segment_count()) {
                (true, 3) => {
                    return Err(JoseError::policy("JWT is in unsecured mode but token is signed."));
                }
                (false, 2) => {
                    return Err(JoseError::policy("JWT is in secure mode but token is not signed."));
                }
                _ => {}
            }
        }

        let alg = token
            .algorithm()
            .ok_or_else(|| JoseError::format("missing alg header"))?
            .to_string();
        if !unsecure && alg == Algorithm::None.name() {
            return Err(JoseError::policy("Algorithm \"none\" not allowed"));
        }

        if self.allow_embedded_key && token.header.contains_key("x5c") {
            return self.verify_embedded(&alg, token);
        }

        if unsecure {
            if token.signature.is_some() {
                return Err(JoseError::policy("JWT is in unsecured mode but token is signed."));
            }
            if alg != Algorithm::None.name() {
                return Err(JoseError::Policy(format!(
                    "JWT is in unsecured mode, algorithm {alg} not allowed"
                )));
            }
            return Ok(token.into_decoded());
        }

        self.verify_with_rings(&alg, token)
    }

    fn verify_with_rings(&self, alg: &str, token: CompactToken) -> JoseResult<DecodedToken> {
        let candidates = alg
            .parse::<Algorithm>()
            .ok()
            .and_then(|algorithm| self.verify_rings.get(&algorithm).map(|ring| ring.snapshot()))
            .filter(|keys| !keys.is_empty())
            .ok_or_else(|| JoseError::no_such_key(alg, None))?;
        trace!(alg, candidates = candidates.len(), "verification ring lookup");

        let signature = token
            .signature
            .as_deref()
            .ok_or_else(|| JoseError::format("missing signature segment"))?;

        let header_segment = match self.nonce_digest {
            Some(digest) => digest_nonce(&token.header, digest)?,
            None => None,
        };
        let signing_input = match &header_segment {
            Some(segment) => token::signing_input(segment, &token.payload_segment),
            None => token.signing_input(),
        };

        let kid = token.kid();
        let mut has_key = false;
        for candidate in candidates.iter() {
            if let (Some(kid), Some(own)) = (kid, candidate.kid()) {
                if kid != own {
                    continue;
                }
            }
            has_key = true;
            match candidate.verify(signature, signing_input.as_bytes()) {
                Ok(true) => return Ok(token.into_decoded()),
                Ok(false) => debug!(alg, label = candidate.label(), "candidate rejected signature"),
                Err(e) => debug!(alg, label = candidate.label(), error = %e, "candidate failed"),
            }
        }

        if has_key {
            Err(JoseError::InvalidSignature)
        } else {
            Err(JoseError::no_such_key(alg, kid))
        }
    }

    fn verify_embedded(&self, alg: &str, token: CompactToken) -> JoseResult<DecodedToken> {
        let signature = token
            .signature
            .as_deref()
            .ok_or_else(|| JoseError::format("missing signature segment"))?;
        let algorithm: Algorithm = alg.parse().map_err(|_| JoseError::no_such_key(alg, None))?;

        let entries = match token.header.get("x5c") {
            Some(Value::Array(entries)) if !entries.is_empty() => entries,
            _ => return Err(JoseError::format("x5c chain is null or empty")),
        };
        let mut chain = entries
            .iter()
            .map(|entry| {
                entry
                    .as_str()
                    .ok_or_else(|| JoseError::format("x5c entries must be strings"))
                    .and_then(x509::parse_base64_certificate)
            })
            .collect::<JoseResult<Vec<_>>>()?;

        let anchored = match &self.root_ca {
            Some(root) => {
                chain.push(root.clone());
                true
            }
            None => false,
        };
        x509::check_chain(&chain, anchored, Utc::now())?;

        let leaf_der = chain[0]
            .to_der()
            .map_err(|e| JoseError::Format(format!("Invalid certificate: {e}")))?;
        let leaf = KeyMaterial::from_certificate(algorithm, &leaf_der, None)
            .map_err(|e| JoseError::Certificate(format!("leaf key cannot verify {alg}: {e}")))?;

        if leaf.verify(signature, token.signing_input().as_bytes())? {
            Ok(token.into_decoded())
        } else {
            Err(JoseError::InvalidSignature)
        }
    }

    /// Sign `payload` into a compact token.
    ///
    /// Standard claims are added from `options`: `iat` unless suppressed or
    /// already present, `exp`, `aud` (a string for one value, else an
    /// array), `iss` and `sub`. In unsecured mode a two segment `alg: none`
    /// token is produced.
    ///
    /// # Errors
    ///
    /// - [`JoseError::Policy`] for `none` in secure mode or any other
    ///   algorithm in unsecured mode
    /// - [`JoseError::AlgorithmNotAllowed`] when no signing key exists for the
    ///   algorithm
    pub fn sign(&self, payload: &JsonObject, options: &JwtOptions) -> JoseResult<String> {
        let unsecure = self.is_unsecure();
        let algorithm = options.algorithm;

        let key = if unsecure {
            if algorithm != Algorithm::None {
                return Err(JoseError::Policy(format!(
                    "JWT is in unsecured mode, algorithm {algorithm} not allowed"
                )));
            }
            None
        } else {
            if algorithm == Algorithm::None {
                return Err(JoseError::policy("Algorithm \"none\" not allowed"));
            }
            let key = self
                .sign_rings
                .get(&algorithm)
                .and_then(|ring| ring.next())
                .ok_or_else(|| JoseError::AlgorithmNotAllowed(algorithm.name().to_string()))?;
            trace!(%algorithm, label = key.label(), "signing key selected");
            Some(key)
        };

        let mut header = options.header.clone();
        header.insert("typ".to_string(), json!("JWT"));
        header.insert("alg".to_string(), json!(algorithm.name()));
        if let Some(kid) = key.as_ref().and_then(|key| key.kid()) {
            header.insert("kid".to_string(), json!(kid));
        }

        let claims = standard_claims(payload, options, Utc::now().timestamp());
        let header_segment = token::encode_object(&header)?;
        let payload_segment = token::encode_object(&claims)?;
        let signing_input = token::signing_input(&header_segment, &payload_segment);

        match key {
            Some(key) => {
                let signature = key.sign(signing_input.as_bytes())?;
                Ok(format!("{signing_input}.{}", token::encode_segment(&signature)))
            }
            None => Ok(signing_input),
        }
    }
}

fn standard_claims(payload: &JsonObject, options: &JwtOptions, now: i64) -> JsonObject {
    let mut claims = payload.clone();

    if !options.no_timestamp {
        claims.entry("iat").or_insert_with(|| json!(now));
    }
    if options.expires_in_seconds > 0 {
        let lifetime = i64::try_from(options.expires_in_seconds).unwrap_or(i64::MAX);
        claims.insert("exp".to_string(), json!(now.saturating_add(lifetime)));
    }
    match options.audience.as_slice() {
        [] => {}
        [single] => {
            claims.insert("aud".to_string(), json!(single));
        }
        many => {
            claims.insert("aud".to_string(), json!(many));
        }
    }
    if let Some(issuer) = &options.issuer {
        claims.insert("iss".to_string(), json!(issuer));
    }
    if let Some(subject) = &options.subject {
        claims.insert("sub".to_string(), json!(subject));
    }
    claims
}

// providers that append a nonce after signing sign over its digest instead
fn digest_nonce(header: &JsonObject, digest: NonceDigest) -> JoseResult<Option<String>> {
    let Some(nonce) = header.get("nonce") else {
        return Ok(None);
    };
    let nonce = nonce
        .as_str()
        .ok_or_else(|| JoseError::format("nonce header must be a string"))?;

    let mut rewritten = header.clone();
    rewritten.insert(
        "nonce".to_string(),
        json!(token::encode_segment(&digest.digest(nonce.as_bytes()))),
    );
    token::encode_object(&rewritten).map(Some)
}
