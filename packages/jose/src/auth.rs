//! JWT authentication provider
//!
//! [`JwtAuth`] builds a [`Jwt`] engine from [`JwtAuthOptions`], turns
//! verified tokens into an [`AuthenticatedUser`] and issues tokens carrying
//! permissions.

use crate::claims;
use crate::error::{JoseError, JoseResult};
use crate::jwt::Jwt;
use crate::key::{KeyMaterial, KeyStore};
use crate::options::{JwtAuthOptions, JwtOptions};
use crate::token::JsonObject;
use chrono::Utc;
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::debug;

// claims kept out of the principal
const SPECIAL_KEYS: [&str; 4] = ["access_token", "exp", "iat", "nbf"];

/// Identity extracted from a verified token
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    /// The raw token
    pub token: String,
    /// Token claims without `access_token`, `exp`, `iat` and `nbf`
    pub principal: JsonObject,
    /// `accessToken` (all claims), copies of `exp`, `iat`, `nbf`, `sub` and
    /// `rootClaim`
    pub attributes: JsonObject,
    /// String permissions found under the permissions claim
    pub permissions: Vec<String>,
}

impl AuthenticatedUser {
    /// `sub` claim
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.attributes.get("sub").and_then(Value::as_str)
    }

    /// True when `permission` was granted by the token.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// Token authentication backed by a [`Jwt`] engine
#[derive(Debug)]
pub struct JwtAuth {
    jwt: Jwt,
    jwt_options: JwtOptions,
    permissions_claim_key: String,
}

impl JwtAuth {
    /// Build the provider from PEM keys and JWKs in `options`.
    ///
    /// # Errors
    ///
    /// Fails when any configured key or the embedded trust anchor cannot be
    /// loaded.
    pub fn new(options: &JwtAuthOptions) -> JoseResult<Self> {
        Self::build(options, Vec::new())
    }

    /// Build the provider, loading key store aliases before the keys in
    /// `options`.
    ///
    /// Unusable key store aliases are skipped.
    ///
    /// # Errors
    ///
    /// See [`JwtAuth::new`].
    pub fn with_key_store(
        options: &JwtAuthOptions,
        store: &dyn KeyStore,
        password: Option<&str>,
        per_alias_passwords: Option<&HashMap<String, String>>,
    ) -> JoseResult<Self> {
        let keys = KeyMaterial::load_key_store(store, password, per_alias_passwords);
        debug!(count = keys.len(), "loaded keys from key store");
        Self::build(options, keys)
    }

    fn build(options: &JwtAuthOptions, store_keys: Vec<KeyMaterial>) -> JoseResult<Self> {
        let mut jwt = Jwt::new()
            .with_nonce_algorithm(options.jwt_options.nonce_algorithm)
            .with_embedded_key(options.allow_embedded_key);
        if let Some(root_ca) = &options.embedded_key_root_ca {
            jwt = jwt.with_embedded_key_root_ca(root_ca)?;
        }

        for key in store_keys {
            jwt.add_jwk(key);
        }
        for key in &options.pub_sec_keys {
            jwt.add_jwk(KeyMaterial::from_pem(key)?);
        }
        for jwk in &options.jwks {
            jwt.add_jwk(KeyMaterial::from_jwk(jwk)?);
        }

        Ok(Self {
            jwt,
            jwt_options: options.jwt_options.clone(),
            permissions_claim_key: options.permissions_claim_key.clone(),
        })
    }

    /// The underlying token engine
    #[must_use]
    pub fn engine(&self) -> &Jwt {
        &self.jwt
    }

    /// Verify `token`, validate its claims and extract the user.
    ///
    /// # Errors
    ///
    /// Returns the engine's decode errors and the claim errors of
    /// [`claims::validate`].
    pub fn authenticate(&self, token: &str) -> JoseResult<AuthenticatedUser> {
        if token.is_empty() {
            return Err(JoseError::format("token is empty"));
        }
        let payload = self.jwt.decode(token)?;
        claims::validate(&payload, &self.jwt_options, Utc::now().timestamp())?;
        Ok(self.create_user(token, payload))
    }

    /// Sign `claims` with `options`, adding the configured permissions when
    /// the permissions claim is absent.
    ///
    /// # Errors
    ///
    /// Returns the engine's sign errors.
    pub fn generate_token(&self, claims: &JsonObject, options: &JwtOptions) -> JoseResult<String> {
        let mut claims = claims.clone();
        if !options.permissions.is_empty() && !claims.contains_key(&self.permissions_claim_key) {
            claims.insert(self.permissions_claim_key.clone(), json!(options.permissions));
        }
        self.jwt.sign(&claims, options)
    }

    /// [`JwtAuth::generate_token`] with the provider's own options
    ///
    /// # Errors
    ///
    /// Returns the engine's sign errors.
    pub fn generate_token_with_defaults(&self, claims: &JsonObject) -> JoseResult<String> {
        self.generate_token(claims, &self.jwt_options)
    }

    fn create_user(&self, token: &str, payload: JsonObject) -> AuthenticatedUser {
        let principal: JsonObject = payload
            .iter()
            .filter(|(name, _)| !SPECIAL_KEYS.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let mut attributes = JsonObject::new();
        for name in ["exp", "iat", "nbf", "sub"] {
            if let Some(value) = payload.get(name) {
                attributes.insert(name.to_string(), value.clone());
            }
        }
        attributes.insert("rootClaim".to_string(), json!("accessToken"));

        let permissions = permissions_at(&payload, &self.permissions_claim_key);
        attributes.insert("accessToken".to_string(), Value::Object(payload));

        AuthenticatedUser {
            token: token.to_string(),
            principal,
            attributes,
            permissions,
        }
    }
}

// `a/b/c` walks nested objects; only string entries count
fn permissions_at(payload: &JsonObject, key: &str) -> Vec<String> {
    let mut parts = key.split('/');
    let mut current = parts.next().and_then(|first| payload.get(first));
    for part in parts {
        current = current.and_then(|value| value.get(part));
    }

    match current {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
