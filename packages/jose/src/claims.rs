//! Standard claim validation
//!
//! Runs after the signature has been verified. Time based checks honour
//! [`JwtOptions::leeway`] and are skipped entirely with
//! [`JwtOptions::ignore_expiration`].

use crate::error::{JoseError, JoseResult};
use crate::options::JwtOptions;
use crate::token::JsonObject;
use serde_json::Value;

/// Validate `aud`, `iss`, `exp`, `iat` and `nbf` against `options` at `now`
/// (seconds since the epoch).
///
/// # Errors
///
/// - [`JoseError::InvalidAudience`] when no audience value is expected
/// - [`JoseError::InvalidIssuer`] when `iss` differs from the configured issuer
/// - [`JoseError::TokenExpired`] when `exp` has passed
/// - [`JoseError::TokenNotYetValid`] when `nbf` lies in the future
/// - [`JoseError::InvalidClaims`] for a future `iat` or non-numeric time claims
pub fn validate(payload: &JsonObject, options: &JwtOptions, now: i64) -> JoseResult<()> {
    if !options.audience.is_empty() {
        let target: Vec<&str> = match payload.get("aud") {
            Some(Value::String(aud)) => vec![aud.as_str()],
            Some(Value::Array(values)) => values.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !options.audience.iter().any(|aud| target.contains(&aud.as_str())) {
            return Err(JoseError::InvalidAudience(options.audience.clone()));
        }
    }

    if let Some(issuer) = &options.issuer {
        if payload.get("iss").and_then(Value::as_str) != Some(issuer.as_str()) {
            return Err(JoseError::InvalidIssuer);
        }
    }

    if options.ignore_expiration {
        return Ok(());
    }

    let leeway = i64::try_from(options.leeway).unwrap_or(i64::MAX);
    if let Some(exp) = numeric_claim(payload, "exp")? {
        if now.saturating_sub(leeway) >= exp {
            return Err(JoseError::TokenExpired);
        }
    }
    if let Some(iat) = numeric_claim(payload, "iat")? {
        if iat > now.saturating_add(leeway) {
            return Err(JoseError::invalid_claims("iat is in the future"));
        }
    }
    if let Some(nbf) = numeric_claim(payload, "nbf")? {
        if nbf > now.saturating_add(leeway) {
            return Err(JoseError::TokenNotYetValid);
        }
    }
    Ok(())
}

// NumericDate may carry a fraction; whole seconds are compared
fn numeric_claim(payload: &JsonObject, name: &str) -> JoseResult<Option<i64>> {
    match payload.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| JoseError::InvalidClaims(format!("{name} is out of range"))),
        Some(_) => Err(JoseError::InvalidClaims(format!("{name} must be a number"))),
    }
}
