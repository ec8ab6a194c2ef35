//! Verification with the certificate chain carried in a token's `x5c` header

use cryypt_jose::{
    Algorithm, ErrorKind, JoseError, JsonObject, Jwt, JwtOptions, KeyMaterial, PubSecKeyOptions,
};
use serde_json::json;

const ROOT_CA: &str = include_str!("fixtures/root_ca.pem");
const INTERMEDIATE_CA: &str = include_str!("fixtures/intermediate_ca.pem");
const LEAF: &str = include_str!("fixtures/leaf.pem");
const LEAF_PRIVATE: &str = include_str!("fixtures/leaf_private.pem");
const ROGUE_ROOT: &str = include_str!("fixtures/rogue_root.pem");
const EXPIRED: &str = include_str!("fixtures/expired.pem");

// base64 DER body of a single PEM block, as carried in x5c
fn der_base64(pem: &str) -> String {
    pem.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("-----"))
        .collect()
}

fn signer(private: &str) -> Jwt {
    let jwt = Jwt::new();
    jwt.add_jwk(KeyMaterial::from_pem(&PubSecKeyOptions::new(Algorithm::ES256, private)).unwrap());
    jwt
}

fn token_with_chain(private: &str, chain: &[&str]) -> String {
    let x5c: Vec<String> = chain.iter().map(|pem| der_base64(pem)).collect();
    let options = JwtOptions::new()
        .with_algorithm(Algorithm::ES256)
        .with_header("x5c", json!(x5c));

    let mut claims = JsonObject::new();
    claims.insert("sub".to_string(), json!("device-7"));
    signer(private).sign(&claims, &options).unwrap()
}

fn anchored_to(root: &str) -> Jwt {
    Jwt::new().with_embedded_key_root_ca(&der_base64(root)).unwrap()
}

#[test]
fn test_root_ca_enables_embedded_keys() {
    let jwt = anchored_to(ROOT_CA);
    assert!(jwt.allows_embedded_key());
    assert!(jwt.is_unsecure());
}

#[test]
fn test_chain_to_trusted_root_verifies() {
    let token = token_with_chain(LEAF_PRIVATE, &[LEAF, INTERMEDIATE_CA]);
    let payload = anchored_to(ROOT_CA).decode(&token).unwrap();
    assert_eq!(payload["sub"], "device-7");
}

#[test]
fn test_chain_without_anchor_verifies_links_only() {
    let token = token_with_chain(LEAF_PRIVATE, &[LEAF, INTERMEDIATE_CA]);
    let jwt = Jwt::new().with_embedded_key(true);
    jwt.decode(&token).unwrap();
}

#[test]
fn test_chain_to_rogue_root_is_rejected() {
    // the rogue root shares the real root's subject name but not its key
    let token = token_with_chain(LEAF_PRIVATE, &[LEAF, INTERMEDIATE_CA]);
    let err = anchored_to(ROGUE_ROOT).decode(&token).unwrap_err();
    assert!(matches!(err, JoseError::Certificate(_)), "{err:?}");
}

#[test]
fn test_out_of_order_chain_is_rejected() {
    let token = token_with_chain(LEAF_PRIVATE, &[INTERMEDIATE_CA, LEAF]);
    let err = anchored_to(ROOT_CA).decode(&token).unwrap_err();
    assert!(matches!(err, JoseError::Certificate(_)), "{err:?}");
}

#[test]
fn test_expired_certificate_is_rejected() {
    let token = token_with_chain(LEAF_PRIVATE, &[EXPIRED]);
    let err = Jwt::new().with_embedded_key(true).decode(&token).unwrap_err();
    assert!(matches!(err, JoseError::Certificate(_)), "{err:?}");
}

#[test]
fn test_signature_from_another_key_is_rejected() {
    let token = token_with_chain(
        include_str!("fixtures/ec256_private.pem"),
        &[LEAF, INTERMEDIATE_CA],
    );
    let err = anchored_to(ROOT_CA).decode(&token).unwrap_err();
    assert!(matches!(err, JoseError::InvalidSignature));
}

#[test]
fn test_chain_takes_precedence_over_registered_keys() {
    // the registered HS256 key plays no part in x5c verification
    let jwt = anchored_to(ROOT_CA);
    jwt.add_jwk(KeyMaterial::from_secret(Algorithm::HS256, b"secret", None).unwrap());
    assert!(!jwt.is_unsecure());

    let token = token_with_chain(LEAF_PRIVATE, &[LEAF, INTERMEDIATE_CA]);
    jwt.decode(&token).unwrap();
}

#[test]
fn test_issuer_curve_need_not_match_signature_hash() {
    // a P-384 root signing its P-256 leaf with ecdsa-with-SHA256
    let token = token_with_chain(
        include_str!("fixtures/p384_issued_leaf_private.pem"),
        &[include_str!("fixtures/p384_issued_leaf.pem")],
    );
    let payload = anchored_to(include_str!("fixtures/p384_root_ca.pem"))
        .decode(&token)
        .unwrap();
    assert_eq!(payload["sub"], "device-7");

    let err = anchored_to(ROOT_CA).decode(&token).unwrap_err();
    assert!(matches!(err, JoseError::Certificate(_)), "{err:?}");
}

#[test]
fn test_empty_or_malformed_x5c_is_a_format_error() {
    let jwt = Jwt::new().with_embedded_key(true);
    for x5c in [json!([]), json!("MIIB"), json!([42])] {
        let options = JwtOptions::new()
            .with_algorithm(Algorithm::ES256)
            .with_header("x5c", x5c.clone());
        let token = signer(LEAF_PRIVATE).sign(&JsonObject::new(), &options).unwrap();
        let err = jwt.decode(&token).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format, "{x5c}");
    }
}

#[test]
fn test_root_ca_must_be_base64() {
    let err = Jwt::new().with_embedded_key_root_ca("not base64!").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn test_jwk_with_x5c_uses_the_leaf_key() {
    let jwk = json!({
        "kty": "RSA",
        "alg": "RS256",
        "x5c": [der_base64(include_str!("fixtures/rsa_cert.pem"))]
    });
    let key = KeyMaterial::from_jwk(&jwk).unwrap();
    assert!(key.can_verify());
    assert!(!key.can_sign());

    let jwt = Jwt::new();
    jwt.add_jwk(key);
    let signer = Jwt::new();
    signer.add_jwk(
        KeyMaterial::from_pem(&PubSecKeyOptions::new(
            Algorithm::RS256,
            include_str!("fixtures/rsa_private.pem"),
        ))
        .unwrap(),
    );
    let token = signer
        .sign(&JsonObject::new(), &JwtOptions::new().with_algorithm(Algorithm::RS256))
        .unwrap();
    jwt.decode(&token).unwrap();
}
