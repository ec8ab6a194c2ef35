//! Sign and verify tokens with every supported algorithm

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use cryypt_jose::{
    Algorithm, ErrorKind, JoseError, JsonObject, Jwt, JwtOptions, KeyMaterial, PubSecKeyOptions,
};
use serde_json::{Value, json};

const RSA_PRIVATE: &str = include_str!("fixtures/rsa_private.pem");
const RSA_PUBLIC: &str = include_str!("fixtures/rsa_public.pem");
const RSA2_PKCS1_PRIVATE: &str = include_str!("fixtures/rsa2_pkcs1_private.pem");
const RSA2_PUBLIC: &str = include_str!("fixtures/rsa2_public.pem");
const EC256_PRIVATE: &str = include_str!("fixtures/ec256_private.pem");
const EC256_PUBLIC: &str = include_str!("fixtures/ec256_public.pem");
const EC256K_PRIVATE: &str = include_str!("fixtures/ec256k_private.pem");
const EC256K_PUBLIC: &str = include_str!("fixtures/ec256k_public.pem");
const EC384_PRIVATE: &str = include_str!("fixtures/ec384_private.pem");
const EC384_PUBLIC: &str = include_str!("fixtures/ec384_public.pem");
const EC521_PRIVATE: &str = include_str!("fixtures/ec521_private.pem");
const EC521_PUBLIC: &str = include_str!("fixtures/ec521_public.pem");
const ED25519_PRIVATE: &str = include_str!("fixtures/ed25519_private.pem");
const ED25519_PUBLIC: &str = include_str!("fixtures/ed25519_public.pem");

fn claims() -> JsonObject {
    let mut claims = JsonObject::new();
    claims.insert("sub".to_string(), json!("alice"));
    claims.insert("scope".to_string(), json!(["read", "write"]));
    claims
}

fn pem_key(algorithm: Algorithm, pem: &str) -> KeyMaterial {
    KeyMaterial::from_pem(&PubSecKeyOptions::new(algorithm, pem)).unwrap()
}

fn pem_engine(algorithm: Algorithm, private: &str, public: &str) -> Jwt {
    let jwt = Jwt::new();
    jwt.add_jwk(pem_key(algorithm, private));
    jwt.add_jwk(pem_key(algorithm, public));
    jwt
}

// flips the lowest bit of the last signature byte
fn tamper_signature(token: &str) -> String {
    let (signing_input, signature) = token.rsplit_once('.').unwrap();
    let mut bytes = URL_SAFE_NO_PAD.decode(signature).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 1;
    format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(bytes))
}

fn tamper_payload(token: &str) -> String {
    let parts: Vec<&str> = token.split('.').collect();
    let forged = URL_SAFE_NO_PAD.encode(br#"{"sub":"mallory"}"#);
    format!("{}.{forged}.{}", parts[0], parts[2])
}

fn assert_round_trip(jwt: &Jwt, algorithm: Algorithm) {
    let token = jwt
        .sign(&claims(), &JwtOptions::new().with_algorithm(algorithm))
        .unwrap();
    assert_eq!(token.split('.').count(), 3);

    let decoded = jwt.decode_full(&token).unwrap();
    assert_eq!(decoded.header["alg"], algorithm.name());
    assert_eq!(decoded.header["typ"], "JWT");
    assert_eq!(decoded.payload["sub"], "alice");
    assert!(decoded.payload.contains_key("iat"));

    assert!(
        matches!(jwt.decode(&tamper_signature(&token)), Err(JoseError::InvalidSignature)),
        "{algorithm} accepted a modified signature"
    );
    assert!(
        matches!(jwt.decode(&tamper_payload(&token)), Err(JoseError::InvalidSignature)),
        "{algorithm} accepted a modified payload"
    );
}

#[test]
fn test_hmac_round_trips() {
    for algorithm in [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512] {
        let jwt = Jwt::new();
        let secret = b"a shared secret of decent length";
        jwt.add_jwk(KeyMaterial::from_secret(algorithm, secret, None).unwrap());
        assert_round_trip(&jwt, algorithm);
    }
}

#[test]
fn test_rsa_pkcs1_round_trips() {
    for algorithm in [Algorithm::RS256, Algorithm::RS384, Algorithm::RS512] {
        assert_round_trip(&pem_engine(algorithm, RSA_PRIVATE, RSA_PUBLIC), algorithm);
    }
}

#[test]
fn test_legacy_rs1_round_trip() {
    assert_round_trip(&pem_engine(Algorithm::RS1, RSA_PRIVATE, RSA_PUBLIC), Algorithm::RS1);
}

#[test]
fn test_rsa_pss_round_trips() {
    for algorithm in [Algorithm::PS256, Algorithm::PS384, Algorithm::PS512] {
        assert_round_trip(&pem_engine(algorithm, RSA_PRIVATE, RSA_PUBLIC), algorithm);
    }
}

#[test]
fn test_rsa_pkcs1_pem_blocks() {
    assert_round_trip(
        &pem_engine(Algorithm::RS256, RSA2_PKCS1_PRIVATE, RSA2_PUBLIC),
        Algorithm::RS256,
    );
}

#[test]
fn test_ecdsa_round_trips() {
    let cases = [
        (Algorithm::ES256, EC256_PRIVATE, EC256_PUBLIC),
        (Algorithm::ES384, EC384_PRIVATE, EC384_PUBLIC),
        (Algorithm::ES512, EC521_PRIVATE, EC521_PUBLIC),
        (Algorithm::ES256K, EC256K_PRIVATE, EC256K_PUBLIC),
    ];
    for (algorithm, private, public) in cases {
        assert_round_trip(&pem_engine(algorithm, private, public), algorithm);
    }
}

#[test]
fn test_ecdsa_signatures_are_raw_in_tokens() {
    let cases = [
        (Algorithm::ES256, EC256_PRIVATE, EC256_PUBLIC, 64),
        (Algorithm::ES384, EC384_PRIVATE, EC384_PUBLIC, 96),
        (Algorithm::ES512, EC521_PRIVATE, EC521_PUBLIC, 132),
    ];
    for (algorithm, private, public, len) in cases {
        let jwt = pem_engine(algorithm, private, public);
        let token = jwt
            .sign(&claims(), &JwtOptions::new().with_algorithm(algorithm))
            .unwrap();
        let signature = URL_SAFE_NO_PAD.decode(token.rsplit('.').next().unwrap()).unwrap();
        assert_eq!(signature.len(), len, "{algorithm}");
    }
}

#[test]
fn test_eddsa_round_trip() {
    assert_round_trip(
        &pem_engine(Algorithm::EdDSA, ED25519_PRIVATE, ED25519_PUBLIC),
        Algorithm::EdDSA,
    );
}

#[test]
fn test_jwk_round_trips() {
    let jwks: [(&str, Algorithm); 4] = [
        (include_str!("fixtures/rsa_private.jwk.json"), Algorithm::RS256),
        (include_str!("fixtures/ec256_private.jwk.json"), Algorithm::ES256),
        (include_str!("fixtures/ec521_private.jwk.json"), Algorithm::ES512),
        (include_str!("fixtures/ed25519_private.jwk.json"), Algorithm::EdDSA),
    ];
    for (text, algorithm) in jwks {
        let json: Value = serde_json::from_str(text).unwrap();
        let key = KeyMaterial::from_jwk(&json).unwrap();
        assert!(key.can_sign() && key.can_verify(), "{algorithm}");
        assert_eq!(key.algorithm(), algorithm);

        let jwt = Jwt::new();
        jwt.add_jwk(key);
        assert_round_trip(&jwt, algorithm);
    }
}

#[test]
fn test_rsa_signature_length_tracks_modulus() {
    let key = pem_key(Algorithm::RS256, RSA_PUBLIC);
    assert_eq!(key.signature_len(), 256);
    let key = pem_key(Algorithm::ES512, EC521_PUBLIC);
    assert_eq!(key.signature_len(), 132);
}

#[test]
fn test_rsa_signature_without_leading_zero_byte_verifies() {
    let signer = pem_key(Algorithm::RS256, RSA_PRIVATE);
    let verifier = pem_key(Algorithm::RS256, RSA_PUBLIC);

    // PKCS#1 v1.5 is deterministic, so the first leading-zero signature is fixed
    let (data, signature) = (0..4096)
        .map(|i| {
            let data = format!("payload-{i}").into_bytes();
            let signature = signer.sign(&data).unwrap();
            (data, signature)
        })
        .find(|(_, signature)| signature[0] == 0)
        .expect("a signature with a leading zero byte");
    assert_eq!(signature.len(), 256);

    assert!(verifier.verify(&signature, &data).unwrap());
    assert!(verifier.verify(&signature[1..], &data).unwrap());
}

#[test]
fn test_rsa_signature_longer_than_modulus_is_false() {
    let signer = pem_key(Algorithm::RS256, RSA_PRIVATE);
    let verifier = pem_key(Algorithm::RS256, RSA_PUBLIC);

    let signature = signer.sign(b"payload").unwrap();
    assert!(verifier.verify(&signature, b"payload").unwrap());

    let mut longer = vec![0];
    longer.extend_from_slice(&signature);
    assert!(!verifier.verify(&longer, b"payload").unwrap());
    let mut longer = signature;
    longer.push(0);
    assert!(!verifier.verify(&longer, b"payload").unwrap());
}

#[test]
fn test_cose_keys_verify_der_signatures() {
    let json: Value =
        serde_json::from_str(include_str!("fixtures/ec256_private.jwk.json")).unwrap();
    let cose = KeyMaterial::from_cose_jwk(&json).unwrap();
    let jose = KeyMaterial::from_jwk(&json).unwrap();
    assert!(!cose.uses_asn1());
    assert!(jose.uses_asn1());

    let der = cose.sign(b"payload").unwrap();
    assert_eq!(der[0], 0x30);
    assert!(cose.verify(&der, b"payload").unwrap());

    let raw = jose.sign(b"payload").unwrap();
    assert_eq!(raw.len(), 64);
    assert!(jose.verify(&raw, b"payload").unwrap());
    // a JOSE key also accepts DER input
    assert!(jose.verify(&der, b"payload").unwrap());
}

#[test]
fn test_rfc7515_hs256_vector() {
    let jwt = Jwt::new();
    jwt.add_jwk(
        KeyMaterial::from_jwk(&json!({
            "kty": "oct",
            "k": "AyM1SysPpbyDfgZld3umj1qzKObwVMkoqQ-EstJQLr_T-1qS0gZH75aKtMN3Yj0iPS4hcgUuTwjAzZr1Z9CAow"
        }))
        .unwrap(),
    );

    let token = "eyJ0eXAiOiJKV1QiLA0KICJhbGciOiJIUzI1NiJ9\
        .eyJpc3MiOiJqb2UiLA0KICJleHAiOjEzMDA4MTkzODAsDQogImh0dHA6Ly9leGFtcGxlLmNvbS9pc19yb290Ijp0cnVlfQ\
        .dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    // the engine does not validate claims, so the 2011 expiry is irrelevant
    let payload = jwt.decode(token).unwrap();
    assert_eq!(payload["iss"], "joe");
    assert_eq!(payload["exp"], 1_300_819_380);
    assert_eq!(payload["http://example.com/is_root"], true);
}

#[test]
fn test_rfc7515_es256_vector() {
    let jwt = Jwt::new();
    jwt.add_jwk(
        KeyMaterial::from_jwk(&json!({
            "kty": "EC",
            "crv": "P-256",
            "x": "f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU",
            "y": "x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0",
            "d": "jpsQnnGQmL-YBIffH1136cLSG1tLSxkXrE0tfPHCzR8"
        }))
        .unwrap(),
    );

    let token = "eyJhbGciOiJFUzI1NiJ9\
        .eyJpc3MiOiJqb2UiLA0KICJleHAiOjEzMDA4MTkzODAsDQogImh0dHA6Ly9leGFtcGxlLmNvbS9pc19yb290Ijp0cnVlfQ\
        .DtEhU3ljbEg8L38VWAfUAqOyKAM6-Xx-F4GawxaepmXFCgfTjDxw5djxLa8ISlSApmWQxfKTUJqPP3-Kg6NU1Q";
    let payload = jwt.decode(token).unwrap();
    assert_eq!(payload["iss"], "joe");

    let err = jwt.decode(&tamper_signature(token)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Signature);
}

#[test]
fn test_public_only_engine_cannot_sign() {
    let jwt = Jwt::new();
    jwt.add_jwk(pem_key(Algorithm::ES256, EC256_PUBLIC));
    assert_eq!(jwt.verify_key_count(Algorithm::ES256), 1);
    assert_eq!(jwt.sign_key_count(Algorithm::ES256), 0);

    let err = jwt
        .sign(&claims(), &JwtOptions::new().with_algorithm(Algorithm::ES256))
        .unwrap_err();
    assert!(matches!(err, JoseError::AlgorithmNotAllowed(ref alg) if alg == "ES256"));
}
