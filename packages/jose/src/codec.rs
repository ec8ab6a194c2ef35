//! ECDSA signature transcoding between ASN.1 DER and the raw JWS form
//!
//! Generic signers emit `SEQUENCE { INTEGER r, INTEGER s }` while JWS
//! mandates the fixed-width concatenation `r || s`. The functions here are
//! pure byte transformations and never touch key material.

use crate::error::{JoseError, JoseResult};

const SEQUENCE: u8 = 0x30;
const INTEGER: u8 = 0x02;
const LONG_FORM_1: u8 = 0x81;

/// Convert a DER encoded ECDSA signature into raw `r || s`.
///
/// Each component is left-padded to `max(len(r), len(s), signature_len / 2)`
/// bytes after stripping sign-guard and leading zero bytes.
///
/// # Errors
///
/// Returns [`JoseError::Format`] when the outer tag, the length fields or the
/// nested integers are inconsistent.
pub fn to_jws(der: &[u8], signature_len: usize) -> JoseResult<Vec<u8>> {
    if der.len() < 8 || der[0] != SEQUENCE {
        return Err(JoseError::format("invalid ECDSA signature format"));
    }

    let (content_len, offset) = match der[1] {
        len if len < 0x80 => (usize::from(len), 2),
        LONG_FORM_1 => (usize::from(der[2]), 3),
        _ => return Err(JoseError::format("invalid ECDSA signature format")),
    };
    if content_len != der.len() - offset {
        return Err(JoseError::format("invalid ECDSA signature format"));
    }

    let (r, rest) = read_integer(&der[offset..])?;
    let (s, rest) = read_integer(rest)?;
    if !rest.is_empty() {
        return Err(JoseError::format("invalid ECDSA signature format"));
    }

    let r = strip_leading_zeros(r);
    let s = strip_leading_zeros(s);
    let half = r.len().max(s.len()).max(signature_len / 2);

    let mut raw = vec![0u8; 2 * half];
    raw[half - r.len()..half].copy_from_slice(r);
    raw[2 * half - s.len()..].copy_from_slice(s);
    Ok(raw)
}

/// Convert a raw `r || s` signature into minimal DER.
///
/// # Errors
///
/// Returns [`JoseError::Format`] for an empty or odd-length input, or when the
/// encoding would need more than one length-of-length byte.
pub fn to_asn1(raw: &[u8]) -> JoseResult<Vec<u8>> {
    if raw.is_empty() || raw.len() % 2 != 0 {
        return Err(JoseError::format("invalid raw ECDSA signature length"));
    }
    let half = raw.len() / 2;
    let r = integer_body(&raw[..half]);
    let s = integer_body(&raw[half..]);

    if r.len() > 0x7f || s.len() > 0x7f {
        return Err(JoseError::format("invalid raw ECDSA signature length"));
    }
    let content_len = 2 + r.len() + 2 + s.len();
    if content_len > 0xff {
        return Err(JoseError::format("invalid raw ECDSA signature length"));
    }

    let mut der = Vec::with_capacity(content_len + 3);
    der.push(SEQUENCE);
    if content_len > 0x7f {
        der.push(LONG_FORM_1);
    }
    der.push(content_len as u8);
    for component in [r, s] {
        der.push(INTEGER);
        der.push(component.len() as u8);
        der.extend_from_slice(&component);
    }
    Ok(der)
}

/// Structural check for `SEQUENCE { INTEGER, INTEGER }` covering the whole buffer.
///
/// Used to avoid transcoding a signature that is already DER.
#[must_use]
pub fn is_asn1(bytes: &[u8]) -> bool {
    if bytes.len() < 8 || bytes[0] != SEQUENCE {
        return false;
    }
    let (content_len, offset) = match bytes[1] {
        len if len < 0x80 => (usize::from(len), 2),
        LONG_FORM_1 => (usize::from(bytes[2]), 3),
        _ => return false,
    };
    if content_len != bytes.len() - offset {
        return false;
    }
    match read_integer(&bytes[offset..]) {
        Ok((_, rest)) => matches!(read_integer(rest), Ok((_, tail)) if tail.is_empty()),
        Err(_) => false,
    }
}

fn read_integer(input: &[u8]) -> JoseResult<(&[u8], &[u8])> {
    if input.len() < 2 || input[0] != INTEGER {
        return Err(JoseError::format("invalid ECDSA signature format"));
    }
    let len = usize::from(input[1]);
    if len == 0 || len >= 0x80 || input.len() < 2 + len {
        return Err(JoseError::format("invalid ECDSA signature format"));
    }
    Ok((&input[2..2 + len], &input[2 + len..]))
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

// minimal two's complement body of an unsigned big-endian integer
fn integer_body(bytes: &[u8]) -> Vec<u8> {
    let stripped = strip_leading_zeros(bytes);
    match stripped.first() {
        None => vec![0],
        Some(first) if first & 0x80 != 0 => {
            let mut body = Vec::with_capacity(stripped.len() + 1);
            body.push(0);
            body.extend_from_slice(stripped);
            body
        }
        Some(_) => stripped.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use proptest::prelude::*;

    // P-256 signature with a high bit set in r, so r carries a sign-guard byte
    const DER_P256: [u8; 71] = hex!(
        "3045"
        "022100c0ffee00112233445566778899aabbccddeeff00112233445566778899aabbcc"
        "02200102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f20"
    );

    #[test]
    fn der_to_raw_strips_sign_guard() {
        let raw = to_jws(&DER_P256, 64).unwrap();
        assert_eq!(raw.len(), 64);
        assert_eq!(raw[0], 0xc0);
        assert_eq!(raw[32], 0x01);
    }

    #[test]
    fn raw_to_der_restores_sign_guard() {
        let raw = to_jws(&DER_P256, 64).unwrap();
        assert_eq!(to_asn1(&raw).unwrap(), DER_P256.to_vec());
    }

    #[test]
    fn short_components_are_left_padded() {
        // r = 0x01, s = 0x7f
        let der = hex!("300602010102017f");
        let raw = to_jws(&der, 64).unwrap();
        let mut expected = [0u8; 64];
        expected[31] = 0x01;
        expected[63] = 0x7f;
        assert_eq!(raw, expected.to_vec());
    }

    #[test]
    fn p521_uses_extended_length() {
        let mut raw = vec![0u8; 132];
        raw[0] = 0x01;
        raw[1] = 0xff;
        raw[66] = 0x01;
        raw[67] = 0xaa;
        let der = to_asn1(&raw).unwrap();
        assert_eq!(der[0], 0x30);
        assert_eq!(der[1], 0x81);
        assert_eq!(usize::from(der[2]), der.len() - 3);
        assert!(is_asn1(&der));
        assert_eq!(to_jws(&der, 132).unwrap(), raw);
    }

    #[test]
    fn rejects_malformed_der() {
        // wrong outer tag
        assert!(to_jws(&hex!("3106020101020101"), 64).is_err());
        // outer length disagrees with the buffer
        assert!(to_jws(&hex!("3007020101020101"), 64).is_err());
        // second element is not an INTEGER
        assert!(to_jws(&hex!("3006020101040101"), 64).is_err());
        // trailing garbage inside the sequence
        assert!(to_jws(&hex!("300802010102010100"), 64).is_err());
        // unsupported two-byte length form
        assert!(to_jws(&hex!("3282000602010102010100"), 64).is_err());
    }

    #[test]
    fn rejects_oversized_raw() {
        assert!(to_asn1(&[]).is_err());
        assert!(to_asn1(&[1, 2, 3]).is_err());
        assert!(to_asn1(&[0xff; 256]).is_err());
    }

    #[test]
    fn is_asn1_distinguishes_raw_from_der() {
        assert!(is_asn1(&DER_P256));
        let raw = to_jws(&DER_P256, 64).unwrap();
        assert!(!is_asn1(&raw));
        assert!(!is_asn1(&DER_P256[..70]));
    }

    #[test]
    fn zero_components_round_trip() {
        let raw = vec![0u8; 64];
        let der = to_asn1(&raw).unwrap();
        assert_eq!(der, hex!("3006020100020100").to_vec());
        assert_eq!(to_jws(&der, 64).unwrap(), raw);
    }

    proptest! {
        #[test]
        fn raw_der_raw_is_identity(
            len in prop::sample::select(vec![64usize, 96, 132]),
            seed in prop::collection::vec(any::<u8>(), 132),
        ) {
            let raw = &seed[..len];
            let der = to_asn1(raw).unwrap();
            prop_assert!(is_asn1(&der));
            prop_assert_eq!(to_jws(&der, len).unwrap(), raw.to_vec());
        }

        #[test]
        fn der_raw_der_is_identity(
            seed in prop::collection::vec(any::<u8>(), 64),
        ) {
            let der = to_asn1(&seed).unwrap();
            let raw = to_jws(&der, 64).unwrap();
            prop_assert_eq!(to_asn1(&raw).unwrap(), der);
        }
    }
}
