//! PEM block parsing on top of the `pem` crate

use crate::error::{JoseError, JoseResult};

/// Kind of a PEM block, taken from its `BEGIN` line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PemKind {
    /// X.509 certificate
    Certificate,
    /// SubjectPublicKeyInfo
    PublicKey,
    /// PKCS#8 private key
    PrivateKey,
    /// PKCS#1 RSA public key
    RsaPublicKey,
    /// PKCS#1 RSA private key
    RsaPrivateKey,
}

impl PemKind {
    fn from_tag(tag: &str) -> JoseResult<Self> {
        match tag {
            "CERTIFICATE" => Ok(PemKind::Certificate),
            // legacy RSA aliases carry SPKI / PKCS#8 bodies
            "PUBLIC KEY" | "PUBLIC RSA KEY" => Ok(PemKind::PublicKey),
            "PRIVATE KEY" | "PRIVATE RSA KEY" => Ok(PemKind::PrivateKey),
            "RSA PUBLIC KEY" => Ok(PemKind::RsaPublicKey),
            "RSA PRIVATE KEY" => Ok(PemKind::RsaPrivateKey),
            other => Err(JoseError::Format(format!("Unsupported PEM kind: {other}"))),
        }
    }

    /// True when the block holds private key material.
    #[must_use]
    pub fn is_private(self) -> bool {
        matches!(self, PemKind::PrivateKey | PemKind::RsaPrivateKey)
    }
}

/// A decoded PEM block
#[derive(Debug, Clone)]
pub struct PemBlock {
    /// Block kind
    pub kind: PemKind,
    /// DER body
    pub der: Vec<u8>,
}

/// Parse a single PEM block.
///
/// # Errors
///
/// Returns [`JoseError::Format`] when the text has fewer than three lines,
/// the `BEGIN`/`END` lines are missing or disagree, the body is not base64,
/// or the block kind is not a key or certificate.
pub fn parse(text: &str) -> JoseResult<PemBlock> {
    // BEGIN, at least one body line, END
    if text.trim().lines().count() < 3 {
        return Err(JoseError::format("PEM contains not enough lines"));
    }

    let block = ::pem::parse(text).map_err(|e| JoseError::Format(format!("Invalid PEM: {e}")))?;
    let kind = PemKind::from_tag(block.tag())?;
    Ok(PemBlock {
        kind,
        der: block.into_contents(),
    })
}
