//! Webhook signature verification.
//!
//! Validates the `X-Hub-Signature-256` header: a keyed HMAC-SHA256 over the
//! raw request body, hex encoded, compared in constant time. The signing
//! secret is re-read from the settings provider on every verification so a
//! rotated secret takes effect immediately.

use crate::{config::SettingsProvider, SecretString};
use std::sync::Arc;

/// Header carrying the payload signature, lowercase.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

const SIGNATURE_PREFIX: &str = "sha256=";
const DIGEST_LENGTH: usize = 32;

/// Errors from signature verification, each mapping to a distinct boundary
/// response: absent header, server misconfiguration, or invalid signature.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature header absent")]
    MissingSignature,

    #[error("signing secret not configured")]
    SecretNotConfigured,

    #[error("settings unavailable: {message}")]
    SettingsUnavailable { message: String },

    #[error("malformed signature header: {reason}")]
    MalformedHeader { reason: String },

    #[error("signature does not match payload")]
    Mismatch,
}

/// Verifies webhook payload signatures using HMAC-SHA256.
///
/// # Security
///
/// - The raw body bytes are hashed exactly as received; any re-serialization
///   before hashing invalidates the signature.
/// - Digest comparison is constant-time after a length check; a digest of
///   the wrong length is rejected as a format error before comparison.
/// - Secrets and signature values never appear in logs or Debug output.
#[derive(Clone)]
pub struct SignatureVerifier {
    settings: Arc<dyn SettingsProvider>,
}

impl SignatureVerifier {
    /// Create a verifier reading its secret from the given provider.
    pub fn new(settings: Arc<dyn SettingsProvider>) -> Self {
        Self { settings }
    }

    /// Verify a payload against its signature header.
    ///
    /// The header is checked for presence before the secret is fetched, so
    /// an unsigned request is reported as such even on a misconfigured
    /// server.
    pub async fn verify(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<(), SignatureError> {
        let signature = signature.ok_or(SignatureError::MissingSignature)?;

        let settings = self.settings.current().await.map_err(|e| {
            SignatureError::SettingsUnavailable {
                message: e.to_string(),
            }
        })?;
        let secret = settings
            .app_secret
            .filter(|s| !s.is_empty())
            .ok_or(SignatureError::SecretNotConfigured)?;

        let provided = parse_signature(signature)?;
        let expected = compute_signature(&secret, payload);

        if constant_time_compare(&provided, &expected) {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }
}

// Security: don't expose the settings provider in debug output
impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("settings", &"<REDACTED>")
            .finish()
    }
}

/// Parse the `sha256=<hex>` header into digest bytes.
///
/// Rejects a missing prefix, invalid hex, and any digest that is not exactly
/// 32 bytes, all as format errors, before any comparison happens.
pub fn parse_signature(signature: &str) -> Result<Vec<u8>, SignatureError> {
    let hex_digest =
        signature
            .strip_prefix(SIGNATURE_PREFIX)
            .ok_or_else(|| SignatureError::MalformedHeader {
                reason: format!("expected '{}' prefix", SIGNATURE_PREFIX),
            })?;

    let digest = hex::decode(hex_digest).map_err(|e| SignatureError::MalformedHeader {
        reason: format!("digest is not valid hex: {}", e),
    })?;

    if digest.len() != DIGEST_LENGTH {
        return Err(SignatureError::MalformedHeader {
            reason: format!(
                "digest must be {} bytes, got {}",
                DIGEST_LENGTH,
                digest.len()
            ),
        });
    }

    Ok(digest)
}

/// Compute the HMAC-SHA256 digest of a payload under a secret.
pub fn compute_signature(secret: &SecretString, payload: &[u8]) -> Vec<u8> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    // HMAC accepts keys of any length; new_from_slice cannot fail here.
    let mut mac = match HmacSha256::new_from_slice(secret.expose_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts keys of any length"),
    };
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Constant-time comparison of two digests.
///
/// The length check happens first and is not constant time (length is not
/// secret); equal-length digests are compared without data-dependent early
/// exit.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;

    if a.len() != b.len() {
        return false;
    }

    a.ct_eq(b).into()
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
