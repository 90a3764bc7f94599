//! `PKCE` verifier/challenge pair used by sign-up email links.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

use super::AuthError;

pub(crate) const CHALLENGE_METHOD: &str = "s256";

/// Create a new random code verifier (43 URL-safe characters).
pub(crate) fn generate_verifier() -> Result<String, AuthError> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| AuthError::InvalidConfig(format!("failed to generate PKCE verifier: {err}")))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// `BASE64URL(SHA256(verifier))` without padding.
pub(crate) fn challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn verifier_is_url_safe_and_long_enough() {
        let verifier = generate_verifier().unwrap();
        assert_eq!(verifier.len(), 43);
        assert!(verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(verifier, generate_verifier().unwrap());
    }

    #[test]
    fn challenge_is_sha256_base64url() {
        assert_eq!(
            challenge("dBjftJeZ4CVP-mJ92K9ZIE2gD6u_y5rQzWvp5EdUZoU"),
            "7GCAzCMMBSXVz6LqFWNVU-v8oFeg6ULaiWXEbCdN63M"
        );
    }
}
