use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// RFC 7636 unreserved characters.
const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

pub const CODE_VERIFIER_LENGTH: usize = 64;
pub const STATE_LENGTH: usize = 32;
pub const NONCE_LENGTH: usize = 32;

/// PKCE challenge method sent with every authorization request.
pub const CHALLENGE_METHOD: &str = "S256";

/// Generates a random string of `len` characters from the unreserved charset.
///
/// Draws from the thread-local CSPRNG, so every call is independent.
#[must_use]
pub fn generate_random_string(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

/// Generates a cryptographically random code verifier for PKCE.
///
/// Returns a 64-character string (RFC 7636 compliant, 43-128 chars).
#[must_use]
pub fn generate_code_verifier() -> String {
    generate_random_string(CODE_VERIFIER_LENGTH)
}

/// Computes the S256 code challenge from a code verifier.
///
/// `challenge = BASE64URL(SHA256(ASCII(verifier)))`, unpadded.
#[must_use]
pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generates the anti-forgery `state` parameter.
#[must_use]
pub fn generate_state() -> String {
    generate_random_string(STATE_LENGTH)
}

/// Generates the replay-protection `nonce` parameter.
#[must_use]
pub fn generate_nonce() -> String {
    generate_random_string(NONCE_LENGTH)
}
