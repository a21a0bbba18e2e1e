//! PKCE and CSRF-state generation for the authorization-code flow.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// PKCE parameters for OAuth Authorization Code + PKCE flows.
#[derive(Debug, Clone)]
pub struct Pkce {
    /// Random code verifier (base64url, 43 chars from 32 random bytes).
    pub verifier: String,
    /// SHA-256 hash of verifier, base64url-encoded (S256 challenge).
    pub challenge: String,
    /// Random state parameter for CSRF protection.
    pub state: String,
}

/// Generate a fresh PKCE parameter set (S256 method).
pub fn generate_pkce() -> Pkce {
    let mut rng = rand::thread_rng();

    let mut verifier_bytes = [0u8; 32];
    rng.fill_bytes(&mut verifier_bytes);
    let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

    let challenge = challenge_for(&verifier);

    let mut state_bytes = [0u8; 16];
    rng.fill_bytes(&mut state_bytes);
    let state = URL_SAFE_NO_PAD.encode(state_bytes);

    Pkce {
        verifier,
        challenge,
        state,
    }
}

/// S256 challenge: base64url(SHA256(verifier)).
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
