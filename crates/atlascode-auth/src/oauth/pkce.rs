//! PKCE (Proof Key for Code Exchange)
//!
//! RFC 7636 verifier/challenge pair for the Jira authorization code flow.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

/// PKCE code verifier and challenge pair
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// Kept secret, sent in the token exchange
    pub verifier: String,
    /// Sent in the authorization request
    pub challenge: String,
}

impl PkceChallenge {
    pub const METHOD: &'static str = "S256";

    /// Generate a fresh pair from 32 random bytes.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; 32] = rng.gen();
        let verifier = URL_SAFE_NO_PAD.encode(random_bytes);
        let challenge = Self::challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }

    /// S256 challenge of a verifier: base64url(sha256(verifier)).
    pub fn challenge_for(verifier: &str) -> String {
        let hash = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hash)
    }

    pub fn verify(verifier: &str, challenge: &str) -> bool {
        Self::challenge_for(verifier) == challenge
    }
}
