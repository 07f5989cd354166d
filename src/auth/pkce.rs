//! PKCE (RFC 7636) and CSRF state for the installed-application flow

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

/// 32 random bytes, base64url without padding (43 characters)
fn random_token() -> String {
    let mut rng = rand::thread_rng();
    let random_bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// BASE64URL(SHA256(verifier))
pub fn code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Values for one authorization round trip
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// Kept locally until the code exchange
    pub code_verifier: String,
    /// Sent with the authorization request
    pub code_challenge: String,
    /// Must come back unchanged in the callback
    pub state: String,
}

impl PkceChallenge {
    pub fn generate() -> Self {
        let code_verifier = random_token();
        let code_challenge = code_challenge(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
            state: random_token(),
        }
    }

    pub fn challenge_method(&self) -> &'static str {
        "S256"
    }
}
