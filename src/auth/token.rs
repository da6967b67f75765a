//! Session token generation and hashing

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// Random bytes per token (256 bits)
const TOKEN_BYTES: usize = 32;

/// Session token generator
pub struct SessionToken;

impl SessionToken {
    /// New opaque bearer token, hex-encoded
    pub fn generate() -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// SHA-256 of the token; the only form kept in the session table
    pub fn hash(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_shape() {
        let token = SessionToken::generate();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_tokens_are_unique() {
        assert_ne!(SessionToken::generate(), SessionToken::generate());
    }

    #[test]
    fn test_hash_is_deterministic() {
        let token = SessionToken::generate();
        assert_eq!(SessionToken::hash(&token), SessionToken::hash(&token));
        assert_eq!(SessionToken::hash(&token).len(), 64);
        assert_ne!(SessionToken::hash(&token), token);
    }
}
