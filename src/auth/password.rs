//! Password hashing and verification using Argon2id

use crate::{config::SecurityConfig, error::AppError};
use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};

/// Throwaway secret hashed once per hasher; unknown identities verify against it
const DUMMY_SECRET: &str = "dashboard-access-timing-equalizer";

/// Password hasher with configurable parameters
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
    min_length: usize,
    dummy_hash: String,
}

impl PasswordHasher {
    /// OWASP baseline: m=19MiB, t=2, p=1
    pub fn new() -> Self {
        let params = Params::new(19456, 2, 1, None).unwrap_or_default();
        Self::build(params, 6)
    }

    /// Hasher using the configured cost and password policy
    pub fn from_config(config: &SecurityConfig) -> Result<Self, AppError> {
        let params = Params::new(
            config.argon2_memory_kib,
            config.argon2_iterations,
            config.argon2_parallelism,
            None,
        )
        .map_err(|e| AppError::Config(format!("Invalid Argon2 params: {}", e)))?;

        Ok(Self::build(params, config.password_min_length))
    }

    /// Cheap parameters for tests
    pub fn with_params(
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
        min_length: usize,
    ) -> Result<Self, AppError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| AppError::Config(format!("Invalid Argon2 params: {}", e)))?;
        Ok(Self::build(params, min_length))
    }

    fn build(params: Params, min_length: usize) -> Self {
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let salt = SaltString::generate(&mut OsRng);
        let dummy_hash = argon2
            .hash_password(DUMMY_SECRET.as_bytes(), &salt)
            .map(|h| h.to_string())
            .unwrap_or_default();

        Self {
            argon2,
            min_length,
            dummy_hash,
        }
    }

    pub fn min_length(&self) -> usize {
        self.min_length
    }

    /// Hash a password
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| {
                tracing::error!("Failed to hash password: {:?}", e);
                AppError::Internal(format!("Failed to hash password: {}", e))
            })?
            .to_string();

        Ok(password_hash)
    }

    /// Verify a password against a stored hash.
    /// A malformed stored hash counts as a mismatch and is logged.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Failed to parse stored password hash: {:?}", e);
                return false;
            }
        };

        self.argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }

    /// Burn one verification for an unknown identity; always false
    pub fn verify_dummy(&self, password: &str) -> bool {
        let _ = self.verify(password, &self.dummy_hash);
        false
    }

    /// Minimum length policy, checked before any hashing
    pub fn validate_password_policy(&self, password: &str) -> Result<(), AppError> {
        if password.chars().count() < self.min_length {
            return Err(AppError::WeakPassword {
                min_length: self.min_length,
            });
        }
        Ok(())
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}
