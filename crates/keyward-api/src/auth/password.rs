/// Password hashing and verification using Argon2id
///
/// Verifiers are PHC strings (algorithm, parameters, salt and hash in one
/// value), so cost parameters can change without invalidating stored hashes.
/// Defaults follow OWASP recommendations:
/// - Memory: 64 MB
/// - Iterations: 3
/// - Parallelism: 4 lanes
/// - Output: 32 bytes
use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};
use keyward_core::PasswordHashConfig;
use thiserror::Error;

/// Password hashing and verification errors
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashingFailed(String),

    #[error("Failed to verify password: {0}")]
    VerificationFailed(String),

    #[error("Invalid password hash format")]
    InvalidHashFormat,
}

/// One-way hash and verify capability
pub trait PasswordVerifier: Send + Sync {
    /// Produce a verifier string for `plaintext`
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError>;

    /// `Ok(false)` on mismatch; `Err` only when the verifier itself is unusable
    fn check(&self, plaintext: &str, verifier: &str) -> Result<bool, PasswordError>;
}

/// Password hashing configuration
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    /// Memory cost in KB (default: 65536 = 64 MB)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
    /// Output length in bytes (default: 32)
    pub output_len: Option<usize>,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 65536, // 64 MB
            time_cost: 3,
            parallelism: 4,
            output_len: Some(32),
        }
    }
}

impl From<&PasswordHashConfig> for PasswordConfig {
    fn from(config: &PasswordHashConfig) -> Self {
        Self {
            memory_cost: config.memory_cost,
            time_cost: config.time_cost,
            parallelism: config.parallelism,
            output_len: Some(32),
        }
    }
}

impl PasswordConfig {
    fn to_params(&self) -> Result<Params, PasswordError> {
        Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            self.output_len,
        )
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))
    }
}

/// Argon2id implementation of [`PasswordVerifier`]
#[derive(Debug, Clone)]
pub struct Argon2Verifier {
    params: Params,
}

impl Argon2Verifier {
    pub fn new(config: &PasswordConfig) -> Result<Self, PasswordError> {
        Ok(Self {
            params: config.to_params()?,
        })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl PasswordVerifier for Argon2Verifier {
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = self
            .argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;

        Ok(password_hash.to_string())
    }

    fn check(&self, plaintext: &str, verifier: &str) -> Result<bool, PasswordError> {
        let parsed_hash =
            PasswordHash::new(verifier).map_err(|_| PasswordError::InvalidHashFormat)?;

        // Parameters are read from the PHC string, not from self
        match self
            .argon2()
            .verify_password(plaintext.as_bytes(), &parsed_hash)
        {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PasswordError::VerificationFailed(e.to_string())),
        }
    }
}
