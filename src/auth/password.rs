//! Argon2id password hashing and verification.
//!
//! Hashes use the PHC string format so the algorithm parameters and the
//! per-call random salt travel inside the stored value; two hashes of
//! the same plaintext never match, and verification accepts any of them.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::error::AppError;

/// Build the hasher from the configured cost. Cost is tunable so
/// operators can track hardware; the algorithm and version are not.
pub fn build_hasher(memory_kib: u32, iterations: u32) -> Result<Argon2<'static>, AppError> {
    let params = Params::new(memory_kib, iterations, 1, None)
        .map_err(|e| AppError::ConfigError(format!("invalid argon2 cost: {e}")))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a plaintext password with a fresh random salt.
pub fn hash_password(argon2: &Argon2<'_>, password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::InternalError(format!("password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

/// Verify a plaintext password against a stored PHC hash.
///
/// Returns `Ok(false)` for a mismatch; a stored value that fails to
/// parse is an internal error, not a bad credential.
pub fn verify_password(
    argon2: &Argon2<'_>,
    password: &str,
    stored_hash: &str,
) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| AppError::InternalError(format!("stored password hash is invalid: {e}")))?;
    match argon2.verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AppError::InternalError(format!(
            "password verification failed: {e}"
        ))),
    }
}
