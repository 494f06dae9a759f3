//! Password hashing for accounts (argon2id, PHC string format).

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use uuid::Uuid;

use crate::error::{Result, VerbaError};

pub fn hash_password(password: &str) -> Result<String> {
    // 16 random bytes from the OS via uuid v4.
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| VerbaError::Auth(format!("failed to build salt: {e}")))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| VerbaError::Auth(format!("failed to hash password: {e}")))
}

/// Check `password` against a stored PHC hash. A malformed hash is an
/// error, a wrong password is `Ok(false)`.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| VerbaError::Auth(format!("stored password hash is invalid: {e}")))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(VerbaError::Auth(format!("password check failed: {e}"))),
    }
}
