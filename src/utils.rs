use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::errors::AppError;

pub const MAX_PASSWORD_LEN: usize = 128;

/// Well-formed hash with default cost parameters, used when the dummy hash
/// cannot be generated at startup.
const FALLBACK_DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$2zbZ22+tx+Ugut3jGoc9kw$6xA5vGmGXVSggBm6CVCXIyQVWKxtCj4G6Mnu8vomL0g";

lazy_static! {
    /// Verified against when a login names an unknown account, so that path
    /// costs the same as a wrong password.
    static ref DUMMY_HASH: String = hash_password("casa-manager-dummy-password")
        .unwrap_or_else(|e| {
            log::warn!("Using the built-in dummy hash: {}", e);
            FALLBACK_DUMMY_HASH.to_owned()
        });
}

/// Salted argon2 hash in PHC string form, with the crate's default cost
/// parameters.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    Argon2::default()
        .hash_password(password.as_bytes(), &SaltString::generate(&mut OsRng))
        .map(|hash| hash.to_string())
        .map_err(|e| {
            log::error!("Failed to hash password: {}", e);
            AppError::PasswordError(e.to_string())
        })
}

/// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
pub fn verify_password(provided: &str, stored_hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| {
        log::error!("Stored password hash is malformed: {}", e);
        AppError::PasswordError(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(provided.as_bytes(), &parsed)
        .is_ok())
}

pub fn burn_dummy_verification(provided: &str) {
    let _ = verify_password(provided, &DUMMY_HASH);
}

/// Rejects blank input and oversized passwords; content rules are left to
/// the client.
pub fn validate_password(field: &str, password: &str) -> Result<(), AppError> {
    if password.is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "{field} must be at most {MAX_PASSWORD_LEN} characters long"
        )));
    }
    Ok(())
}
