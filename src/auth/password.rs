use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};

use crate::error::{AppError, AppResult};

pub const MIN_PASSWORD_LEN: usize = 6;

/// Length rule shared by signup and password change.
pub fn check_new_password(plain: &str, field: &str) -> AppResult<()> {
    if plain.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "{field} must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }
    Ok(())
}

/// Argon2id PHC string with a fresh random salt.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| anyhow::anyhow!("argon2 hash: {e}"))
}

/// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| anyhow::anyhow!("argon2 parse hash: {e}"))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

pub fn random_password(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("Secur3P@ss").expect("hashing should succeed");
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Secur3P@ss", &hash).unwrap());
        assert!(!verify_password("secur3p@ss", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error_not_a_mismatch() {
        assert!(verify_password("anything", "not-a-valid-hash").is_err());
    }

    #[test]
    fn new_password_length_rule() {
        assert!(check_new_password("12345", "Password").is_err());
        assert!(check_new_password("123456", "Password").is_ok());
        let err = check_new_password("abc", "New password").unwrap_err();
        assert_eq!(err.to_string(), "New password must be at least 6 characters long");
    }

    #[test]
    fn random_passwords_differ() {
        let a = random_password(16);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, random_password(16));
    }
}
