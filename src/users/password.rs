use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::error::{AppError, AppResult};

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Argon2 is deliberately slow; keep it off the async workers.
pub async fn hash_password_async(plain: String) -> AppResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&plain))
        .await
        .map_err(AppError::storage)?
        .map_err(AppError::Storage)
}

pub async fn verify_password_async(plain: String, hash: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&plain, &hash))
        .await
        .map_err(AppError::storage)?
        .map_err(AppError::Storage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_never_equals_plaintext() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert_ne!(hash, password);
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hash = hash_password("correct-horse-battery-staple").unwrap();
        assert!(!verify_password("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        assert!(verify_password("anything", "not-a-valid-hash").is_err());
    }

    #[tokio::test]
    async fn async_wrappers_roundtrip() {
        let hash = hash_password_async("hunter22".into()).await.unwrap();
        assert!(verify_password_async("hunter22".into(), hash).await.unwrap());
    }
}
