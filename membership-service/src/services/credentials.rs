//! Credential verifier: password policy, hashing and verification.

use secrecy::{ExposeSecret, Secret};
use std::sync::Arc;
use tokio::sync::Semaphore;

use super::error::AuthError;
use crate::config::CredentialConfig;
use crate::utils::{self, Password, PasswordError, PasswordHashString};

/// Hashes and verifies passwords off the async runtime.
///
/// Argon2 is deliberately slow; at most `hash_concurrency` hashes run at once
/// on the blocking pool.
#[derive(Clone)]
pub struct CredentialVerifier {
    server_salt: Secret<String>,
    min_entropy_bits: f64,
    max_password_bytes: usize,
    permits: Arc<Semaphore>,
}

impl CredentialVerifier {
    pub fn new(config: &CredentialConfig) -> Self {
        Self {
            server_salt: config.server_salt.clone(),
            min_entropy_bits: config.min_entropy_bits,
            max_password_bytes: config.max_password_bytes,
            permits: Arc::new(Semaphore::new(config.hash_concurrency.max(1))),
        }
    }

    pub fn validate_strength(&self, password: &Password) -> Result<(), AuthError> {
        utils::validate_strength(password, self.min_entropy_bits)
            .map(|_| ())
            .map_err(map_password_error)
    }

    pub async fn hash(&self, password: &Password) -> Result<PasswordHashString, AuthError> {
        let password = password.clone();
        let max_bytes = self.max_password_bytes;
        self.run_blocking(move |salt| utils::hash_password(&password, salt, max_bytes))
            .await?
            .map_err(map_password_error)
    }

    /// False on mismatch or an unusable hash. Errors only if the blocking pool fails.
    pub async fn verify(
        &self,
        password_hash: &str,
        password: &Password,
    ) -> Result<bool, AuthError> {
        let password_hash = PasswordHashString::new(password_hash.to_string());
        let password = password.clone();
        self.run_blocking(move |salt| utils::verify_password(&password_hash, &password, salt))
            .await
    }

    async fn run_blocking<T, F>(&self, job: F) -> Result<T, AuthError>
    where
        F: FnOnce(&[u8]) -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| AuthError::internal(format!("hash pool closed: {}", e)))?;
        let salt = self.server_salt.expose_secret().clone();

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job(salt.as_bytes())
        })
        .await
        .map_err(|e| AuthError::internal(format!("hash task failed: {}", e)))
    }
}

fn map_password_error(err: PasswordError) -> AuthError {
    match err {
        PasswordError::TooLong { max } => AuthError::PasswordTooLong { max },
        PasswordError::TooWeak { .. } => AuthError::PasswordTooWeak,
        PasswordError::Hashing(e) => AuthError::internal(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::error::ErrorKind;

    fn verifier() -> CredentialVerifier {
        CredentialVerifier::new(&CredentialConfig {
            server_salt: Secret::new("unit-test-server-salt-0123456789".to_string()),
            min_entropy_bits: 50.0,
            max_password_bytes: 72,
            hash_concurrency: 2,
        })
    }

    #[tokio::test]
    async fn test_hash_then_verify() {
        let verifier = verifier();
        let password = Password::new("Tr0ub4dor&3".to_string());
        let hash = verifier.hash(&password).await.unwrap();

        assert!(verifier.verify(hash.as_str(), &password).await.unwrap());
        assert!(!verifier
            .verify(hash.as_str(), &Password::new("Tr0ub4dor&4".to_string()))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_verify_empty_hash_is_false() {
        let verifier = verifier();
        let password = Password::new("Tr0ub4dor&3".to_string());
        assert!(!verifier.verify("", &password).await.unwrap());
    }

    #[tokio::test]
    async fn test_too_long_maps_to_kind() {
        let verifier = verifier();
        let err = verifier
            .hash(&Password::new("Aa1!".repeat(20)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PasswordTooLong);
    }

    #[test]
    fn test_weak_password_rejected() {
        let err = verifier()
            .validate_strength(&Password::new("password".to_string()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PasswordTooWeak);
    }
}
