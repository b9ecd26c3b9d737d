use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use axum::extract::FromRef;
use tracing::error;

use crate::{config::AuthConfig, errors::AuthError, state::AppState};

pub const MIN_PASSWORD_LEN: usize = 8;

/// Password hashing and verification with tunable Argon2id work factor.
///
/// Hashes are salted per call, so two hashes of the same password never
/// compare equal as strings. Verification goes through the argon2 crate's own
/// constant-time comparison.
#[derive(Clone)]
pub struct CredentialStore {
    argon2: Argon2<'static>,
}

impl FromRef<AppState> for CredentialStore {
    fn from_ref(state: &AppState) -> Self {
        // Built once in AppState construction, where bad parameters abort
        // startup; here we only hand out a copy.
        state.credentials.clone()
    }
}

impl CredentialStore {
    pub fn new(cfg: &AuthConfig) -> anyhow::Result<Self> {
        let params = Params::new(
            cfg.argon2_memory_kib,
            cfg.argon2_iterations,
            cfg.argon2_parallelism,
            None,
        )
        .map_err(|e| anyhow::anyhow!("argon2 params: {e}"))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a plaintext password, enforcing the minimum-length policy.
    pub fn hash(&self, plain: &str) -> Result<String, AuthError> {
        if plain.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                AuthError::Internal(anyhow::anyhow!(e.to_string()))
            })?
            .to_string();
        Ok(hash)
    }

    /// Check a candidate password against a stored PHC hash.
    ///
    /// A mismatch returns `Ok(false)`; only a malformed stored hash errors,
    /// and that is an integrity failure, not an authentication outcome.
    pub fn verify(&self, plain: &str, hash: &str) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "stored password hash is malformed");
            AuthError::Internal(anyhow::anyhow!(e.to_string()))
        })?;
        Ok(self
            .argon2
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }

    /// Hashing is CPU-bound by design; run it off the async workers so a
    /// burst of signups never stalls unrelated requests.
    pub async fn hash_async(&self, plain: String) -> Result<String, AuthError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.hash(&plain))
            .await
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("hash task panicked: {e}")))?
    }

    pub async fn verify_async(&self, plain: String, hash: String) -> Result<bool, AuthError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.verify(&plain, &hash))
            .await
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("verify task panicked: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::FromRef;

    fn store() -> CredentialStore {
        CredentialStore::from_ref(&AppState::fake())
    }

    #[tokio::test]
    async fn hash_and_verify_roundtrip() {
        let store = store();
        let password = "Secur3P@ssw0rd!";
        let hash = store.hash(password).expect("hashing should succeed");
        assert!(store.verify(password, &hash).expect("verify should succeed"));
    }

    #[tokio::test]
    async fn verify_rejects_wrong_password() {
        let store = store();
        let hash = store
            .hash("correct-horse-battery-staple")
            .expect("hashing should succeed");
        assert!(!store
            .verify("wrong-password", &hash)
            .expect("verify should not error"));
    }

    #[tokio::test]
    async fn hashes_are_salted_per_call() {
        let store = store();
        let a = store.hash("secret123").expect("hash a");
        let b = store.hash("secret123").expect("hash b");
        assert_ne!(a, b);
        assert!(store.verify("secret123", &a).unwrap());
        assert!(store.verify("secret123", &b).unwrap());
    }

    #[tokio::test]
    async fn hash_never_equals_plaintext() {
        let store = store();
        let hash = store.hash("secret123").expect("hash");
        assert_ne!(hash, "secret123");
        assert!(hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn short_password_is_rejected() {
        let store = store();
        let err = store.hash("seven77").unwrap_err();
        assert!(matches!(err, AuthError::WeakPassword));
    }

    #[tokio::test]
    async fn out_of_range_work_factor_is_rejected_at_construction() {
        let state = AppState::fake();
        let mut cfg = state.config.auth.clone();
        cfg.argon2_memory_kib = 1; // below the argon2 minimum
        assert!(CredentialStore::new(&cfg).is_err());
    }

    #[tokio::test]
    async fn malformed_stored_hash_is_an_integrity_error() {
        let store = store();
        let err = store.verify("anything", "not-a-valid-hash").unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
    }

    #[tokio::test]
    async fn async_wrappers_delegate() {
        let store = store();
        let hash = store.hash_async("secret123".into()).await.expect("hash");
        assert!(store
            .verify_async("secret123".into(), hash)
            .await
            .expect("verify"));
    }
}
