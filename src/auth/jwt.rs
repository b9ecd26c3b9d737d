use axum::extract::FromRef;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{config::AuthConfig, errors::AuthError, state::AppState};

/// Session token payload: who, when issued, when it dies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Issues and verifies signed session tokens.
///
/// The signing secret and TTL are injected at construction from `AppConfig`;
/// nothing here reads ambient global state. There is no revocation list:
/// tokens minted before a password change are caught by the staleness check
/// in the request guard.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::new(&state.config.auth)
    }
}

impl SessionKeys {
    pub fn new(cfg: &AuthConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.jwt_secret.as_bytes()),
            issuer: cfg.jwt_issuer.clone(),
            audience: cfg.jwt_audience.clone(),
            ttl: Duration::days(cfg.session_ttl_days),
        }
    }

    pub fn sign(&self, user_id: Uuid) -> Result<String, AuthError> {
        let now = OffsetDateTime::now_utc();
        self.sign_at(user_id, now, now + self.ttl)
    }

    fn sign_at(
        &self,
        user_id: Uuid,
        issued_at: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> Result<String, AuthError> {
        let claims = Claims {
            sub: user_id,
            iat: issued_at.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("jwt encode: {e}")))?;
        debug!(user_id = %user_id, "session token signed");
        Ok(token)
    }

    /// Check signature and expiry. Expired tokens are reported separately so
    /// the caller can tell the user to log in again rather than retry.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::InvalidToken,
            }
        })?;
        debug!(user_id = %data.claims.sub, "session token verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> SessionKeys {
        SessionKeys::from_ref(&AppState::fake())
    }

    #[tokio::test]
    async fn sign_and_verify_roundtrip() {
        let keys = keys();
        let user_id = Uuid::new_v4();
        let token = keys.sign(user_id).expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert!(claims.exp > claims.iat);
    }

    #[tokio::test]
    async fn expired_token_is_reported_as_expired() {
        let keys = keys();
        let now = OffsetDateTime::now_utc();
        let token = keys
            .sign_at(Uuid::new_v4(), now - Duration::days(91), now - Duration::days(1))
            .expect("sign");
        let err = keys.verify(&token).unwrap_err();
        assert!(matches!(err, AuthError::ExpiredToken));
    }

    #[tokio::test]
    async fn tampered_token_is_invalid() {
        let keys = keys();
        let token = keys.sign(Uuid::new_v4()).expect("sign");
        // flip a character in the signature segment
        let mut tampered = token.clone();
        let last = tampered.pop().expect("non-empty token");
        tampered.push(if last == 'A' { 'B' } else { 'A' });
        let err = keys.verify(&tampered).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn token_from_another_secret_is_invalid() {
        let state = AppState::fake();
        let mut other_cfg = state.config.auth.clone();
        other_cfg.jwt_secret = "a-different-secret".into();
        let other = SessionKeys::new(&other_cfg);

        let token = other.sign(Uuid::new_v4()).expect("sign");
        let err = keys().verify(&token).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn garbage_is_invalid_not_a_panic() {
        let err = keys().verify("definitely.not.a-jwt").unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }
}
