use async_trait::async_trait;
use tracing::info;

/// Out-of-band delivery channel for password-reset tokens.
///
/// The raw token only ever travels through this trait; it is never persisted
/// or written to the logs.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_password_reset(&self, email: &str, raw_token: &str) -> anyhow::Result<()>;
}

/// Default mailer for environments without a delivery backend wired up.
/// Records that a reset was requested but discards the token itself.
#[derive(Clone)]
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send_password_reset(&self, email: &str, _raw_token: &str) -> anyhow::Result<()> {
        info!(email = %email, "password reset token issued; no mailer configured, discarding");
        Ok(())
    }
}
