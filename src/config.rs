use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    /// Session token time-to-live in days.
    pub session_ttl_days: i64,
    /// Password-reset token time-to-live in minutes.
    pub reset_ttl_minutes: i64,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
    /// Mark the session cookie `Secure`; leave off only for local
    /// plain-HTTP development.
    pub cookie_secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub auth: AuthConfig,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let auth = AuthConfig {
            jwt_secret: std::env::var("JWT_SECRET")?,
            jwt_issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "trailhead".into()),
            jwt_audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "trailhead-users".into()),
            session_ttl_days: env_or("JWT_TTL_DAYS", 90),
            reset_ttl_minutes: env_or("RESET_TOKEN_TTL_MINUTES", 10),
            argon2_memory_kib: env_or("ARGON2_MEMORY_KIB", 19456),
            argon2_iterations: env_or("ARGON2_ITERATIONS", 2),
            argon2_parallelism: env_or("ARGON2_PARALLELISM", 1),
            cookie_secure: env_or("COOKIE_SECURE", true),
        };
        Ok(Self { database_url, auth })
    }
}
