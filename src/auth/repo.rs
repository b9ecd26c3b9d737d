use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// Closed role set; everything defaults to `User` at signup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "user_role", rename_all = "kebab-case")]
pub enum Role {
    User,
    Guide,
    LeadGuide,
    Admin,
}

/// Principal record. `password_hash` and the reset columns never leave the
/// server; they are skipped on serialization and omitted from `PublicUser`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_changed_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub reset_token_hash: Option<String>,
    #[serde(skip_serializing)]
    pub reset_token_expires_at: Option<OffsetDateTime>,
    pub active: bool,
    pub created_at: OffsetDateTime,
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, password_changed_at, \
     reset_token_hash, reset_token_expires_at, active, created_at";

impl User {
    /// True when the password changed after the given token issue time, i.e.
    /// the token predates the current credentials and must not be trusted.
    pub fn changed_password_after(&self, token_issued_at: i64) -> bool {
        match self.password_changed_at {
            Some(changed_at) => changed_at.unix_timestamp() > token_issued_at,
            None => false,
        }
    }

    /// Signup path; the caller has already hashed the password.
    pub async fn create(
        db: &PgPool,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(db)
        .await
    }

    /// Login-path lookup. Deliberately unfiltered on `active` so the handler
    /// can distinguish a deactivated account from a wrong password.
    pub async fn find_by_email(db: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"SELECT {USER_COLUMNS} FROM users WHERE email = $1"#
        ))
        .bind(email)
        .fetch_optional(db)
        .await
    }

    /// Request-guard lookup; inactive principals are invisible here.
    pub async fn find_active_by_id(db: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND active"#
        ))
        .bind(id)
        .fetch_optional(db)
        .await
    }

    pub async fn find_active_by_email(
        db: &PgPool,
        email: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND active"#
        ))
        .bind(email)
        .fetch_optional(db)
        .await
    }

    /// Rotate the password hash and stamp `password_changed_at`, clearing any
    /// pending reset token. The stamp is backdated by one second so a session
    /// token issued in the same instant is not spuriously treated as stale.
    pub async fn update_password(
        db: &PgPool,
        id: Uuid,
        new_hash: &str,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET password_hash = $2,
                password_changed_at = now() - interval '1 second',
                reset_token_hash = NULL,
                reset_token_expires_at = NULL
            WHERE id = $1 AND active
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(new_hash)
        .fetch_one(db)
        .await
    }

    /// Store a new reset-token digest, overwriting any pending one. Only the
    /// latest raw token remains consumable.
    pub async fn set_reset_token(
        db: &PgPool,
        id: Uuid,
        digest: &str,
        ttl_minutes: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET reset_token_hash = $2,
                reset_token_expires_at = now() + make_interval(mins => $3::int)
            WHERE id = $1 AND active
            "#,
        )
        .bind(id)
        .bind(digest)
        .bind(ttl_minutes)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Back out a pending reset token, e.g. when delivery failed. Matches on
    /// the digest as well as the id so a token issued by a newer request in
    /// the meantime is left untouched.
    pub async fn clear_reset_token(db: &PgPool, id: Uuid, digest: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET reset_token_hash = NULL, reset_token_expires_at = NULL
            WHERE id = $1 AND reset_token_hash = $2
            "#,
        )
        .bind(id)
        .bind(digest)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Single compare-and-update: match the digest while it is still
    /// unexpired, rotate the password and clear both reset columns in one
    /// statement. Two concurrent consumers of the same token cannot both get
    /// a row back. `None` covers not-found and expired alike.
    pub async fn consume_reset_token(
        db: &PgPool,
        digest: &str,
        new_hash: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET password_hash = $2,
                password_changed_at = now() - interval '1 second',
                reset_token_hash = NULL,
                reset_token_expires_at = NULL
            WHERE reset_token_hash = $1
              AND reset_token_expires_at > now()
              AND active
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(digest)
        .bind(new_hash)
        .fetch_optional(db)
        .await
    }

    /// Profile update; never touches credential or reset fields.
    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                email = COALESCE($3, email)
            WHERE id = $1 AND active
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(name)
        .bind(email)
        .fetch_one(db)
        .await
    }

    /// Admin update; may reassign the role but still cannot touch credential
    /// or reset fields. `None` when no active user has that id.
    pub async fn admin_update(
        db: &PgPool,
        id: Uuid,
        name: Option<&str>,
        email: Option<&str>,
        role: Option<Role>,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                role = COALESCE($4, role)
            WHERE id = $1 AND active
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(role)
        .fetch_optional(db)
        .await
    }

    /// Soft delete. The row stays, but every active-filtered lookup and the
    /// request guard stop seeing it. Reports whether an active row matched.
    pub async fn deactivate(db: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(r#"UPDATE users SET active = false WHERE id = $1 AND active"#)
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_active(db: &PgPool) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"SELECT {USER_COLUMNS} FROM users WHERE active ORDER BY created_at"#
        ))
        .fetch_all(db)
        .await
    }
}
