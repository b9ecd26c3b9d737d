use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{AdminUpdateUserRequest, PublicUser, UpdateMeRequest},
        extractors::CurrentUser,
        handlers::is_valid_email,
        repo::User,
    },
    errors::AuthError,
    state::AppState,
};

/// A conflict only when the email belongs to somebody else; re-submitting
/// your own address is a no-op, not an error.
fn email_conflict(existing: Option<&User>, target_id: Uuid) -> Result<(), AuthError> {
    match existing {
        Some(other) if other.id != target_id => Err(AuthError::EmailTaken),
        _ => Ok(()),
    }
}

async fn check_new_email(
    state: &AppState,
    email: &mut String,
    target_id: Uuid,
) -> Result<(), AuthError> {
    *email = email.trim().to_lowercase();
    if !is_valid_email(email) {
        return Err(AuthError::Validation("Please provide a valid email"));
    }
    let existing = User::find_by_email(&state.db, email).await?;
    email_conflict(existing.as_ref(), target_id)
}

pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(PublicUser::from(&user))
}

#[instrument(skip_all)]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(mut payload): Json<UpdateMeRequest>,
) -> Result<Json<PublicUser>, AuthError> {
    if payload.password.is_some() || payload.password_confirm.is_some() {
        return Err(AuthError::Validation(
            "This route is not for password updates. Please use /updateMyPassword",
        ));
    }

    if let Some(email) = payload.email.as_mut() {
        check_new_email(&state, email, user.id).await?;
    }

    let updated = User::update_profile(
        &state.db,
        user.id,
        payload.name.as_deref(),
        payload.email.as_deref(),
    )
    .await?;

    info!(user_id = %updated.id, "profile updated");
    Ok(Json(PublicUser::from(&updated)))
}

#[instrument(skip_all)]
pub async fn delete_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<StatusCode, AuthError> {
    User::deactivate(&state.db, user.id).await?;
    warn!(user_id = %user.id, "account deactivated");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<PublicUser>>, AuthError> {
    let users = User::list_active(&state.db).await?;
    Ok(Json(users.iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicUser>, AuthError> {
    let user = User::find_active_by_id(&state.db, id)
        .await?
        .ok_or(AuthError::NotFound)?;
    Ok(Json(PublicUser::from(&user)))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<AdminUpdateUserRequest>,
) -> Result<Json<PublicUser>, AuthError> {
    if let Some(email) = payload.email.as_mut() {
        check_new_email(&state, email, id).await?;
    }

    let updated = User::admin_update(
        &state.db,
        id,
        payload.name.as_deref(),
        payload.email.as_deref(),
        payload.role,
    )
    .await?
    .ok_or(AuthError::NotFound)?;

    info!(user_id = %updated.id, role = ?updated.role, "user updated by admin");
    Ok(Json(PublicUser::from(&updated)))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AuthError> {
    if !User::deactivate(&state.db, id).await? {
        return Err(AuthError::NotFound);
    }
    warn!(user_id = %id, "account deactivated by admin");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo::Role;
    use time::OffsetDateTime;

    fn user_with_id(id: Uuid) -> User {
        User {
            id,
            name: "Ada".into(),
            email: "ada@example.com".into(),
            password_hash: "$argon2id$stub".into(),
            role: Role::User,
            password_changed_at: None,
            reset_token_hash: None,
            reset_token_expires_at: None,
            active: true,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn email_owned_by_someone_else_is_a_conflict() {
        let other = user_with_id(Uuid::new_v4());
        let err = email_conflict(Some(&other), Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AuthError::EmailTaken));
    }

    #[test]
    fn resubmitting_own_email_is_not_a_conflict() {
        let id = Uuid::new_v4();
        let me = user_with_id(id);
        assert!(email_conflict(Some(&me), id).is_ok());
    }

    #[test]
    fn unused_email_is_not_a_conflict() {
        assert!(email_conflict(None, Uuid::new_v4()).is_ok());
    }
}
