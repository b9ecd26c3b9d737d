use axum::{
    extract::{FromRef, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotPasswordRequest, LoginRequest, PublicUser, ResetPasswordRequest,
            SignupRequest, UpdatePasswordRequest,
        },
        extractors::{clear_session_cookie, session_cookie, CurrentUser},
        jwt::SessionKeys,
        password::CredentialStore,
        repo::User,
        reset::{digest_of, new_reset_token},
    },
    errors::AuthError,
    state::AppState,
};

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/forgotPassword", post(forgot_password))
        .route("/resetPassword/:token", post(reset_password))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn signed_response(
    state: &AppState,
    user: &User,
    status: StatusCode,
) -> Result<impl IntoResponse, AuthError> {
    let keys = SessionKeys::from_ref(state);
    let token = keys.sign(user.id)?;
    let cookie = session_cookie(
        &token,
        state.config.auth.session_ttl_days,
        state.config.auth.cookie_secure,
    );
    Ok((
        status,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            token,
            user: PublicUser::from(user),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(mut payload): Json<SignupRequest>,
) -> Result<impl IntoResponse, AuthError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        return Err(AuthError::Validation("Please provide a valid email"));
    }
    if payload.password != payload.password_confirm {
        return Err(AuthError::Validation("Passwords are not the same"));
    }
    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "signup with taken email");
        return Err(AuthError::EmailTaken);
    }

    let creds = CredentialStore::from_ref(&state);
    let hash = creds.hash_async(payload.password).await?;
    let user = User::create(&state.db, &payload.name, &payload.email, &hash).await?;

    info!(user_id = %user.id, email = %user.email, "user signed up");
    signed_response(&state, &user, StatusCode::CREATED)
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    payload.email = payload.email.trim().to_lowercase();

    let Some(user) = User::find_by_email(&state.db, &payload.email).await? else {
        warn!(email = %payload.email, "login with unknown email");
        return Err(AuthError::InvalidCredentials);
    };

    let creds = CredentialStore::from_ref(&state);
    if !creds
        .verify_async(payload.password, user.password_hash.clone())
        .await?
    {
        warn!(user_id = %user.id, "login with wrong password");
        return Err(AuthError::InvalidCredentials);
    }
    if !user.active {
        warn!(user_id = %user.id, "login for deactivated account");
        return Err(AuthError::AccountInactive);
    }

    info!(user_id = %user.id, "user logged in");
    signed_response(&state, &user, StatusCode::OK)
}

pub async fn logout() -> impl IntoResponse {
    (
        [(header::SET_COOKIE, clear_session_cookie())],
        Json(json!({ "message": "Logged out" })),
    )
}

/// Always answers with the same generic body so the response carries no
/// signal about whether the email matched an account.
#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(mut payload): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    payload.email = payload.email.trim().to_lowercase();

    if let Some(user) = User::find_active_by_email(&state.db, &payload.email).await? {
        let token = new_reset_token();
        User::set_reset_token(
            &state.db,
            user.id,
            &token.digest,
            state.config.auth.reset_ttl_minutes,
        )
        .await?;

        if let Err(e) = state.mailer.send_password_reset(&user.email, &token.raw).await {
            // Leave no orphaned token behind if delivery failed. The clear is
            // conditional on our own digest: a concurrent request may already
            // have stored a newer token, which must stay consumable.
            User::clear_reset_token(&state.db, user.id, &token.digest).await?;
            return Err(AuthError::Internal(e.context("send password reset")));
        }
        info!(user_id = %user.id, "password reset token issued");
    }

    Ok(Json(json!({
        "message": "If that email exists, a reset token has been sent"
    })))
}

#[instrument(skip(state, payload, token))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    if payload.password != payload.password_confirm {
        return Err(AuthError::Validation("Passwords are not the same"));
    }

    let creds = CredentialStore::from_ref(&state);
    let hash = creds.hash_async(payload.password).await?;

    // One atomic compare-and-update; not-found and expired are deliberately
    // indistinguishable to the caller.
    let Some(user) = User::consume_reset_token(&state.db, &digest_of(&token), &hash).await? else {
        warn!("reset token did not match or had expired");
        return Err(AuthError::InvalidOrExpiredResetToken);
    };

    info!(user_id = %user.id, "password reset consumed");
    signed_response(&state, &user, StatusCode::OK)
}

#[instrument(skip_all)]
pub async fn update_my_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let creds = CredentialStore::from_ref(&state);
    if !creds
        .verify_async(payload.current_password, user.password_hash.clone())
        .await?
    {
        warn!(user_id = %user.id, "password change with wrong current password");
        return Err(AuthError::InvalidCredentials);
    }
    if payload.password != payload.password_confirm {
        return Err(AuthError::Validation("Passwords are not the same"));
    }

    let hash = creds.hash_async(payload.password).await?;
    let user = User::update_password(&state.db, user.id, &hash).await?;

    info!(user_id = %user.id, "password changed");
    signed_response(&state, &user, StatusCode::OK)
}
