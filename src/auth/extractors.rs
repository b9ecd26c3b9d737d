use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::{
    auth::{
        jwt::SessionKeys,
        repo::{Role, User},
    },
    errors::AuthError,
    state::AppState,
};

pub const SESSION_COOKIE: &str = "session";

/// The principal resolved by `protect`, available to downstream handlers as
/// an extractor. Missing extension means `protect` did not run on this route.
#[derive(Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AuthError::Unauthenticated)
    }
}

/// Authentication middleware.
///
/// Pulls the session token from the `Authorization` header or the session
/// cookie, verifies it, loads the principal (inactive accounts are invisible
/// to the lookup) and rejects tokens issued before the most recent password
/// change. On success the resolved `CurrentUser` rides along in the request
/// extensions.
pub async fn protect(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = token_from_headers(req.headers()).ok_or(AuthError::Unauthenticated)?;

    let keys = SessionKeys::from_ref(&state);
    let claims = keys.verify(&token)?;

    let user = User::find_active_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %claims.sub, "token for unknown or inactive principal");
            AuthError::Unauthenticated
        })?;

    if user.changed_password_after(claims.iat) {
        warn!(user_id = %user.id, "session token predates password change");
        return Err(AuthError::StaleToken);
    }

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Authorization middleware; composes after `protect` and has no
/// authentication capability of its own.
pub async fn require_role(
    allowed: &[Role],
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let current = req
        .extensions()
        .get::<CurrentUser>()
        .ok_or(AuthError::Unauthenticated)?;
    if !role_allowed(allowed, current.0.role) {
        warn!(user_id = %current.0.id, role = ?current.0.role, "role not permitted");
        return Err(AuthError::Forbidden);
    }
    Ok(next.run(req).await)
}

fn role_allowed(allowed: &[Role], role: Role) -> bool {
    allowed.contains(&role)
}

/// Bearer header wins over the cookie when both are present.
fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
        {
            return Some(token.to_owned());
        }
    }

    for cookie_header in headers.get_all(header::COOKIE) {
        let Ok(cookies) = cookie_header.to_str() else {
            continue;
        };
        for pair in cookies.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                if name == SESSION_COOKIE && !value.is_empty() {
                    return Some(value.to_owned());
                }
            }
        }
    }

    None
}

pub fn session_cookie(token: &str, ttl_days: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        ttl_days * 24 * 60 * 60
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request as HttpRequest};

    fn headers_with(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.append(
                axum::http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        headers
    }

    #[test]
    fn bearer_header_is_extracted() {
        let headers = headers_with(&[("authorization", "Bearer abc.def.ghi")]);
        assert_eq!(token_from_headers(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn session_cookie_is_extracted() {
        let headers = headers_with(&[("cookie", "theme=dark; session=tok123; lang=en")]);
        assert_eq!(token_from_headers(&headers).as_deref(), Some("tok123"));
    }

    #[test]
    fn bearer_wins_over_cookie() {
        let headers = headers_with(&[
            ("authorization", "Bearer from-header"),
            ("cookie", "session=from-cookie"),
        ]);
        assert_eq!(
            token_from_headers(&headers).as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn no_token_means_none() {
        assert_eq!(token_from_headers(&HeaderMap::new()), None);
        let headers = headers_with(&[("authorization", "Basic dXNlcjpwdw==")]);
        assert_eq!(token_from_headers(&headers), None);
        let headers = headers_with(&[("cookie", "session=")]);
        assert_eq!(token_from_headers(&headers), None);
    }

    #[test]
    fn admin_only_rejects_user_and_accepts_admin() {
        let allowed = &[Role::Admin];
        assert!(!role_allowed(allowed, Role::User));
        assert!(!role_allowed(allowed, Role::Guide));
        assert!(role_allowed(allowed, Role::Admin));
    }

    #[test]
    fn multiple_roles_can_be_allowed() {
        let allowed = &[Role::Admin, Role::LeadGuide];
        assert!(role_allowed(allowed, Role::LeadGuide));
        assert!(!role_allowed(allowed, Role::Guide));
    }

    #[tokio::test]
    async fn current_user_extractor_fails_without_protect() {
        let (mut parts, _) = HttpRequest::new(()).into_parts();
        let err = CurrentUser::from_request_parts(&mut parts, &())
            .await
            .err()
            .expect("no extension set");
        assert!(matches!(err, AuthError::Unauthenticated));
    }

    #[test]
    fn cookie_helpers_are_http_only() {
        let set = session_cookie("tok", 90, false);
        assert!(set.starts_with("session=tok;"));
        assert!(set.contains("HttpOnly"));
        assert!(set.contains("Max-Age=7776000"));
        assert!(!set.contains("Secure"));
        let clear = clear_session_cookie();
        assert!(clear.starts_with("session=;"));
        assert!(clear.contains("Max-Age=0"));
    }

    #[test]
    fn session_cookie_is_secure_when_configured() {
        let set = session_cookie("tok", 90, true);
        assert!(set.ends_with("; Secure"));
        assert!(set.contains("HttpOnly"));
    }
}
