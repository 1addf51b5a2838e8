pub mod google;
pub mod jwt;
pub mod password;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{
        header::{LOCATION, SET_COOKIE},
        request::Parts,
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
};
use axum_extra::headers::{authorization::Bearer, Authorization, Cookie};
use axum_extra::TypedHeader;
use diesel::prelude::*;
use rand::{rngs::OsRng, RngCore};

use crate::{
    error::{AppError, PageError, PageResult},
    models::{Role, User},
    schema::users,
    state::AppState,
};

pub const SESSION_COOKIE: &str = "session";
pub const PENDING_REGISTRATION_COOKIE: &str = "pending_registration";
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

const OAUTH_STATE_MAX_AGE_SECS: i64 = 600;

/// User behind the session cookie or bearer token. JSON routes reject with 401.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Same as [`AuthenticatedUser`] for HTML pages: anonymous visitors are sent home.
#[derive(Debug, Clone)]
pub struct PageUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = resolve_session_user(parts, state)
            .await?
            .ok_or_else(AppError::unauthorized)?;
        Ok(AuthenticatedUser(user))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for PageUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match resolve_session_user(parts, state).await {
            Ok(Some(user)) => Ok(PageUser(user)),
            Ok(None) => Err(redirect_home_clearing_session(state)),
            Err(err) => Err(PageError(err).into_response()),
        }
    }
}

async fn resolve_session_user(parts: &mut Parts, state: &AppState) -> Result<Option<User>, AppError> {
    let Some(token) = session_token(parts, state).await else {
        return Ok(None);
    };

    let Ok(claims) = state.jwt.verify_token(&token) else {
        tracing::debug!("rejected invalid session token");
        return Ok(None);
    };

    let mut conn = state.db()?;
    let user = users::table
        .find(claims.sub)
        .first::<User>(&mut conn)
        .optional()?;

    if user.is_none() {
        tracing::info!(user_id = %claims.sub, "session refers to a deleted user");
    }

    Ok(user)
}

async fn session_token(parts: &mut Parts, state: &AppState) -> Option<String> {
    if let Ok(TypedHeader(Authorization(bearer))) =
        TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await
    {
        return Some(bearer.token().to_string());
    }

    let TypedHeader(cookies) = TypedHeader::<Cookie>::from_request_parts(parts, state)
        .await
        .ok()?;
    cookies
        .get(SESSION_COOKIE)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// 403 unless `user` holds `role`.
pub fn require_role(user: &User, role: Role, message: &str) -> PageResult<()> {
    if user.has_role(role) {
        Ok(())
    } else {
        tracing::warn!(user_id = %user.id, required = %role, actual = %user.role, "role check failed");
        Err(PageError::forbidden(format!("Forbidden: {message}")))
    }
}

pub fn redirect_home_clearing_session(state: &AppState) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(LOCATION, HeaderValue::from_static("/"));
    headers.append(SET_COOKIE, build_clear_cookie(state, SESSION_COOKIE));
    (StatusCode::TEMPORARY_REDIRECT, headers).into_response()
}

pub fn build_session_cookie(state: &AppState, token: &str) -> HeaderValue {
    let max_age = state.jwt.session_max_age().num_seconds();
    build_cookie(state, SESSION_COOKIE, token, max_age)
}

pub fn build_pending_registration_cookie(state: &AppState, token: &str) -> HeaderValue {
    let max_age = state.jwt.pending_max_age().num_seconds();
    build_cookie(state, PENDING_REGISTRATION_COOKIE, token, max_age)
}

pub fn build_oauth_state_cookie(state: &AppState, value: &str) -> HeaderValue {
    build_cookie(state, OAUTH_STATE_COOKIE, value, OAUTH_STATE_MAX_AGE_SECS)
}

fn build_cookie(state: &AppState, name: &str, value: &str, max_age: i64) -> HeaderValue {
    let mut parts = vec![format!("{}={}", name, value)];
    parts.push("Path=/".into());
    parts.push("HttpOnly".into());
    parts.push("SameSite=Lax".into());
    parts.push(format!("Max-Age={}", max_age));
    if state.config.session_cookie_secure {
        parts.push("Secure".into());
    }

    HeaderValue::from_str(&parts.join("; ")).expect("valid session cookie")
}

pub fn build_clear_cookie(state: &AppState, name: &str) -> HeaderValue {
    let mut parts = vec![format!("{}=", name)];
    parts.push("Path=/".into());
    parts.push("HttpOnly".into());
    parts.push("SameSite=Lax".into());
    parts.push("Max-Age=0".into());
    parts.push("Expires=Thu, 01 Jan 1970 00:00:00 GMT".into());
    if state.config.session_cookie_secure {
        parts.push("Secure".into());
    }

    HeaderValue::from_str(&parts.join("; ")).expect("valid session cookie")
}

pub fn read_cookie<'a>(cookies: &'a Option<TypedHeader<Cookie>>, name: &str) -> Option<&'a str> {
    cookies
        .as_ref()
        .and_then(|TypedHeader(cookies)| cookies.get(name))
        .filter(|value| !value.is_empty())
}

pub fn generate_oauth_state() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
