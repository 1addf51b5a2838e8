use askama::Template;
use axum::{
    extract::{Query, State},
    http::{
        header::{LOCATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use axum_extra::{headers::Cookie, typed_header::TypedHeader};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{
        build_clear_cookie, build_oauth_state_cookie, build_pending_registration_cookie,
        build_session_cookie, generate_oauth_state, password, read_cookie, AuthenticatedUser,
        PageUser, OAUTH_STATE_COOKIE, PENDING_REGISTRATION_COOKIE, SESSION_COOKIE,
    },
    error::{is_unique_violation, AppError, AppResult, PageError, PageResult},
    models::{NewUser, Role, User},
    routes::profile::ProfileResponse,
    schema::users::dsl,
    state::AppState,
    validation::{validate_username, validation_message},
    views::ChooseRolePage,
};

const INVALID_CREDENTIALS: &str = "Incorrect username or password";

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(
        length(max = 100, message = "Username must be at most 100 characters long."),
        custom(function = "validate_username")
    )]
    pub username: String,
    #[validate(length(
        min = 8,
        max = 32,
        message = "Password must be between 8 and 32 characters long."
    ))]
    pub password: String,
    #[validate(email(message = "Email address is not valid."))]
    pub email: String,
    pub name: Option<String>,
    pub role: Option<String>,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    payload
        .validate()
        .map_err(|errors| AppError::bad_request(validation_message(&errors)))?;

    let role = match payload.role.as_deref().map(str::trim) {
        None | Some("") => Role::Applicant,
        Some(value) => value
            .parse::<Role>()
            .map_err(|_| AppError::bad_request("Role must be 'applicant' or 'recruiter'."))?,
    };
    let email = payload.email.trim().to_lowercase();

    let mut conn = state.db()?;

    let username_taken = dsl::users
        .filter(dsl::username.eq(&payload.username))
        .select(dsl::id)
        .first::<Uuid>(&mut conn)
        .optional()?
        .is_some();
    if username_taken {
        return Err(AppError::bad_request("Username is already taken."));
    }

    let email_taken = dsl::users
        .filter(dsl::email.eq(&email))
        .select(dsl::id)
        .first::<Uuid>(&mut conn)
        .optional()?
        .is_some();
    if email_taken {
        return Err(AppError::bad_request("Email is already registered."));
    }

    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(payload.username.as_str())
        .to_string();

    let new_user = NewUser {
        id: Uuid::new_v4(),
        username: Some(payload.username.clone()),
        name,
        email: email.clone(),
        password_hash: Some(password::hash_password(&payload.password)?),
        google_id: None,
        role: role.as_str().to_string(),
    };

    match diesel::insert_into(dsl::users)
        .values(&new_user)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(err) if is_unique_violation(&err) => {
            return Err(AppError::bad_request(
                "Username or email is already registered.",
            ));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    tracing::info!(user_id = %new_user.id, role = %role, "registered local user");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: new_user.id,
            username: payload.username,
            email,
            role: role.as_str().to_string(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let mut conn = state.db()?;

    let user = dsl::users
        .filter(dsl::username.eq(&payload.username))
        .first::<User>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::bad_request(INVALID_CREDENTIALS))?;

    let hash = user
        .password_hash
        .as_deref()
        .ok_or_else(|| AppError::bad_request(INVALID_CREDENTIALS))?;
    let valid = password::verify_password(&payload.password, hash).unwrap_or(false);
    if !valid {
        tracing::info!(user_id = %user.id, "rejected login with wrong password");
        return Err(AppError::bad_request(INVALID_CREDENTIALS));
    }

    let token = state.jwt.generate_token(user.id, &user.role)?;

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, build_session_cookie(&state, &token));

    tracing::info!(user_id = %user.id, "user logged in");

    Ok((
        headers,
        Json(LoginResponse {
            message: "Login successful".to_string(),
            token,
            token_type: "Bearer".to_string(),
            expires_in: state.jwt.session_max_age().num_seconds(),
        }),
    ))
}

pub async fn logout(State(state): State<AppState>) -> (HeaderMap, StatusCode) {
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, build_clear_cookie(&state, SESSION_COOKIE));
    (headers, StatusCode::NO_CONTENT)
}

pub async fn me(AuthenticatedUser(user): AuthenticatedUser) -> Json<ProfileResponse> {
    Json(ProfileResponse::from(&user))
}

pub async fn logout_page(State(state): State<AppState>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(LOCATION, HeaderValue::from_static("/"));
    headers.append(SET_COOKIE, build_clear_cookie(&state, SESSION_COOKIE));
    headers.append(
        SET_COOKIE,
        build_clear_cookie(&state, PENDING_REGISTRATION_COOKIE),
    );
    (StatusCode::TEMPORARY_REDIRECT, headers).into_response()
}

pub async fn google_login(
    State(state): State<AppState>,
    user: Option<PageUser>,
    cookies: Option<TypedHeader<Cookie>>,
) -> PageResult<Response> {
    if user.is_some() {
        return Ok(Redirect::temporary("/profile").into_response());
    }

    if let Some(pending) = read_cookie(&cookies, PENDING_REGISTRATION_COOKIE) {
        if state.jwt.verify_pending_registration(pending).is_ok() {
            return Ok(Redirect::temporary("/auth/choose-role").into_response());
        }
    }

    let oauth = state.oauth.as_ref().ok_or_else(|| {
        PageError(AppError::service_unavailable(
            "Google login is not configured.",
        ))
    })?;

    let oauth_state = generate_oauth_state();
    let url = oauth
        .authorization_url(&oauth_state)
        .map_err(AppError::internal)?;
    let location = HeaderValue::from_str(&url).map_err(AppError::internal)?;

    let mut headers = HeaderMap::new();
    headers.insert(LOCATION, location);
    headers.insert(SET_COOKIE, build_oauth_state_cookie(&state, &oauth_state));
    Ok((StatusCode::TEMPORARY_REDIRECT, headers).into_response())
}

#[derive(Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

pub async fn google_callback(
    State(state): State<AppState>,
    cookies: Option<TypedHeader<Cookie>>,
    Query(params): Query<CallbackParams>,
) -> PageResult<Response> {
    if let Some(error) = params.error.as_deref() {
        tracing::info!(error, "google login was not completed");
        return Err(PageError::bad_request("Google login was cancelled."));
    }

    let expected = read_cookie(&cookies, OAUTH_STATE_COOKIE);
    match (expected, params.state.as_deref()) {
        (Some(expected), Some(received)) if expected == received => {}
        _ => {
            tracing::warn!("oauth state mismatch on callback");
            return Err(PageError::bad_request(
                "Invalid login state. Please try logging in again.",
            ));
        }
    }

    let code = params
        .code
        .as_deref()
        .filter(|code| !code.is_empty())
        .ok_or_else(|| PageError::bad_request("Missing authorization code."))?;

    let oauth = state.oauth.as_ref().ok_or_else(|| {
        PageError(AppError::service_unavailable(
            "Google login is not configured.",
        ))
    })?;

    let identity = oauth.authenticate(code).await.map_err(|err| {
        tracing::error!(error = %err, "google login failed");
        AppError::bad_gateway("Authentication with Google failed.")
    })?;

    let mut conn = state.db()?;
    let existing = dsl::users
        .filter(dsl::google_id.eq(&identity.google_id))
        .first::<User>(&mut conn)
        .optional()?;

    let mut headers = HeaderMap::new();
    headers.append(SET_COOKIE, build_clear_cookie(&state, OAUTH_STATE_COOKIE));

    match existing {
        Some(user) => {
            let token = state.jwt.generate_token(user.id, &user.role)?;
            headers.append(SET_COOKIE, build_session_cookie(&state, &token));
            headers.append(
                SET_COOKIE,
                build_clear_cookie(&state, PENDING_REGISTRATION_COOKIE),
            );
            headers.insert(LOCATION, HeaderValue::from_static("/profile"));
            tracing::info!(user_id = %user.id, "google user logged in");
        }
        None => {
            let pending = state.jwt.generate_pending_registration(&identity)?;
            headers.append(
                SET_COOKIE,
                build_pending_registration_cookie(&state, &pending),
            );
            headers.insert(LOCATION, HeaderValue::from_static("/auth/choose-role"));
            tracing::info!("unknown google account, awaiting role selection");
        }
    }

    Ok((StatusCode::TEMPORARY_REDIRECT, headers).into_response())
}

pub async fn choose_role_form(
    State(state): State<AppState>,
    cookies: Option<TypedHeader<Cookie>>,
) -> PageResult<Response> {
    let identity = read_cookie(&cookies, PENDING_REGISTRATION_COOKIE)
        .and_then(|token| state.jwt.verify_pending_registration(token).ok());

    let Some(identity) = identity else {
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, HeaderValue::from_static("/"));
        headers.insert(
            SET_COOKIE,
            build_clear_cookie(&state, PENDING_REGISTRATION_COOKIE),
        );
        return Ok((StatusCode::TEMPORARY_REDIRECT, headers).into_response());
    };

    let page = ChooseRolePage {
        name: &identity.name,
        email: &identity.email,
    };
    Ok(Html(page.render()?).into_response())
}

#[derive(Deserialize)]
pub struct ChooseRoleForm {
    #[serde(default)]
    pub role: String,
}

pub async fn choose_role(
    State(state): State<AppState>,
    cookies: Option<TypedHeader<Cookie>>,
    Form(form): Form<ChooseRoleForm>,
) -> PageResult<Response> {
    let identity = read_cookie(&cookies, PENDING_REGISTRATION_COOKIE)
        .and_then(|token| state.jwt.verify_pending_registration(token).ok())
        .ok_or_else(|| {
            PageError::bad_request("Session expired or invalid state. Please try logging in again.")
        })?;

    let role: Role = form
        .role
        .parse()
        .map_err(|_| PageError::bad_request("Invalid role selected."))?;

    let new_user = NewUser {
        id: Uuid::new_v4(),
        username: None,
        name: identity.name,
        email: identity.email.to_lowercase(),
        password_hash: None,
        google_id: Some(identity.google_id),
        role: role.as_str().to_string(),
    };

    let mut conn = state.db()?;
    match diesel::insert_into(dsl::users)
        .values(&new_user)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(err) if is_unique_violation(&err) => {
            return Err(PageError::bad_request(
                "An account with this e-mail is already registered.",
            ));
        }
        Err(err) => return Err(PageError::from(err)),
    }

    tracing::info!(user_id = %new_user.id, role = %role, "registered google user");

    let token = state.jwt.generate_token(new_user.id, role.as_str())?;
    let mut headers = HeaderMap::new();
    headers.insert(LOCATION, HeaderValue::from_static("/profile"));
    headers.append(
        SET_COOKIE,
        build_clear_cookie(&state, PENDING_REGISTRATION_COOKIE),
    );
    headers.append(SET_COOKIE, build_session_cookie(&state, &token));
    Ok((StatusCode::SEE_OTHER, headers).into_response())
}
