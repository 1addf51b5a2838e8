use askama::Template;
use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap},
    response::Html,
    Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    auth::{build_clear_cookie, AuthenticatedUser, PageUser, SESSION_COOKIE},
    error::{is_unique_violation, AppError, AppResult, PageResult},
    models::User,
    schema::users,
    state::AppState,
    validation::{is_valid_email, validate_username},
    views::ProfilePage,
};

const NAME_MAX_LEN: usize = 255;
const USERNAME_MAX_LEN: usize = 100;

#[derive(Serialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub username: Option<String>,
    pub name: String,
    pub email: String,
    pub role: String,
    pub google_linked: bool,
}

impl From<&User> for ProfileResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            google_linked: user.google_id.is_some(),
        }
    }
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(AsChangeset)]
#[diesel(table_name = users)]
struct ProfileChangeset<'a> {
    username: Option<&'a str>,
    email: Option<&'a str>,
    name: Option<&'a str>,
    updated_at: NaiveDateTime,
}

pub async fn profile_page(PageUser(user): PageUser) -> PageResult<Html<String>> {
    let dashboard_path = user
        .role()
        .map(|role| role.dashboard_path())
        .unwrap_or("/");
    let page = ProfilePage {
        name: &user.name,
        email: &user.email,
        role: &user.role,
        username: user.username.as_deref(),
        google_id: user.google_id.as_deref(),
        dashboard_path,
    };
    Ok(Html(page.render()?))
}

pub async fn get_profile(AuthenticatedUser(user): AuthenticatedUser) -> Json<ProfileResponse> {
    Json(ProfileResponse::from(&user))
}

pub async fn update_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<ProfileResponse>> {
    let username = match payload.username.as_deref().map(str::trim) {
        Some(value) => {
            validate_username(value).map_err(|err| {
                AppError::bad_request(
                    err.message
                        .map(|message| message.to_string())
                        .unwrap_or_else(|| "Username is invalid.".to_string()),
                )
            })?;
            if value.len() > USERNAME_MAX_LEN {
                return Err(AppError::bad_request(
                    "Username must be at most 100 characters long.",
                ));
            }
            Some(value)
        }
        None => None,
    };

    let email = match payload.email.as_deref().map(str::trim) {
        Some(value) if is_valid_email(value) => Some(value.to_lowercase()),
        Some(_) => return Err(AppError::bad_request("Email address is not valid.")),
        None => None,
    };

    let name = match payload.name.as_deref().map(str::trim) {
        Some("") => return Err(AppError::bad_request("Name must not be empty.")),
        Some(value) if value.chars().count() > NAME_MAX_LEN => {
            return Err(AppError::bad_request(
                "Name must be at most 255 characters long.",
            ))
        }
        other => other,
    };

    if username.is_none() && email.is_none() && name.is_none() {
        return Ok(Json(ProfileResponse::from(&user)));
    }

    let mut conn = state.db()?;

    if let Some(username) = username {
        let taken = users::table
            .filter(users::username.eq(username))
            .filter(users::id.ne(user.id))
            .select(users::id)
            .first::<Uuid>(&mut conn)
            .optional()?;
        if taken.is_some() {
            return Err(AppError::bad_request("Username is already taken."));
        }
    }

    if let Some(email) = email.as_deref() {
        let taken = users::table
            .filter(users::email.eq(email))
            .filter(users::id.ne(user.id))
            .select(users::id)
            .first::<Uuid>(&mut conn)
            .optional()?;
        if taken.is_some() {
            return Err(AppError::bad_request("Email is already registered."));
        }
    }

    let changeset = ProfileChangeset {
        username,
        email: email.as_deref(),
        name,
        updated_at: Utc::now().naive_utc(),
    };

    let updated: User = match diesel::update(users::table.find(user.id))
        .set(&changeset)
        .get_result(&mut conn)
    {
        Ok(updated) => updated,
        Err(err) if is_unique_violation(&err) => {
            return Err(AppError::bad_request(
                "Username or email is already registered.",
            ));
        }
        Err(err) => return Err(AppError::from(err)),
    };

    tracing::info!(user_id = %user.id, "profile updated");
    Ok(Json(ProfileResponse::from(&updated)))
}

pub async fn delete_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> AppResult<(HeaderMap, Json<Value>)> {
    let mut conn = state.db()?;
    let deleted = diesel::delete(users::table.find(user.id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found_with("User not found."));
    }

    tracing::info!(user_id = %user.id, "account deleted");

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, build_clear_cookie(&state, SESSION_COOKIE));
    Ok((headers, Json(json!({ "message": "Account deleted" }))))
}
