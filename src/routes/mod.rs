use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::{
    error::{PageError, PageResult},
    state::AppState,
};

pub mod applications;
pub mod auth;
pub mod health;
pub mod home;
pub mod jobs;
pub mod profile;
pub mod resumes;
pub mod skills;

// multipart framing on top of the largest resume
pub const BODY_LIMIT_BYTES: usize = resumes::MAX_RESUME_BYTES + 64 * 1024;

pub(crate) fn parse_id(raw: &str, what: &str) -> PageResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| PageError::bad_request(format!("Invalid {what} ID format.")))
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return None;
                }
                match trimmed.parse::<HeaderValue>() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(origin = trimmed, "ignoring invalid CORS origin");
                        None
                    }
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(headers))
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let api_auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    let api_routes = Router::new()
        .nest("/auth", api_auth_routes)
        .route(
            "/profile",
            get(profile::get_profile)
                .patch(profile::update_profile)
                .delete(profile::delete_profile),
        )
        .route(
            "/skills",
            get(skills::list_skills).post(skills::create_skill),
        )
        .route("/skills/:id", delete(skills::delete_skill))
        .route("/health", get(health::health_check));

    let oauth_routes = Router::new()
        .route("/auth/google", get(auth::google_login))
        .route("/auth/google/callback", get(auth::google_callback))
        .route(
            "/auth/choose-role",
            get(auth::choose_role_form).post(auth::choose_role),
        )
        .route("/logout", get(auth::logout_page));

    let page_routes = Router::new()
        .route("/", get(home::index))
        .route("/dashboard", get(home::dashboard))
        .route("/profile", get(profile::profile_page))
        .route("/recruiter/dashboard", get(home::recruiter_dashboard))
        .route("/applicant/dashboard", get(home::applicant_dashboard))
        .route("/jobs", get(jobs::list_jobs).post(jobs::create_job))
        .route("/jobs/new", get(jobs::new_job_form))
        .route(
            "/jobs/:job_id/apply",
            get(applications::apply_form).post(applications::submit_application),
        )
        .route("/recruiter/jobs/:job_id/close", post(jobs::close_job))
        .route(
            "/recruiter/jobs/:job_id/applications",
            get(applications::list_job_applications),
        )
        .route(
            "/recruiter/jobs/:job_id/applications/:application_id/reject",
            post(applications::reject_application),
        )
        .route(
            "/recruiter/jobs/:job_id/applications/:application_id/request_interview",
            post(applications::request_interview),
        )
        .route(
            "/applicant/resume",
            get(resumes::resume_page).post(resumes::upload_resume),
        )
        .route(
            "/applicant/resume/download",
            get(resumes::download_own_resume),
        )
        .route(
            "/applicant/skills",
            get(skills::skills_page).post(skills::update_skills),
        )
        .route("/recruiter/search", get(skills::search_applicants))
        .route(
            "/recruiter/applicants/:applicant_id",
            get(skills::applicant_profile),
        )
        .route(
            "/recruiter/applicants/:applicant_id/resume",
            get(resumes::download_applicant_resume),
        );

    Router::new()
        .merge(page_routes)
        .merge(oauth_routes)
        .nest("/api", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
}
