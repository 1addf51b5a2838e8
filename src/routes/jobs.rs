use askama::Template;
use axum::{
    extract::{Path, State},
    response::{Html, Redirect},
    Form,
};
use bigdecimal::BigDecimal;
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::{require_role, PageUser},
    error::{PageError, PageResult},
    models::{JobPosting, JobStatus, NewJobPosting, Role},
    routes::parse_id,
    schema::{job_postings, users},
    state::AppState,
    validation::{check_salary_range, parse_salary},
    views::{format_salary, JobFormPage, JobListPage, JobListRow},
};

const TITLE_MAX_LEN: usize = 255;

#[derive(Deserialize)]
pub struct CreateJobForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub salary_min: String,
    #[serde(default)]
    pub salary_max: String,
}

pub async fn new_job_form(PageUser(user): PageUser) -> PageResult<Html<String>> {
    require_role(&user, Role::Recruiter, "only recruiters can post jobs")?;
    Ok(Html(JobFormPage {}.render()?))
}

pub async fn create_job(
    State(state): State<AppState>,
    PageUser(user): PageUser,
    Form(form): Form<CreateJobForm>,
) -> PageResult<Redirect> {
    require_role(&user, Role::Recruiter, "only recruiters can post jobs")?;

    let title = form.title.trim();
    if title.is_empty() {
        return Err(PageError::bad_request("Job title is required."));
    }
    if title.chars().count() > TITLE_MAX_LEN {
        return Err(PageError::bad_request(
            "Job title must be at most 255 characters long.",
        ));
    }

    let salary_min =
        parse_salary("Minimum Salary", &form.salary_min).map_err(PageError::bad_request)?;
    let salary_max =
        parse_salary("Maximum Salary", &form.salary_max).map_err(PageError::bad_request)?;
    check_salary_range(salary_min.as_ref(), salary_max.as_ref())
        .map_err(PageError::bad_request)?;

    let posting = NewJobPosting {
        id: Uuid::new_v4(),
        recruiter_id: user.id,
        title: title.to_string(),
        salary_min,
        salary_max,
        status: JobStatus::Active.as_str().to_string(),
    };

    let mut conn = state.db()?;
    diesel::insert_into(job_postings::table)
        .values(&posting)
        .execute(&mut conn)?;

    tracing::info!(job_id = %posting.id, recruiter_id = %user.id, "job posting created");
    Ok(Redirect::to("/recruiter/dashboard"))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    PageUser(user): PageUser,
) -> PageResult<Html<String>> {
    let mut conn = state.db()?;
    let rows = job_postings::table
        .inner_join(users::table)
        .filter(job_postings::status.eq(JobStatus::Active.as_str()))
        .order(job_postings::created_at.desc())
        .select((
            job_postings::id,
            job_postings::title,
            job_postings::salary_min,
            job_postings::salary_max,
            job_postings::status,
            users::name,
        ))
        .load::<(
            Uuid,
            String,
            Option<BigDecimal>,
            Option<BigDecimal>,
            String,
            String,
        )>(&mut conn)?;

    let jobs = rows
        .into_iter()
        .map(
            |(id, title, salary_min, salary_max, status, recruiter_name)| JobListRow {
                id,
                title,
                recruiter_name,
                salary_min: format_salary(salary_min.as_ref()),
                salary_max: format_salary(salary_max.as_ref()),
                status,
            },
        )
        .collect();

    let role = user.role();
    let page = JobListPage {
        jobs,
        can_apply: role == Some(Role::Applicant),
        dashboard_path: role.map(|role| role.dashboard_path()).unwrap_or("/"),
    };
    Ok(Html(page.render()?))
}

pub async fn close_job(
    State(state): State<AppState>,
    PageUser(user): PageUser,
    Path(job_id): Path<String>,
) -> PageResult<Redirect> {
    require_role(&user, Role::Recruiter, "only recruiters can close job postings")?;
    let job_id = parse_id(&job_id, "job")?;

    let mut conn = state.db()?;
    let posting = job_postings::table
        .find(job_id)
        .first::<JobPosting>(&mut conn)
        .optional()?
        .ok_or_else(|| PageError::not_found("Job posting not found."))?;

    if posting.recruiter_id != user.id {
        tracing::warn!(job_id = %job_id, user_id = %user.id, "close attempted by non-owner");
        return Err(PageError::forbidden(
            "Forbidden: you do not own this job posting",
        ));
    }

    diesel::update(job_postings::table.find(job_id))
        .set((
            job_postings::status.eq(JobStatus::Closed.as_str()),
            job_postings::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

    tracing::info!(job_id = %job_id, "job posting closed");
    Ok(Redirect::to("/recruiter/dashboard"))
}
