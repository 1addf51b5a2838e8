use std::collections::HashMap;

use askama::Template;
use axum::{
    extract::State,
    response::{Html, Redirect},
};
use chrono::NaiveDateTime;
use diesel::{dsl::count_star, prelude::*};
use uuid::Uuid;

use crate::{
    auth::{require_role, PageUser},
    error::{PageError, PageResult},
    models::{JobPosting, ResumeSummary, Role},
    routes::{resumes::resume_status, skills::load_skill_names},
    schema::{applications, job_postings, resumes},
    state::AppState,
    views::{
        format_salary, format_timestamp, ApplicantDashboardPage, HomePage, MyApplicationRow,
        PostingRow, RecruiterDashboardPage,
    },
};

pub async fn index(
    State(state): State<AppState>,
    user: Option<PageUser>,
) -> PageResult<Html<String>> {
    let user = user.map(|PageUser(user)| user);
    let dashboard_path = user
        .as_ref()
        .and_then(|user| user.role())
        .map(|role| role.dashboard_path())
        .unwrap_or("/");

    let page = HomePage {
        name: user.as_ref().map(|user| user.name.as_str()),
        dashboard_path,
        google_enabled: state.oauth.is_some(),
    };
    Ok(Html(page.render()?))
}

pub async fn dashboard(PageUser(user): PageUser) -> PageResult<Redirect> {
    let role = user
        .role()
        .ok_or_else(|| PageError::forbidden("Forbidden: unknown role"))?;
    Ok(Redirect::temporary(role.dashboard_path()))
}

pub async fn recruiter_dashboard(
    State(state): State<AppState>,
    PageUser(user): PageUser,
) -> PageResult<Html<String>> {
    require_role(&user, Role::Recruiter, "only recruiters can view this dashboard")?;

    let mut conn = state.db()?;
    let postings: Vec<JobPosting> = job_postings::table
        .filter(job_postings::recruiter_id.eq(user.id))
        .order(job_postings::created_at.desc())
        .load(&mut conn)?;

    let posting_ids: Vec<Uuid> = postings.iter().map(|posting| posting.id).collect();
    let counts: HashMap<Uuid, i64> = applications::table
        .filter(applications::job_posting_id.eq_any(&posting_ids))
        .group_by(applications::job_posting_id)
        .select((applications::job_posting_id, count_star()))
        .load::<(Uuid, i64)>(&mut conn)?
        .into_iter()
        .collect();

    let jobs = postings
        .into_iter()
        .map(|posting| PostingRow {
            id: posting.id,
            salary_min: format_salary(posting.salary_min.as_ref()),
            salary_max: format_salary(posting.salary_max.as_ref()),
            is_active: posting.is_active(),
            application_count: *counts.get(&posting.id).unwrap_or(&0),
            status: posting.status,
            title: posting.title,
        })
        .collect();

    let page = RecruiterDashboardPage {
        name: &user.name,
        jobs,
    };
    Ok(Html(page.render()?))
}

pub async fn applicant_dashboard(
    State(state): State<AppState>,
    PageUser(user): PageUser,
) -> PageResult<Html<String>> {
    require_role(&user, Role::Applicant, "only applicants can view this dashboard")?;

    let mut conn = state.db()?;
    let applications = applications::table
        .inner_join(job_postings::table)
        .filter(applications::user_id.eq(user.id))
        .order(applications::applied_at.desc())
        .select((
            job_postings::title,
            applications::status,
            applications::applied_at,
        ))
        .load::<(String, String, NaiveDateTime)>(&mut conn)?
        .into_iter()
        .map(|(job_title, status, applied_at)| MyApplicationRow {
            job_title,
            status,
            applied_at: format_timestamp(applied_at),
        })
        .collect();

    let skills = load_skill_names(&mut conn, user.id)?;
    let resume = resumes::table
        .find(user.id)
        .select(ResumeSummary::as_select())
        .first::<ResumeSummary>(&mut conn)
        .optional()?
        .map(|summary| resume_status(&summary));

    let page = ApplicantDashboardPage {
        name: &user.name,
        applications,
        skills,
        resume,
    };
    Ok(Html(page.render()?))
}
