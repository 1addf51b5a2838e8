use askama::Template;
use axum::{
    extract::{Path, State},
    response::{Html, Redirect},
};
use chrono::{NaiveDateTime, Utc};
use diesel::{dsl::exists, prelude::*, select};
use uuid::Uuid;

use crate::{
    auth::{require_role, PageUser},
    error::{is_unique_violation, AppError, PageError, PageResult},
    mailer::{interview_request_body, INTERVIEW_SUBJECT},
    models::{Application, ApplicationStatus, JobPosting, NewApplication, Role, User},
    routes::parse_id,
    schema::{applications, job_postings, resumes, users},
    state::AppState,
    views::{format_salary, format_timestamp, ApplicantRow, ApplyPage, JobApplicationsPage},
};

fn load_posting(conn: &mut PgConnection, job_id: Uuid) -> PageResult<JobPosting> {
    job_postings::table
        .find(job_id)
        .first::<JobPosting>(conn)
        .optional()?
        .ok_or_else(|| PageError::not_found("Job posting not found."))
}

fn has_parsed_resume(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<bool> {
    select(exists(
        resumes::table
            .filter(resumes::user_id.eq(user_id))
            .filter(resumes::parsed.is_not_null()),
    ))
    .get_result(conn)
}

pub async fn apply_form(
    State(state): State<AppState>,
    PageUser(user): PageUser,
    Path(job_id): Path<String>,
) -> PageResult<Html<String>> {
    require_role(&user, Role::Applicant, "only applicants can apply for jobs")?;
    let job_id = parse_id(&job_id, "job")?;

    let mut conn = state.db()?;
    let posting = load_posting(&mut conn, job_id)?;
    if !posting.is_active() {
        return Err(PageError::bad_request(
            "This job posting is no longer active.",
        ));
    }

    let already_applied: bool = select(exists(
        applications::table
            .filter(applications::user_id.eq(user.id))
            .filter(applications::job_posting_id.eq(job_id)),
    ))
    .get_result(&mut conn)?;
    if already_applied {
        return Err(PageError::bad_request("Already applied to this job."));
    }

    let recruiter_name: String = users::table
        .find(posting.recruiter_id)
        .select(users::name)
        .first(&mut conn)?;
    let has_resume = has_parsed_resume(&mut conn, user.id)?;

    let page = ApplyPage {
        job_id,
        title: &posting.title,
        recruiter_name: &recruiter_name,
        salary_min: format_salary(posting.salary_min.as_ref()),
        salary_max: format_salary(posting.salary_max.as_ref()),
        has_resume,
    };
    Ok(Html(page.render()?))
}

pub async fn submit_application(
    State(state): State<AppState>,
    PageUser(user): PageUser,
    Path(job_id): Path<String>,
) -> PageResult<Redirect> {
    require_role(&user, Role::Applicant, "only applicants can apply for jobs")?;

    let mut conn = state.db()?;
    if !has_parsed_resume(&mut conn, user.id)? {
        return Err(PageError::bad_request(
            "You must upload a resume before applying for jobs.",
        ));
    }

    let job_id = parse_id(&job_id, "job")?;
    let posting = load_posting(&mut conn, job_id)?;
    if !posting.is_active() {
        return Err(PageError::bad_request(
            "This job posting is no longer active.",
        ));
    }

    let application = NewApplication {
        id: Uuid::new_v4(),
        user_id: user.id,
        job_posting_id: job_id,
        status: ApplicationStatus::Submitted.as_str().to_string(),
    };

    match diesel::insert_into(applications::table)
        .values(&application)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(err) if is_unique_violation(&err) => {
            return Err(PageError(AppError::conflict(
                "You have already applied for this job.",
            )));
        }
        Err(err) => return Err(PageError::from(err)),
    }

    tracing::info!(
        application_id = %application.id,
        job_id = %job_id,
        user_id = %user.id,
        "application submitted"
    );
    Ok(Redirect::to("/applicant/dashboard"))
}

pub async fn list_job_applications(
    State(state): State<AppState>,
    PageUser(user): PageUser,
    Path(job_id): Path<String>,
) -> PageResult<Html<String>> {
    require_role(&user, Role::Recruiter, "only recruiters can view applications")?;
    let job_id = parse_id(&job_id, "job")?;

    let mut conn = state.db()?;
    let posting = load_posting(&mut conn, job_id)?;
    if posting.recruiter_id != user.id {
        return Err(PageError::forbidden(
            "Forbidden: you do not own this job posting",
        ));
    }

    let rows = applications::table
        .inner_join(users::table)
        .filter(applications::job_posting_id.eq(job_id))
        .order(applications::applied_at.asc())
        .select((
            applications::id,
            users::id,
            users::name,
            users::email,
            applications::status,
            applications::applied_at,
        ))
        .load::<(Uuid, Uuid, String, String, String, NaiveDateTime)>(&mut conn)?;

    let applications = rows
        .into_iter()
        .map(|(id, applicant_id, name, email, status, applied_at)| {
            let parsed = status.parse::<ApplicationStatus>().ok();
            ApplicantRow {
                id,
                applicant_id,
                name,
                email,
                applied_at: format_timestamp(applied_at),
                can_reject: parsed != Some(ApplicationStatus::Rejected),
                can_interview: parsed == Some(ApplicationStatus::Submitted),
                status,
            }
        })
        .collect();

    let page = JobApplicationsPage {
        job_id,
        job_title: &posting.title,
        applications,
    };
    Ok(Html(page.render()?))
}

/// Loads an application of `job_id`, checking that `recruiter` owns the job.
fn load_owned_application(
    conn: &mut PgConnection,
    recruiter: &User,
    job_id: Uuid,
    application_id: Uuid,
) -> PageResult<Application> {
    let application = applications::table
        .find(application_id)
        .first::<Application>(conn)
        .optional()?
        .ok_or_else(|| PageError::not_found("Application not found."))?;

    if application.job_posting_id != job_id {
        return Err(PageError::bad_request("Application/Job mismatch."));
    }

    let posting = load_posting(conn, job_id)?;
    if posting.recruiter_id != recruiter.id {
        tracing::warn!(
            application_id = %application_id,
            user_id = %recruiter.id,
            "application action by non-owner"
        );
        return Err(PageError::forbidden(
            "Forbidden: you do not own the job posting for this application",
        ));
    }

    Ok(application)
}

fn set_status(
    conn: &mut PgConnection,
    application_id: Uuid,
    status: ApplicationStatus,
) -> QueryResult<usize> {
    diesel::update(applications::table.find(application_id))
        .set((
            applications::status.eq(status.as_str()),
            applications::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)
}

fn applications_list_path(job_id: Uuid) -> String {
    format!("/recruiter/jobs/{job_id}/applications")
}

pub async fn reject_application(
    State(state): State<AppState>,
    PageUser(user): PageUser,
    Path((job_id, application_id)): Path<(String, String)>,
) -> PageResult<Redirect> {
    require_role(&user, Role::Recruiter, "only recruiters can reject applications")?;
    let job_id = parse_id(&job_id, "job")?;
    let application_id = parse_id(&application_id, "application")?;

    let mut conn = state.db()?;
    load_owned_application(&mut conn, &user, job_id, application_id)?;
    set_status(&mut conn, application_id, ApplicationStatus::Rejected)?;

    tracing::info!(application_id = %application_id, job_id = %job_id, "application rejected");
    Ok(Redirect::to(&applications_list_path(job_id)))
}

pub async fn request_interview(
    State(state): State<AppState>,
    PageUser(user): PageUser,
    Path((job_id, application_id)): Path<(String, String)>,
) -> PageResult<Redirect> {
    require_role(&user, Role::Recruiter, "only recruiters can request interviews")?;
    let job_id = parse_id(&job_id, "job")?;
    let application_id = parse_id(&application_id, "application")?;

    let applicant_email = {
        let mut conn = state.db()?;
        let application = load_owned_application(&mut conn, &user, job_id, application_id)?;

        let updated = diesel::update(
            applications::table
                .find(application_id)
                .filter(applications::status.eq(ApplicationStatus::Submitted.as_str())),
        )
        .set((
            applications::status.eq(ApplicationStatus::Accepted.as_str()),
            applications::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;
        if updated == 0 {
            let current: String = applications::table
                .find(application_id)
                .select(applications::status)
                .first(&mut conn)?;
            return Err(PageError::bad_request(format!(
                "Cannot request interview for application with status '{current}'."
            )));
        }
        tracing::info!(application_id = %application_id, job_id = %job_id, "interview requested");

        users::table
            .find(application.user_id)
            .select(users::email)
            .first::<String>(&mut conn)?
    };

    match state.mailer.as_ref() {
        Some(mailer) => {
            if let Err(err) = mailer
                .send(
                    &applicant_email,
                    INTERVIEW_SUBJECT,
                    &interview_request_body(),
                )
                .await
            {
                tracing::warn!(
                    application_id = %application_id,
                    error = %err,
                    "failed to send interview e-mail"
                );
            }
        }
        None => {
            tracing::warn!(
                application_id = %application_id,
                "mail not configured, skipping interview e-mail"
            );
        }
    }

    Ok(Redirect::to(&applications_list_path(job_id)))
}
