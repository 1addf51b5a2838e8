use askama::Template;
use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use uuid::Uuid;

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorPage<'a> {
    pub status: u16,
    pub message: &'a str,
}

#[derive(Template)]
#[template(path = "home.html")]
pub struct HomePage<'a> {
    pub name: Option<&'a str>,
    pub dashboard_path: &'a str,
    pub google_enabled: bool,
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfilePage<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub role: &'a str,
    pub username: Option<&'a str>,
    pub google_id: Option<&'a str>,
    pub dashboard_path: &'a str,
}

#[derive(Template)]
#[template(path = "choose_role.html")]
pub struct ChooseRolePage<'a> {
    pub name: &'a str,
    pub email: &'a str,
}

#[derive(Template)]
#[template(path = "recruiter_dashboard.html")]
pub struct RecruiterDashboardPage<'a> {
    pub name: &'a str,
    pub jobs: Vec<PostingRow>,
}

pub struct PostingRow {
    pub id: Uuid,
    pub title: String,
    pub salary_min: String,
    pub salary_max: String,
    pub status: String,
    pub is_active: bool,
    pub application_count: i64,
}

#[derive(Template)]
#[template(path = "applicant_dashboard.html")]
pub struct ApplicantDashboardPage<'a> {
    pub name: &'a str,
    pub applications: Vec<MyApplicationRow>,
    pub skills: Vec<String>,
    pub resume: Option<ResumeStatus>,
}

pub struct MyApplicationRow {
    pub job_title: String,
    pub status: String,
    pub applied_at: String,
}

pub struct ResumeStatus {
    pub file_name: String,
    pub size_kb: String,
    pub parsed: bool,
    pub uploaded_at: String,
}

#[derive(Template)]
#[template(path = "job_form.html")]
pub struct JobFormPage {}

#[derive(Template)]
#[template(path = "jobs.html")]
pub struct JobListPage<'a> {
    pub jobs: Vec<JobListRow>,
    pub can_apply: bool,
    pub dashboard_path: &'a str,
}

pub struct JobListRow {
    pub id: Uuid,
    pub title: String,
    pub recruiter_name: String,
    pub salary_min: String,
    pub salary_max: String,
    pub status: String,
}

#[derive(Template)]
#[template(path = "apply.html")]
pub struct ApplyPage<'a> {
    pub job_id: Uuid,
    pub title: &'a str,
    pub recruiter_name: &'a str,
    pub salary_min: String,
    pub salary_max: String,
    pub has_resume: bool,
}

#[derive(Template)]
#[template(path = "job_applications.html")]
pub struct JobApplicationsPage<'a> {
    pub job_id: Uuid,
    pub job_title: &'a str,
    pub applications: Vec<ApplicantRow>,
}

pub struct ApplicantRow {
    pub id: Uuid,
    pub applicant_id: Uuid,
    pub name: String,
    pub email: String,
    pub status: String,
    pub applied_at: String,
    pub can_reject: bool,
    pub can_interview: bool,
}

#[derive(Template)]
#[template(path = "resume.html")]
pub struct ResumePage {
    pub resume: Option<ResumeStatus>,
    pub max_size_mb: usize,
}

#[derive(Template)]
#[template(path = "skills.html")]
pub struct SkillsPage {
    pub skills: Vec<String>,
    pub prefill: String,
}

#[derive(Template)]
#[template(path = "search.html")]
pub struct SearchPage<'a> {
    pub query: &'a str,
    pub searched: bool,
    pub results: Vec<CandidateRow>,
}

pub struct CandidateRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub skills: String,
}

#[derive(Template)]
#[template(path = "applicant_profile.html")]
pub struct ApplicantProfilePage<'a> {
    pub applicant_id: Uuid,
    pub name: &'a str,
    pub email: &'a str,
    pub skills: Vec<String>,
    pub has_resume: bool,
    pub parsed_resume: Option<String>,
}

pub fn format_salary(value: Option<&BigDecimal>) -> String {
    value
        .map(|value| value.to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

/// RFC 822 style, e.g. `02 Jan 06 15:04 UTC`.
pub fn format_timestamp(value: NaiveDateTime) -> String {
    value.format("%d %b %y %H:%M UTC").to_string()
}

pub fn format_size_kb(bytes: i64) -> String {
    format!("{:.1}", bytes as f64 / 1024.0)
}
