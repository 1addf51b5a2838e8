use askama::Template;
use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
        HeaderValue, StatusCode,
    },
    response::{Html, Redirect, Response},
};
use chrono::Utc;
use diesel::{prelude::*, upsert::excluded};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    auth::{require_role, PageUser},
    error::{AppError, PageError, PageResult},
    models::{NewResume, ResumeSummary, Role},
    routes::parse_id,
    schema::{resumes, users},
    state::AppState,
    views::{format_size_kb, format_timestamp, ResumePage, ResumeStatus},
};

pub const MAX_RESUME_BYTES: usize = 5 * 1024 * 1024;
const RESUME_FIELD: &str = "resumeFile";
const PDF_MIME: &str = "application/pdf";
const FILE_NAME_MAX_LEN: usize = 255;

pub fn resume_status(summary: &ResumeSummary) -> ResumeStatus {
    ResumeStatus {
        file_name: summary.file_name.clone(),
        size_kb: format_size_kb(summary.size_bytes),
        parsed: summary.parsed.is_some(),
        uploaded_at: format_timestamp(summary.uploaded_at),
    }
}

fn inline_content_disposition(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            ch if ch.is_control() => '_',
            _ => ch,
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    format!(
        "inline; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    )
}

fn sanitize_file_name(raw: Option<&str>) -> String {
    let base = raw
        .and_then(|name| name.rsplit(['/', '\\']).next())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or("resume.pdf");
    base.chars().take(FILE_NAME_MAX_LEN).collect()
}

fn is_pdf_content_type(value: Option<&str>) -> bool {
    value
        .and_then(|mime| mime.split(';').next())
        .map(|essence| essence.trim().eq_ignore_ascii_case(PDF_MIME))
        .unwrap_or(false)
}

pub async fn resume_page(
    State(state): State<AppState>,
    PageUser(user): PageUser,
) -> PageResult<Html<String>> {
    require_role(&user, Role::Applicant, "only applicants can manage resumes")?;

    let mut conn = state.db()?;
    let resume = resumes::table
        .find(user.id)
        .select(ResumeSummary::as_select())
        .first::<ResumeSummary>(&mut conn)
        .optional()?
        .map(|summary| resume_status(&summary));

    let page = ResumePage {
        resume,
        max_size_mb: MAX_RESUME_BYTES / (1024 * 1024),
    };
    Ok(Html(page.render()?))
}

struct UploadedPdf {
    file_name: String,
    bytes: Vec<u8>,
}

async fn read_resume_field(multipart: &mut Multipart) -> PageResult<UploadedPdf> {
    while let Some(mut field) = multipart.next_field().await.map_err(|err| {
        tracing::warn!(error = %err, "invalid multipart data");
        PageError::bad_request(format!("Invalid upload: {err}"))
    })? {
        if field.name() != Some(RESUME_FIELD) {
            continue;
        }

        if !is_pdf_content_type(field.content_type()) {
            return Err(PageError::bad_request("Only PDF resumes are accepted."));
        }
        let file_name = sanitize_file_name(field.file_name());

        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(|err| {
            tracing::warn!(error = %err, "failed to read resume upload");
            PageError::bad_request(format!("Failed to read the uploaded file: {err}"))
        })? {
            if bytes.len() + chunk.len() > MAX_RESUME_BYTES {
                return Err(PageError::bad_request(
                    "Resume file is too large (maximum 5 MB).",
                ));
            }
            bytes.extend_from_slice(&chunk);
        }

        if bytes.is_empty() {
            return Err(PageError::bad_request("The uploaded file is empty."));
        }
        return Ok(UploadedPdf { file_name, bytes });
    }

    Err(PageError::bad_request(
        "No resume file was uploaded (field 'resumeFile').",
    ))
}

pub async fn upload_resume(
    State(state): State<AppState>,
    PageUser(user): PageUser,
    mut multipart: Multipart,
) -> PageResult<Redirect> {
    require_role(&user, Role::Applicant, "only applicants can upload resumes")?;

    let upload = read_resume_field(&mut multipart).await?;
    let checksum = hex::encode(Sha256::digest(&upload.bytes));
    let now = Utc::now().naive_utc();

    let reused = {
        let mut conn = state.db()?;
        let reused: Option<Value> = resumes::table
            .filter(resumes::checksum.eq(&checksum))
            .filter(resumes::parsed.is_not_null())
            .select(resumes::parsed)
            .first::<Option<Value>>(&mut conn)
            .optional()?
            .flatten();

        let new_resume = NewResume {
            user_id: user.id,
            file_name: upload.file_name.clone(),
            pdf: upload.bytes.clone(),
            size_bytes: upload.bytes.len() as i64,
            checksum: checksum.clone(),
            parsed: reused.clone(),
            uploaded_at: now,
            parsed_at: reused.as_ref().map(|_| now),
        };

        diesel::insert_into(resumes::table)
            .values(&new_resume)
            .on_conflict(resumes::user_id)
            .do_update()
            .set((
                resumes::file_name.eq(excluded(resumes::file_name)),
                resumes::pdf.eq(excluded(resumes::pdf)),
                resumes::size_bytes.eq(excluded(resumes::size_bytes)),
                resumes::checksum.eq(excluded(resumes::checksum)),
                resumes::parsed.eq(excluded(resumes::parsed)),
                resumes::uploaded_at.eq(excluded(resumes::uploaded_at)),
                resumes::parsed_at.eq(excluded(resumes::parsed_at)),
            ))
            .execute(&mut conn)?;
        reused
    };

    tracing::info!(
        user_id = %user.id,
        size_bytes = upload.bytes.len(),
        checksum = %checksum,
        reused_parse = reused.is_some(),
        "resume stored"
    );

    if reused.is_some() {
        return Ok(Redirect::to("/applicant/dashboard"));
    }

    let parser = state.resume_parser.as_ref().ok_or_else(|| {
        tracing::warn!(user_id = %user.id, "resume parsing not configured");
        PageError(AppError::bad_gateway(
            "Your resume was stored but could not be parsed: resume parsing is not configured.",
        ))
    })?;

    let parsed = parser.parse_pdf(&upload.bytes).await.map_err(|err| {
        tracing::error!(user_id = %user.id, error = %err, "resume parsing failed");
        PageError(AppError::bad_gateway(
            "Your resume was stored but could not be parsed. Please try again later.",
        ))
    })?;

    let mut conn = state.db()?;
    diesel::update(
        resumes::table
            .find(user.id)
            .filter(resumes::checksum.eq(&checksum)),
    )
    .set((
        resumes::parsed.eq(Some(parsed)),
        resumes::parsed_at.eq(Some(Utc::now().naive_utc())),
    ))
    .execute(&mut conn)?;

    tracing::info!(user_id = %user.id, "resume parsed");
    Ok(Redirect::to("/applicant/dashboard"))
}

fn pdf_response(file_name: &str, pdf: Vec<u8>) -> PageResult<Response> {
    let disposition =
        HeaderValue::from_str(&inline_content_disposition(file_name)).map_err(AppError::internal)?;
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, PDF_MIME)
        .header(CONTENT_LENGTH, pdf.len())
        .header(CONTENT_DISPOSITION, disposition)
        .body(Body::from(pdf))
        .map_err(|err| PageError(AppError::internal(err)))
}

fn load_pdf(conn: &mut PgConnection, user_id: Uuid) -> PageResult<(String, Vec<u8>)> {
    resumes::table
        .find(user_id)
        .select((resumes::file_name, resumes::pdf))
        .first::<(String, Vec<u8>)>(conn)
        .optional()?
        .ok_or_else(|| PageError::not_found("No resume uploaded."))
}

pub async fn download_own_resume(
    State(state): State<AppState>,
    PageUser(user): PageUser,
) -> PageResult<Response> {
    require_role(&user, Role::Applicant, "only applicants have a resume")?;

    let mut conn = state.db()?;
    let (file_name, pdf) = load_pdf(&mut conn, user.id)?;
    pdf_response(&file_name, pdf)
}

pub async fn download_applicant_resume(
    State(state): State<AppState>,
    PageUser(user): PageUser,
    Path(applicant_id): Path<String>,
) -> PageResult<Response> {
    require_role(&user, Role::Recruiter, "only recruiters can view applicant resumes")?;
    let applicant_id = parse_id(&applicant_id, "applicant")?;

    let mut conn = state.db()?;
    let role: String = users::table
        .find(applicant_id)
        .select(users::role)
        .first::<String>(&mut conn)
        .optional()?
        .ok_or_else(|| PageError::not_found("Applicant not found."))?;
    if role != Role::Applicant.as_str() {
        return Err(PageError::forbidden("Forbidden: user is not an applicant"));
    }

    let (file_name, pdf) = load_pdf(&mut conn, applicant_id)?;
    tracing::info!(applicant_id = %applicant_id, recruiter_id = %user.id, "resume downloaded");
    pdf_response(&file_name, pdf)
}
