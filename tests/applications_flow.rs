mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_to_string, location, TestApp};
use diesel::prelude::*;
use recruitment::mailer::INTERVIEW_SUBJECT;
use recruitment::schema::applications;
use uuid::Uuid;

async fn application_of(app: &TestApp, applicant_id: Uuid, job_id: Uuid) -> Result<(Uuid, String)> {
    app.with_conn(move |conn| {
        Ok(applications::table
            .filter(applications::user_id.eq(applicant_id))
            .filter(applications::job_posting_id.eq(job_id))
            .select((applications::id, applications::status))
            .first(conn)?)
    })
    .await
}

#[tokio::test]
async fn applying_requires_a_parsed_resume() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (recruiter_id, _) = app.user_with_token("rita", "recruiter").await?;
    let (_, applicant) = app.user_with_token("adam", "applicant").await?;
    let job_id = app.insert_job(recruiter_id, "Backend Engineer", "active").await?;

    let response = app.get(&format!("/jobs/{job_id}/apply"), Some(&applicant)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_to_string(response.into_body()).await?;
    assert!(html.contains("/applicant/resume"));

    let response = app
        .post_form(&format!("/jobs/{job_id}/apply"), &[], Some(&applicant))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let html = body_to_string(response.into_body()).await?;
    assert!(html.contains("You must upload a resume before applying for jobs."));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn applicant_applies_once_per_job() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (recruiter_id, _) = app.user_with_token("rita", "recruiter").await?;
    let (applicant_id, applicant) = app.user_with_token("adam", "applicant").await?;
    app.insert_parsed_resume(applicant_id).await?;
    let job_id = app.insert_job(recruiter_id, "Backend Engineer", "active").await?;
    let apply_path = format!("/jobs/{job_id}/apply");

    let response = app.post_form(&apply_path, &[], Some(&applicant)).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/applicant/dashboard"));

    let (_, status) = application_of(&app, applicant_id, job_id).await?;
    assert_eq!(status, "submitted");

    let response = app.post_form(&apply_path, &[], Some(&applicant)).await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app.get(&apply_path, Some(&applicant)).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.get("/applicant/dashboard", Some(&applicant)).await?;
    let html = body_to_string(response.into_body()).await?;
    assert!(html.contains("Backend Engineer"));
    assert!(html.contains("submitted"));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn closed_and_missing_jobs_cannot_be_applied_to() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (recruiter_id, _) = app.user_with_token("rita", "recruiter").await?;
    let (applicant_id, applicant) = app.user_with_token("adam", "applicant").await?;
    app.insert_parsed_resume(applicant_id).await?;
    let closed = app.insert_job(recruiter_id, "Old Role", "closed").await?;

    let response = app
        .post_form(&format!("/jobs/{closed}/apply"), &[], Some(&applicant))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_form(&format!("/jobs/{}/apply", Uuid::new_v4()), &[], Some(&applicant))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.post_form("/jobs/not-a-uuid/apply", &[], Some(&applicant)).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let html = body_to_string(response.into_body()).await?;
    assert!(html.contains("Invalid job ID format."));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn recruiter_rejects_and_requests_interviews() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (recruiter_id, recruiter) = app.user_with_token("rita", "recruiter").await?;
    let (first_id, first) = app.user_with_token("adam", "applicant").await?;
    let (second_id, second) = app.user_with_token("bella", "applicant").await?;
    app.insert_parsed_resume(first_id).await?;
    app.insert_parsed_resume(second_id).await?;
    let job_id = app.insert_job(recruiter_id, "Backend Engineer", "active").await?;

    for token in [&first, &second] {
        let response = app
            .post_form(&format!("/jobs/{job_id}/apply"), &[], Some(token))
            .await?;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    let response = app
        .get(&format!("/recruiter/jobs/{job_id}/applications"), Some(&recruiter))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_to_string(response.into_body()).await?;
    assert!(html.contains("adam@example.com"));
    assert!(html.contains("bella@example.com"));
    assert!(html.contains("Request Interview"));

    let (first_application, _) = application_of(&app, first_id, job_id).await?;
    let (second_application, _) = application_of(&app, second_id, job_id).await?;

    let response = app
        .post_form(
            &format!("/recruiter/jobs/{job_id}/applications/{first_application}/request_interview"),
            &[],
            Some(&recruiter),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        Some(format!("/recruiter/jobs/{job_id}/applications").as_str())
    );
    let (_, status) = application_of(&app, first_id, job_id).await?;
    assert_eq!(status, "accepted");

    let sent = app.mailer().sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "adam@example.com");
    assert_eq!(sent[0].subject, INTERVIEW_SUBJECT);

    let response = app
        .post_form(
            &format!("/recruiter/jobs/{job_id}/applications/{first_application}/request_interview"),
            &[],
            Some(&recruiter),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.mailer().sent().await.len(), 1);

    let response = app
        .post_form(
            &format!("/recruiter/jobs/{job_id}/applications/{second_application}/reject"),
            &[],
            Some(&recruiter),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let (_, status) = application_of(&app, second_id, job_id).await?;
    assert_eq!(status, "rejected");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn application_actions_check_ownership() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (owner_id, _) = app.user_with_token("rita", "recruiter").await?;
    let (_, intruder) = app.user_with_token("oscar", "recruiter").await?;
    let (applicant_id, applicant) = app.user_with_token("adam", "applicant").await?;
    app.insert_parsed_resume(applicant_id).await?;
    let job_id = app.insert_job(owner_id, "Backend Engineer", "active").await?;
    let other_job = app.insert_job(owner_id, "Frontend Engineer", "active").await?;

    app.post_form(&format!("/jobs/{job_id}/apply"), &[], Some(&applicant))
        .await?;
    let (application_id, _) = application_of(&app, applicant_id, job_id).await?;

    let response = app
        .get(&format!("/recruiter/jobs/{job_id}/applications"), Some(&intruder))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post_form(
            &format!("/recruiter/jobs/{job_id}/applications/{application_id}/reject"),
            &[],
            Some(&intruder),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post_form(
            &format!("/recruiter/jobs/{other_job}/applications/{application_id}/reject"),
            &[],
            Some(&intruder),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let html = body_to_string(response.into_body()).await?;
    assert!(html.contains("Job mismatch."));

    let response = app
        .post_form(
            &format!("/recruiter/jobs/{job_id}/applications/{application_id}/reject"),
            &[],
            Some(&applicant),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let (_, status) = application_of(&app, applicant_id, job_id).await?;
    assert_eq!(status, "submitted");

    app.cleanup().await?;
    Ok(())
}

async fn submitted_application(app: &TestApp) -> Result<(Uuid, Uuid, Uuid, String)> {
    let (recruiter_id, recruiter) = app.user_with_token("rita", "recruiter").await?;
    let (applicant_id, applicant) = app.user_with_token("adam", "applicant").await?;
    app.insert_parsed_resume(applicant_id).await?;
    let job_id = app.insert_job(recruiter_id, "Backend Engineer", "active").await?;
    app.post_form(&format!("/jobs/{job_id}/apply"), &[], Some(&applicant))
        .await?;
    let (application_id, _) = application_of(app, applicant_id, job_id).await?;
    Ok((applicant_id, job_id, application_id, recruiter))
}

#[tokio::test]
async fn interview_request_without_mailer_still_accepts() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::without_mailer().await?;
    let (applicant_id, job_id, application_id, recruiter) = submitted_application(&app).await?;

    let response = app
        .post_form(
            &format!("/recruiter/jobs/{job_id}/applications/{application_id}/request_interview"),
            &[],
            Some(&recruiter),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        Some(format!("/recruiter/jobs/{job_id}/applications").as_str())
    );
    let (_, status) = application_of(&app, applicant_id, job_id).await?;
    assert_eq!(status, "accepted");
    assert!(app.mailer().sent().await.is_empty());

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn interview_request_survives_mail_failure() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    app.mailer().set_failing(true);
    let (applicant_id, job_id, application_id, recruiter) = submitted_application(&app).await?;

    let response = app
        .post_form(
            &format!("/recruiter/jobs/{job_id}/applications/{application_id}/request_interview"),
            &[],
            Some(&recruiter),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let (_, status) = application_of(&app, applicant_id, job_id).await?;
    assert_eq!(status, "accepted");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn concurrent_interview_requests_send_one_mail() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (applicant_id, job_id, application_id, recruiter) = submitted_application(&app).await?;
    let path = format!("/recruiter/jobs/{job_id}/applications/{application_id}/request_interview");

    let (first, second) = tokio::join!(
        app.post_form(&path, &[], Some(&recruiter)),
        app.post_form(&path, &[], Some(&recruiter)),
    );
    let mut statuses = vec![first?.status(), second?.status()];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::SEE_OTHER, StatusCode::BAD_REQUEST]);

    assert_eq!(app.mailer().sent().await.len(), 1);
    let (_, status) = application_of(&app, applicant_id, job_id).await?;
    assert_eq!(status, "accepted");

    app.cleanup().await?;
    Ok(())
}
