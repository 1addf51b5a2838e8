use std::collections::HashMap;

use askama::Template;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, Redirect},
    Form, Json,
};
use diesel::{
    dsl::{count_distinct, count_star},
    prelude::*,
    sql_types::Text,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{require_role, AuthenticatedUser, PageUser},
    error::{AppError, AppResult, PageError, PageResult},
    models::{NewSkill, NewUserSkill, ResumeSummary, Role, Skill, User},
    routes::parse_id,
    schema::{resumes, skills, user_skills, users},
    state::AppState,
    validation::{normalize_skill_name, parse_skill_list},
    views::{ApplicantProfilePage, CandidateRow, SearchPage, SkillsPage},
};

sql_function!(fn lower(x: Text) -> Text);

pub fn load_skill_names(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<Vec<String>> {
    user_skills::table
        .inner_join(skills::table)
        .filter(user_skills::user_id.eq(user_id))
        .order(skills::name.asc())
        .select(skills::name)
        .load(conn)
}

/// Returns the id of the skill named `name` (case-insensitive), creating it if needed.
fn find_or_create_skill(conn: &mut PgConnection, name: &str) -> QueryResult<Uuid> {
    let lowered = name.to_lowercase();
    diesel::insert_into(skills::table)
        .values(&NewSkill {
            id: Uuid::new_v4(),
            name: name.to_string(),
        })
        .on_conflict_do_nothing()
        .execute(conn)?;

    skills::table
        .filter(lower(skills::name).eq(&lowered))
        .select(skills::id)
        .first(conn)
}

pub async fn skills_page(
    State(state): State<AppState>,
    PageUser(user): PageUser,
) -> PageResult<Html<String>> {
    require_role(&user, Role::Applicant, "only applicants can manage skills")?;

    let mut conn = state.db()?;
    let skills = load_skill_names(&mut conn, user.id)?;
    let page = SkillsPage {
        prefill: skills.join(", "),
        skills,
    };
    Ok(Html(page.render()?))
}

#[derive(Deserialize)]
pub struct SkillsForm {
    #[serde(default)]
    pub skills: String,
}

pub async fn update_skills(
    State(state): State<AppState>,
    PageUser(user): PageUser,
    Form(form): Form<SkillsForm>,
) -> PageResult<Redirect> {
    require_role(&user, Role::Applicant, "only applicants can manage skills")?;
    let names = parse_skill_list(&form.skills).map_err(PageError::bad_request)?;

    let mut conn = state.db()?;
    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        let mut skill_ids = Vec::with_capacity(names.len());
        for name in &names {
            skill_ids.push(find_or_create_skill(conn, name)?);
        }

        diesel::delete(user_skills::table.filter(user_skills::user_id.eq(user.id)))
            .execute(conn)?;

        let rows: Vec<NewUserSkill> = skill_ids
            .into_iter()
            .map(|skill_id| NewUserSkill {
                user_id: user.id,
                skill_id,
            })
            .collect();
        diesel::insert_into(user_skills::table)
            .values(&rows)
            .on_conflict_do_nothing()
            .execute(conn)?;
        Ok(())
    })?;

    tracing::info!(user_id = %user.id, count = names.len(), "applicant skills replaced");
    Ok(Redirect::to("/applicant/dashboard"))
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub skills: Option<String>,
}

pub async fn search_applicants(
    State(state): State<AppState>,
    PageUser(user): PageUser,
    Query(params): Query<SearchParams>,
) -> PageResult<Html<String>> {
    require_role(&user, Role::Recruiter, "only recruiters can search applicants")?;

    let query = params.skills.unwrap_or_default();
    let wanted = parse_skill_list(&query).map_err(PageError::bad_request)?;
    if wanted.is_empty() {
        let page = SearchPage {
            query: query.trim(),
            searched: false,
            results: Vec::new(),
        };
        return Ok(Html(page.render()?));
    }

    let lowered: Vec<String> = wanted.iter().map(|name| name.to_lowercase()).collect();
    let mut conn = state.db()?;

    let matches = users::table
        .inner_join(user_skills::table.inner_join(skills::table))
        .filter(users::role.eq(Role::Applicant.as_str()))
        .filter(lower(skills::name).eq_any(&lowered))
        .group_by(users::id)
        .having(count_distinct(skills::id).eq(lowered.len() as i64))
        .order(users::name.asc())
        .select((users::id, users::name, users::email))
        .load::<(Uuid, String, String)>(&mut conn)?;

    let ids: Vec<Uuid> = matches.iter().map(|(id, _, _)| *id).collect();
    let mut skills_by_user: HashMap<Uuid, Vec<String>> = HashMap::new();
    for (user_id, name) in user_skills::table
        .inner_join(skills::table)
        .filter(user_skills::user_id.eq_any(&ids))
        .order(skills::name.asc())
        .select((user_skills::user_id, skills::name))
        .load::<(Uuid, String)>(&mut conn)?
    {
        skills_by_user.entry(user_id).or_default().push(name);
    }

    let results = matches
        .into_iter()
        .map(|(id, name, email)| CandidateRow {
            skills: skills_by_user
                .remove(&id)
                .unwrap_or_default()
                .join(", "),
            id,
            name,
            email,
        })
        .collect();

    tracing::debug!(recruiter_id = %user.id, skills = ?wanted, "applicant search");

    let page = SearchPage {
        query: query.trim(),
        searched: true,
        results,
    };
    Ok(Html(page.render()?))
}

pub async fn applicant_profile(
    State(state): State<AppState>,
    PageUser(user): PageUser,
    Path(applicant_id): Path<String>,
) -> PageResult<Html<String>> {
    require_role(&user, Role::Recruiter, "only recruiters can view applicant profiles")?;
    let applicant_id = parse_id(&applicant_id, "applicant")?;

    let mut conn = state.db()?;
    let applicant = users::table
        .find(applicant_id)
        .first::<User>(&mut conn)
        .optional()?
        .ok_or_else(|| PageError::not_found("Applicant not found."))?;
    if !applicant.has_role(Role::Applicant) {
        return Err(PageError::forbidden("Forbidden: user is not an applicant"));
    }

    let skills = load_skill_names(&mut conn, applicant.id)?;
    let resume = resumes::table
        .find(applicant.id)
        .select(ResumeSummary::as_select())
        .first::<ResumeSummary>(&mut conn)
        .optional()?;
    let parsed_resume = match resume.as_ref().and_then(|resume| resume.parsed.as_ref()) {
        Some(parsed) => Some(serde_json::to_string_pretty(parsed)?),
        None => None,
    };

    let page = ApplicantProfilePage {
        applicant_id: applicant.id,
        name: &applicant.name,
        email: &applicant.email,
        skills,
        has_resume: resume.is_some(),
        parsed_resume,
    };
    Ok(Html(page.render()?))
}

#[derive(Deserialize)]
pub struct CreateSkillRequest {
    pub name: String,
}

#[derive(Serialize)]
pub struct SkillCatalogEntry {
    pub id: Uuid,
    pub name: String,
    pub usage_count: i64,
}

pub async fn list_skills(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> AppResult<Json<Vec<SkillCatalogEntry>>> {
    let mut conn = state.db()?;

    let skill_list: Vec<Skill> = skills::table.order(skills::name.asc()).load(&mut conn)?;

    let usage_rows: Vec<(Uuid, i64)> = user_skills::table
        .group_by(user_skills::skill_id)
        .select((user_skills::skill_id, count_star()))
        .load(&mut conn)?;

    let usage_map: HashMap<Uuid, i64> = usage_rows.into_iter().collect();

    let response = skill_list
        .into_iter()
        .map(|skill| SkillCatalogEntry {
            usage_count: *usage_map.get(&skill.id).unwrap_or(&0),
            id: skill.id,
            name: skill.name,
        })
        .collect();

    Ok(Json(response))
}

pub async fn create_skill(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Json(payload): Json<CreateSkillRequest>,
) -> AppResult<Json<SkillCatalogEntry>> {
    let name = normalize_skill_name(&payload.name).map_err(AppError::bad_request)?;

    let mut conn = state.db()?;
    let duplicate = skills::table
        .filter(lower(skills::name).eq(name.to_lowercase()))
        .select(skills::id)
        .first::<Uuid>(&mut conn)
        .optional()?;
    if duplicate.is_some() {
        return Err(AppError::bad_request("skill already exists"));
    }

    let new_skill = NewSkill {
        id: Uuid::new_v4(),
        name,
    };

    match diesel::insert_into(skills::table)
        .values(&new_skill)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )) => {
            return Err(AppError::bad_request("skill already exists"));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let skill: Skill = skills::table.find(new_skill.id).first(&mut conn)?;
    tracing::info!(skill_id = %skill.id, "skill created");
    Ok(Json(SkillCatalogEntry {
        id: skill.id,
        name: skill.name,
        usage_count: 0,
    }))
}

pub async fn delete_skill(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(skill_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if !user.has_role(Role::Recruiter) {
        return Err(AppError::forbidden("only recruiters can delete skills"));
    }

    let mut conn = state.db()?;
    let skill = skills::table
        .find(skill_id)
        .first::<Skill>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_with("skill not found"))?;

    let usage_count: i64 = user_skills::table
        .filter(user_skills::skill_id.eq(skill.id))
        .select(count_star())
        .first(&mut conn)?;
    if usage_count > 0 {
        return Err(AppError::bad_request(format!(
            "skill is still listed by {usage_count} user(s)"
        )));
    }

    diesel::delete(skills::table.find(skill.id)).execute(&mut conn)?;
    tracing::info!(skill_id = %skill.id, "skill deleted");
    Ok(StatusCode::NO_CONTENT)
}
