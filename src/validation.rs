use std::borrow::Cow;
use std::collections::HashSet;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use validator::{ValidateEmail, ValidationError, ValidationErrors};

pub const USERNAME_MIN_LEN: usize = 4;
pub const SKILL_NAME_MAX_LEN: usize = 100;
pub const MAX_SKILLS_PER_USER: usize = 50;

// NUMERIC(12,2)
const SALARY_CEILING: i64 = 10_000_000_000;

pub fn validate_username(value: &str) -> Result<(), ValidationError> {
    if value.chars().count() < USERNAME_MIN_LEN {
        return Err(error_with_message(
            "username_length",
            "Username must be at least 4 characters long.",
        ));
    }
    if !value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    {
        return Err(error_with_message(
            "username_charset",
            "Username may only contain letters, digits and underscores.",
        ));
    }
    Ok(())
}

pub fn is_valid_email(value: &str) -> bool {
    value.validate_email()
}

fn error_with_message(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

/// First message per field, ordered by field name.
pub fn validation_message(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    fields
        .into_iter()
        .filter_map(|(field, errors)| {
            errors.first().map(|error| match &error.message {
                Some(message) => message.to_string(),
                None => format!("{field} is invalid."),
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses an optional salary field. Blank input means "not given".
pub fn parse_salary(label: &str, raw: &str) -> Result<Option<BigDecimal>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value =
        BigDecimal::from_str(trimmed).map_err(|_| format!("Invalid {label} format."))?;
    if value < BigDecimal::from(0) {
        return Err(format!("{label} cannot be negative."));
    }
    let (_, scale) = value.normalized().as_bigint_and_exponent();
    if scale > 2 {
        return Err(format!("{label} can have at most two decimal places."));
    }
    if value >= BigDecimal::from(SALARY_CEILING) {
        return Err(format!("{label} is too large."));
    }

    Ok(Some(value.with_scale(2)))
}

pub fn check_salary_range(
    min: Option<&BigDecimal>,
    max: Option<&BigDecimal>,
) -> Result<(), &'static str> {
    match (min, max) {
        (Some(min), Some(max)) if min > max => {
            Err("Minimum Salary cannot be greater than Maximum Salary.")
        }
        _ => Ok(()),
    }
}

pub fn normalize_skill_name(raw: &str) -> Result<String, String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err("Skill name must not be empty.".into());
    }
    if name.chars().count() > SKILL_NAME_MAX_LEN {
        return Err(format!(
            "Skill name '{}...' exceeds {SKILL_NAME_MAX_LEN} characters.",
            name.chars().take(20).collect::<String>()
        ));
    }
    Ok(name.to_string())
}

/// Splits a comma or newline separated list, keeping the first spelling of
/// case-insensitive duplicates.
pub fn parse_skill_list(raw: &str) -> Result<Vec<String>, String> {
    let mut seen = HashSet::new();
    let mut skills = Vec::new();

    for part in raw.split([',', '\n']) {
        if part.trim().is_empty() {
            continue;
        }
        let name = normalize_skill_name(part)?;
        if seen.insert(name.to_lowercase()) {
            skills.push(name);
        }
    }

    if skills.len() > MAX_SKILLS_PER_USER {
        return Err(format!(
            "At most {MAX_SKILLS_PER_USER} skills can be listed."
        ));
    }
    Ok(skills)
}
