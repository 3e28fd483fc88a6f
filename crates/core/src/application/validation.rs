// Input validation for user-supplied identity fields

use crate::error::{AppError, Result};

/// Longest accepted name / contact
pub const MAX_FIELD_LEN: usize = 128;

/// Trim and check a display name
pub fn validate_display_name(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} cannot be empty", field)));
    }
    if trimmed.chars().count() > MAX_FIELD_LEN {
        return Err(AppError::Validation(format!(
            "{} too long (max {} characters)",
            field, MAX_FIELD_LEN
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(AppError::Validation(format!(
            "{} contains control characters",
            field
        )));
    }
    Ok(trimmed.to_string())
}

/// Trim, lowercase and check an email address (`local@domain.tld`)
pub fn normalize_email(value: &str) -> Result<String> {
    let email = validate_display_name("email", value)?.to_lowercase();

    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if !valid {
        return Err(AppError::Validation(format!(
            "invalid email address: {}",
            value.trim()
        )));
    }
    Ok(email)
}
