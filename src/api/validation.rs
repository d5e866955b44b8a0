//! Input validation for API requests.
//!
//! Each `validate_*` function returns the operator-facing message on failure.
//! Collect several of them with `ValidationErrorBuilder` from the `error`
//! module.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Deliberately loose: one @, no whitespace, a dot in the domain
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^@\s]+@[^@\s]+\.[^@\s]+$"
    ).unwrap();

    /// Badge numbers: letters, digits and dashes
    static ref EMPLOYEE_NUMBER_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9][A-Za-z0-9-]*$"
    ).unwrap();
}

const MAX_NAME_LENGTH: usize = 200;
const MAX_EMPLOYEE_NUMBER_LENGTH: usize = 64;
const MAX_NOTE_LENGTH: usize = 10_000;
const MIN_PASSWORD_LENGTH: usize = 8;

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email address".to_string());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        ));
    }
    Ok(())
}

/// Company and employee display names
pub fn validate_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Name is required".to_string());
    }
    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(format!(
            "Name is too long (max {} characters)",
            MAX_NAME_LENGTH
        ));
    }
    Ok(())
}

pub fn validate_employee_number(number: &str) -> Result<(), String> {
    if number.is_empty() {
        return Err("Employee number is required".to_string());
    }
    if number.len() > MAX_EMPLOYEE_NUMBER_LENGTH {
        return Err(format!(
            "Employee number is too long (max {} characters)",
            MAX_EMPLOYEE_NUMBER_LENGTH
        ));
    }
    if !EMPLOYEE_NUMBER_REGEX.is_match(number) {
        return Err(
            "Employee number may only contain letters, digits and dashes".to_string(),
        );
    }
    Ok(())
}

pub fn validate_note_text(text: &str) -> Result<(), String> {
    if text.trim().is_empty() {
        return Err("Note text is required".to_string());
    }
    if text.chars().count() > MAX_NOTE_LENGTH {
        return Err(format!(
            "Note is too long (max {} characters)",
            MAX_NOTE_LENGTH
        ));
    }
    Ok(())
}
