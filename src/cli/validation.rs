use crate::cli::errors::{CliError, CliResult};
use once_cell::sync::Lazy;
use regex::Regex;

const MAX_NAME_LENGTH: usize = 200;
const MIN_NUMBER_DIGITS: usize = 3;

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9 ().-]{3,32}$").expect("number regex is valid"));

/// Validates contact name
pub fn validate_name(name: &str) -> CliResult<()> {
    if name.trim().is_empty() {
        return Err(CliError::validation("name", "Name cannot be empty"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(CliError::validation(
            "name",
            format!("Name cannot exceed {MAX_NAME_LENGTH} characters"),
        ));
    }
    Ok(())
}

/// Validates contact number format
pub fn validate_number(number: &str) -> CliResult<()> {
    let number = number.trim();
    if number.is_empty() {
        return Err(CliError::validation("number", "Number cannot be empty"));
    }

    if !NUMBER_RE.is_match(number) {
        return Err(CliError::validation(
            "number",
            "Number may only contain digits, spaces, dashes, dots, parentheses and a leading +",
        ));
    }

    let digits = number.chars().filter(|c| c.is_ascii_digit()).count();
    if digits < MIN_NUMBER_DIGITS {
        return Err(CliError::validation(
            "number",
            format!("Number needs at least {MIN_NUMBER_DIGITS} digits"),
        ));
    }

    Ok(())
}

/// Validates contact creation input
pub fn validate_contact(name: &str, number: &str) -> CliResult<()> {
    validate_name(name)?;
    validate_number(number)
}

/// Validates an optional edit
pub fn validate_contact_update(name: &Option<String>, number: &Option<String>) -> CliResult<()> {
    if let Some(name) = name {
        validate_name(name)?;
    }
    if let Some(number) = number {
        validate_number(number)?;
    }
    Ok(())
}

pub fn validate_threshold(threshold: Option<f32>) -> CliResult<()> {
    match threshold {
        Some(t) if !(0.0..=1.0).contains(&t) => Err(CliError::validation(
            "threshold",
            "Threshold must be between 0.0 and 1.0",
        )),
        _ => Ok(()),
    }
}
