//! Form validation
//!
//! Field constraints checked before any remote call. Each failure names
//! the offending field so it can be shown next to the input.

use crate::data::{Credentials, NewPost, NewUser, ProfileForm, UpdatePost};
use crate::error::AppError;

const MIN_NAME_CHARS: usize = 2;
const MIN_PASSWORD_CHARS: usize = 8;
const CAPTION_CHARS: (usize, usize) = (5, 2200);
const LOCATION_CHARS: (usize, usize) = (1, 1000);

fn min_chars(field: &'static str, value: &str, min: usize) -> Result<(), AppError> {
    if value.chars().count() < min {
        return Err(AppError::validation(
            field,
            format!("must be at least {min} characters"),
        ));
    }
    Ok(())
}

fn char_range(field: &'static str, value: &str, (min, max): (usize, usize)) -> Result<(), AppError> {
    min_chars(field, value, min)?;
    if value.chars().count() > max {
        return Err(AppError::validation(
            field,
            format!("must be at most {max} characters"),
        ));
    }
    Ok(())
}

/// Structural email check: `local@domain.tld`, no whitespace
fn email(value: &str) -> Result<(), AppError> {
    let invalid = || AppError::validation("email", "must be a valid email address");

    if value.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = value.split_once('@').ok_or_else(invalid)?;
    let labels_ok = domain.split('.').all(|label| !label.is_empty());
    if local.is_empty() || domain.contains('@') || !domain.contains('.') || !labels_ok {
        return Err(invalid());
    }
    Ok(())
}

pub fn validate_sign_up(form: &NewUser) -> Result<(), AppError> {
    min_chars("name", &form.name, MIN_NAME_CHARS)?;
    min_chars("username", &form.username, MIN_NAME_CHARS)?;
    email(&form.email)?;
    min_chars("password", &form.password, MIN_PASSWORD_CHARS)
}

pub fn validate_sign_in(form: &Credentials) -> Result<(), AppError> {
    email(&form.email)?;
    min_chars("password", &form.password, MIN_PASSWORD_CHARS)
}

/// Caption and location limits; creation also needs a non-empty file
pub fn validate_new_post(form: &NewPost) -> Result<(), AppError> {
    char_range("caption", &form.caption, CAPTION_CHARS)?;
    char_range("location", &form.location, LOCATION_CHARS)?;
    if form.file.bytes.is_empty() {
        return Err(AppError::validation("file", "a media file is required"));
    }
    Ok(())
}

pub fn validate_post_update(form: &UpdatePost) -> Result<(), AppError> {
    char_range("caption", &form.caption, CAPTION_CHARS)?;
    char_range("location", &form.location, LOCATION_CHARS)
}

pub fn validate_profile(form: &ProfileForm) -> Result<(), AppError> {
    min_chars("name", &form.name, MIN_NAME_CHARS)?;
    min_chars("username", &form.username, MIN_NAME_CHARS)?;
    email(&form.email)
}
