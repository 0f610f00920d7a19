use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use time::Date;

use super::date_ymd;
use super::repo_types::{ROLE_ADMIN, ROLE_USER};
use crate::error::{AppError, AppResult};

pub const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn is_valid_url(url: &str) -> bool {
    lazy_static! {
        static ref URL_RE: Regex = Regex::new(r"^https?://[^\s/$.?#][^\s]*$").unwrap();
    }
    URL_RE.is_match(url)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn check_len(field: &str, value: &str, max: usize) -> AppResult<()> {
    if value.chars().count() > max {
        return Err(AppError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

fn required(field: &str, value: &str, max: usize) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    check_len(field, value, max)?;
    Ok(value.to_string())
}

fn optional(field: &str, value: Option<String>, max: usize) -> AppResult<Option<String>> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => {
            check_len(field, &v, max)?;
            Ok(Some(v))
        }
        None => Ok(None),
    }
}

fn email(value: &str) -> AppResult<String> {
    let value = normalize_email(value);
    if value.is_empty() {
        return Err(AppError::validation("email is required"));
    }
    check_len("email", &value, 60)?;
    if !is_valid_email(&value) {
        return Err(AppError::validation("email is invalid"));
    }
    Ok(value)
}

fn password(value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(value.to_string())
}

fn role(value: Option<String>) -> AppResult<Option<String>> {
    match value.map(|r| r.trim().to_lowercase()) {
        None => Ok(None),
        Some(r) if r == ROLE_USER || r == ROLE_ADMIN => Ok(Some(r)),
        Some(_) => Err(AppError::validation("role must be one of: user, admin")),
    }
}

/// Profile fields shared by registration and update.
#[derive(Debug, Default, Deserialize)]
pub struct ProfileFields {
    pub about: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub gender: Option<String>,
    pub postcode: Option<i32>,
    #[serde(default, with = "date_ymd::option")]
    pub birthday: Option<Date>,
}

#[derive(Debug)]
pub(crate) struct ValidProfile {
    pub about: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub gender: Option<String>,
    pub postcode: Option<i32>,
    pub birthday: Option<Date>,
}

impl ProfileFields {
    fn validate(self) -> AppResult<ValidProfile> {
        if let Some(pc) = self.postcode {
            if pc < 0 {
                return Err(AppError::validation("postcode must be positive"));
            }
        }
        Ok(ValidProfile {
            about: optional("about", self.about, 1024)?,
            phone_number: optional("phone_number", self.phone_number, 20)?,
            address: optional("address", self.address, 250)?,
            city: optional("city", self.city, 24)?,
            country: optional("country", self.country, 24)?,
            gender: optional("gender", self.gender, 10)?,
            postcode: self.postcode,
            birthday: self.birthday,
        })
    }
}

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[serde(flatten)]
    pub profile: ProfileFields,
}

#[derive(Debug)]
pub(crate) struct ValidRegistration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub profile: ValidProfile,
}

impl RegisterRequest {
    /// Roles are never self-assigned: new accounts are always plain users.
    pub(crate) fn validate(self) -> AppResult<ValidRegistration> {
        Ok(ValidRegistration {
            first_name: required("first_name", &self.first_name, 30)?,
            last_name: required("last_name", &self.last_name, 30)?,
            email: email(&self.email)?,
            password: password(&self.password)?,
            profile: self.profile.validate()?,
        })
    }
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub(crate) fn validate(self) -> AppResult<(String, String)> {
        let email = email(&self.email)?;
        if self.password.trim().is_empty() {
            return Err(AppError::validation("password is required"));
        }
        Ok((email, self.password.trim().to_string()))
    }
}

/// Partial profile update. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    #[serde(flatten)]
    pub profile: ProfileFields,
}

#[derive(Debug)]
pub(crate) struct ValidUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub profile: ValidProfile,
}

impl UpdateUserRequest {
    pub(crate) fn validate(self) -> AppResult<ValidUpdate> {
        Ok(ValidUpdate {
            first_name: self
                .first_name
                .map(|v| required("first_name", &v, 30))
                .transpose()?,
            last_name: self
                .last_name
                .map(|v| required("last_name", &v, 30))
                .transpose()?,
            email: self.email.map(|v| email(&v)).transpose()?,
            password: self.password.map(|v| password(&v)).transpose()?,
            role: role(self.role)?,
            profile: self.profile.validate()?,
        })
    }
}

pub(crate) fn validate_avatar_url(url: &str) -> AppResult<()> {
    check_len("avatar", url, 512)?;
    if !is_valid_url(url) {
        return Err(AppError::validation("avatar must be a URL"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register() -> RegisterRequest {
        RegisterRequest {
            first_name: " Alice ".into(),
            last_name: "Liddell".into(),
            email: " Alice@Example.COM ".into(),
            password: "wonderland".into(),
            profile: ProfileFields::default(),
        }
    }

    #[test]
    fn registration_normalizes() {
        let v = register().validate().unwrap();
        assert_eq!(v.first_name, "Alice");
        assert_eq!(v.email, "alice@example.com");
    }

    #[test]
    fn registration_rejects_bad_fields() {
        let mut r = register();
        r.first_name = "   ".into();
        assert!(matches!(r.validate(), Err(AppError::Validation(_))));

        let mut r = register();
        r.last_name = "x".repeat(31);
        assert!(matches!(r.validate(), Err(AppError::Validation(_))));

        let mut r = register();
        r.password = "12345".into();
        assert!(matches!(r.validate(), Err(AppError::Validation(_))));

        let mut r = register();
        r.email = "not-an-email".into();
        assert!(matches!(r.validate(), Err(AppError::Validation(_))));

        let mut r = register();
        r.profile.city = Some("c".repeat(25));
        assert!(matches!(r.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn registration_parses_profile_from_json() {
        let body = serde_json::json!({
            "first_name": "Bob",
            "last_name": "Builder",
            "email": "bob@example.com",
            "password": "canwefixit",
            "city": "Leeds",
            "birthday": "1990-04-12"
        });
        let req: RegisterRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.profile.city.as_deref(), Some("Leeds"));
        assert_eq!(
            req.profile.birthday,
            Some(time::macros::date!(1990 - 04 - 12))
        );
    }

    #[test]
    fn update_role_must_be_known() {
        let req = UpdateUserRequest {
            role: Some("root".into()),
            ..Default::default()
        };
        assert!(matches!(req.validate(), Err(AppError::Validation(_))));

        let req = UpdateUserRequest {
            role: Some(" Admin".into()),
            ..Default::default()
        };
        assert_eq!(req.validate().unwrap().role.as_deref(), Some("admin"));
    }

    #[test]
    fn avatar_url_checked() {
        assert!(validate_avatar_url("http://minio:9000/avatars/a.png").is_ok());
        assert!(validate_avatar_url("avatars/a.png").is_err());
    }
}
