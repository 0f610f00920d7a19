use serde::Serialize;
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::date_ymd;

pub const ROLE_USER: &str = "user";
pub const ROLE_ADMIN: &str = "admin";

/// User record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 PHC string, never serialized
    pub role: String,
    pub about: Option<String>,
    pub avatar: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub gender: Option<String>,
    pub postcode: Option<i32>,
    #[serde(with = "date_ymd::option")]
    pub birthday: Option<Date>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub login_date: Option<OffsetDateTime>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

/// Validated, hashed user ready to be inserted.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub about: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub gender: Option<String>,
    pub postcode: Option<i32>,
    pub birthday: Option<Date>,
}

/// Validated partial update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<String>,
    pub about: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub gender: Option<String>,
    pub postcode: Option<i32>,
    pub birthday: Option<Date>,
}

#[derive(Debug, Serialize)]
pub struct UsersList {
    pub total_count: i64,
    pub total_pages: i64,
    pub page: i64,
    pub size: i64,
    pub has_more: bool,
    pub users: Vec<User>,
}

impl UsersList {
    pub fn new(p: &crate::pagination::Pagination, total_count: i64, users: Vec<User>) -> Self {
        Self {
            total_count,
            total_pages: p.total_pages(total_count),
            page: p.page,
            size: p.size,
            has_more: p.has_more(total_count),
            users,
        }
    }
}
