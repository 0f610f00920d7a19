use time::Date;

pub mod dto;
#[cfg(test)]
pub mod memory;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod service;

time::serde::format_description!(date_ymd, Date, "[year]-[month]-[day]");

pub use repo::{PgUserRepo, UserOrder, UserRepo};
pub use repo_types::{User, UsersList};
pub use service::UserDirectory;
