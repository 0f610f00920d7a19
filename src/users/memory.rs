//! In-memory user directory backing used by the service and router tests.

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::repo::{SortColumn, UserOrder, UserRepo};
use super::repo_types::{NewUser, User, UserChanges, UsersList};
use crate::{
    error::{AppError, AppResult},
    pagination::Pagination,
};

#[derive(Default)]
pub struct MemoryUserRepo {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins a user's creation time so ordering by `created_at` is exact.
    pub async fn set_created_at(&self, id: Uuid, at: OffsetDateTime) {
        if let Some(u) = self.users.lock().await.get_mut(&id) {
            u.created_at = at;
        }
    }

    fn page(p: &Pagination, mut all: Vec<User>) -> UsersList {
        let total = all.len() as i64;
        let users: Vec<User> = all
            .drain(..)
            .skip(p.offset() as usize)
            .take(p.limit() as usize)
            .collect();
        UsersList::new(p, total, users)
    }
}

fn cmp_by(order: UserOrder, a: &User, b: &User) -> std::cmp::Ordering {
    let primary = match order.column {
        SortColumn::Id => a.id.cmp(&b.id),
        SortColumn::FirstName => a.first_name.cmp(&b.first_name),
        SortColumn::LastName => a.last_name.cmp(&b.last_name),
        SortColumn::Email => a.email.cmp(&b.email),
        SortColumn::CreatedAt => a.created_at.cmp(&b.created_at),
        SortColumn::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortColumn::LoginDate => a.login_date.cmp(&b.login_date),
    };
    let primary = if order.descending {
        primary.reverse()
    } else {
        primary
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn create(&self, u: NewUser) -> AppResult<User> {
        let mut map = self.users.lock().await;
        if map.values().any(|x| x.email == u.email) {
            return Err(AppError::Conflict("Email already registered".into()));
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            first_name: u.first_name,
            last_name: u.last_name,
            email: u.email,
            password_hash: u.password_hash,
            role: u.role,
            about: u.about,
            avatar: None,
            phone_number: u.phone_number,
            address: u.address,
            city: u.city,
            country: u.country,
            gender: u.gender,
            postcode: u.postcode,
            birthday: u.birthday,
            created_at: now,
            updated_at: now,
            login_date: None,
        };
        map.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<User> {
        self.users
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(AppError::NotFound("user"))
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn update(&self, id: Uuid, c: UserChanges) -> AppResult<User> {
        let mut map = self.users.lock().await;
        if let Some(email) = &c.email {
            if map.values().any(|x| x.id != id && &x.email == email) {
                return Err(AppError::Conflict("Email already registered".into()));
            }
        }
        let u = map.get_mut(&id).ok_or(AppError::NotFound("user"))?;
        macro_rules! set {
            ($($f:ident),*) => { $( if let Some(v) = c.$f { u.$f = v; } )* };
        }
        macro_rules! set_opt {
            ($($f:ident),*) => { $( if c.$f.is_some() { u.$f = c.$f; } )* };
        }
        set!(first_name, last_name, email, password_hash, role);
        set_opt!(about, phone_number, address, city, country, gender, postcode, birthday);
        u.updated_at = OffsetDateTime::now_utc();
        Ok(u.clone())
    }

    async fn update_avatar(&self, id: Uuid, avatar: &str) -> AppResult<User> {
        let mut map = self.users.lock().await;
        let u = map.get_mut(&id).ok_or(AppError::NotFound("user"))?;
        u.avatar = Some(avatar.to_string());
        u.updated_at = OffsetDateTime::now_utc();
        Ok(u.clone())
    }

    async fn touch_login(&self, id: Uuid) -> AppResult<()> {
        if let Some(u) = self.users.lock().await.get_mut(&id) {
            u.login_date = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.users
            .lock()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(AppError::NotFound("user"))
    }

    async fn find_by_name(&self, name: &str, page: &Pagination) -> AppResult<UsersList> {
        let needle = name.trim().to_lowercase();
        let mut hits: Vec<User> = self
            .users
            .lock()
            .await
            .values()
            .filter(|u| {
                let full = format!("{} {}", u.first_name, u.last_name).to_lowercase();
                u.first_name.to_lowercase().contains(&needle)
                    || u.last_name.to_lowercase().contains(&needle)
                    || full.contains(&needle)
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| cmp_by(UserOrder::default(), a, b));
        Ok(Self::page(page, hits))
    }

    async fn list(&self, page: &Pagination, order: UserOrder) -> AppResult<UsersList> {
        let mut all: Vec<User> = self.users.lock().await.values().cloned().collect();
        all.sort_by(|a, b| cmp_by(order, a, b));
        Ok(Self::page(page, all))
    }
}
