use std::sync::Arc;

use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{
    dto::{validate_avatar_url, RegisterRequest, UpdateUserRequest},
    password::hash_password_async,
    repo::{UserOrder, UserRepo},
    repo_types::{NewUser, User, UserChanges, UsersList, ROLE_ADMIN, ROLE_USER},
};
use crate::{ctx::RequestCtx, error::AppResult, pagination::Pagination};

/// Owns user records: validation, password hashing and persistence.
#[derive(Clone)]
pub struct UserDirectory {
    repo: Arc<dyn UserRepo>,
    admin_email: Option<String>,
}

impl UserDirectory {
    pub fn new(repo: Arc<dyn UserRepo>) -> Self {
        Self {
            repo,
            admin_email: None,
        }
    }

    /// The account with this email is created as an admin and promoted by
    /// [`UserDirectory::promote_admin`] if it already exists.
    pub fn with_admin_email(mut self, email: Option<String>) -> Self {
        self.admin_email = email.map(|e| e.trim().to_lowercase());
        self
    }

    fn role_for(&self, email: &str) -> &'static str {
        match self.admin_email.as_deref() {
            Some(admin) if admin == email => ROLE_ADMIN,
            _ => ROLE_USER,
        }
    }

    #[instrument(skip_all)]
    pub async fn create(&self, ctx: &RequestCtx, req: RegisterRequest) -> AppResult<User> {
        let v = req.validate()?;
        let password_hash = ctx.bound(hash_password_async(v.password)).await?;
        let role = self.role_for(&v.email).to_string();
        let new = NewUser {
            first_name: v.first_name,
            last_name: v.last_name,
            email: v.email,
            password_hash,
            role,
            about: v.profile.about,
            phone_number: v.profile.phone_number,
            address: v.profile.address,
            city: v.profile.city,
            country: v.profile.country,
            gender: v.profile.gender,
            postcode: v.profile.postcode,
            birthday: v.profile.birthday,
        };
        let user = ctx.bound(self.repo.create(new)).await?;
        debug!(user_id = %user.id, "user created");
        Ok(user)
    }

    pub async fn get_by_id(&self, ctx: &RequestCtx, id: Uuid) -> AppResult<User> {
        ctx.bound(self.repo.get_by_id(id)).await
    }

    pub async fn find_by_email(&self, ctx: &RequestCtx, email: &str) -> AppResult<Option<User>> {
        ctx.bound(self.repo.find_by_email(email)).await
    }

    #[instrument(skip(self, ctx, req))]
    pub async fn update(
        &self,
        ctx: &RequestCtx,
        id: Uuid,
        req: UpdateUserRequest,
    ) -> AppResult<User> {
        let v = req.validate()?;
        let password_hash = match v.password {
            Some(p) => Some(ctx.bound(hash_password_async(p)).await?),
            None => None,
        };
        let changes = UserChanges {
            first_name: v.first_name,
            last_name: v.last_name,
            email: v.email,
            password_hash,
            role: v.role,
            about: v.profile.about,
            phone_number: v.profile.phone_number,
            address: v.profile.address,
            city: v.profile.city,
            country: v.profile.country,
            gender: v.profile.gender,
            postcode: v.profile.postcode,
            birthday: v.profile.birthday,
        };
        ctx.bound(self.repo.update(id, changes)).await
    }

    /// Grants the admin role to the configured admin account, if it exists.
    #[instrument(skip_all)]
    pub async fn promote_admin(&self, ctx: &RequestCtx) -> AppResult<Option<User>> {
        let Some(email) = self.admin_email.as_deref() else {
            return Ok(None);
        };
        let Some(user) = self.find_by_email(ctx, email).await? else {
            debug!("admin account not registered yet");
            return Ok(None);
        };
        if user.is_admin() {
            return Ok(Some(user));
        }
        let changes = UserChanges {
            role: Some(ROLE_ADMIN.to_string()),
            ..Default::default()
        };
        let user = ctx.bound(self.repo.update(user.id, changes)).await?;
        info!(user_id = %user.id, "admin role granted");
        Ok(Some(user))
    }

    pub async fn update_avatar(&self, ctx: &RequestCtx, id: Uuid, url: &str) -> AppResult<User> {
        validate_avatar_url(url)?;
        ctx.bound(self.repo.update_avatar(id, url)).await
    }

    pub async fn touch_login(&self, ctx: &RequestCtx, id: Uuid) -> AppResult<()> {
        ctx.bound(self.repo.touch_login(id)).await
    }

    pub async fn delete(&self, ctx: &RequestCtx, id: Uuid) -> AppResult<()> {
        ctx.bound(self.repo.delete(id)).await
    }

    pub async fn find_by_name(
        &self,
        ctx: &RequestCtx,
        name: &str,
        page: &Pagination,
    ) -> AppResult<UsersList> {
        ctx.bound(self.repo.find_by_name(name, page)).await
    }

    pub async fn list(
        &self,
        ctx: &RequestCtx,
        page: &Pagination,
        order: UserOrder,
    ) -> AppResult<UsersList> {
        ctx.bound(self.repo.list(page, order)).await
    }
}
