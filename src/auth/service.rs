use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    ctx::RequestCtx,
    error::{AppError, AppResult},
    pagination::Pagination,
    sessions::{NewSession, Session, SessionStore},
    storage::{ext_from_mime, StorageClient},
    users::{
        dto::{LoginRequest, RegisterRequest, UpdateUserRequest},
        password::verify_password_async,
        User, UserDirectory, UserOrder, UsersList,
    },
};

/// Coordinates the user directory, the session store and the object store.
/// Every method is a single transition driven by one request.
#[derive(Clone)]
pub struct AuthService {
    users: UserDirectory,
    sessions: Arc<dyn SessionStore>,
    storage: Arc<dyn StorageClient>,
    session_ttl: Duration,
    default_bucket: String,
}

/// Uploaded avatar as received from the client.
pub struct AvatarUpload {
    pub bucket: Option<String>,
    pub content_type: String,
    pub body: Bytes,
}

impl AuthService {
    pub fn new(
        users: UserDirectory,
        sessions: Arc<dyn SessionStore>,
        storage: Arc<dyn StorageClient>,
        session_ttl: Duration,
        default_bucket: impl Into<String>,
    ) -> Self {
        Self {
            users,
            sessions,
            storage,
            session_ttl,
            default_bucket: default_bucket.into(),
        }
    }

    async fn open_session(&self, ctx: &RequestCtx, user_id: Uuid) -> AppResult<String> {
        ctx.bound(
            self.sessions
                .create_session(NewSession { user_id }, self.session_ttl),
        )
        .await
    }

    /// Promotes the configured admin account at startup, if it is registered.
    pub async fn bootstrap_admin(&self, ctx: &RequestCtx) -> AppResult<()> {
        match self.users.promote_admin(ctx).await? {
            Some(admin) => info!(user_id = %admin.id, "admin account ready"),
            None => info!("no admin account yet"),
        }
        Ok(())
    }

    /// Creates the user, then a session for it. If the session cannot be
    /// created the user stays registered and has to log in.
    #[instrument(skip_all)]
    pub async fn register(&self, ctx: &RequestCtx, req: RegisterRequest) -> AppResult<(User, String)> {
        let user = self.users.create(ctx, req).await?;
        let sid = self.open_session(ctx, user.id).await.map_err(|e| {
            warn!(user_id = %user.id, error = %e, "user registered without session");
            e
        })?;
        info!(user_id = %user.id, "user registered");
        Ok((user, sid))
    }

    #[instrument(skip_all)]
    pub async fn login(&self, ctx: &RequestCtx, req: LoginRequest) -> AppResult<(User, String)> {
        let (email, password) = req.validate()?;

        let Some(mut user) = self.users.find_by_email(ctx, &email).await? else {
            warn!("login unknown email");
            return Err(AppError::Unauthorized);
        };

        let hash = user.password_hash.clone();
        let ok = ctx.bound(verify_password_async(password, hash)).await?;
        if !ok {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AppError::Unauthorized);
        }

        self.users.touch_login(ctx, user.id).await?;
        user.login_date = Some(time::OffsetDateTime::now_utc());

        let sid = self.open_session(ctx, user.id).await?;
        info!(user_id = %user.id, "user logged in");
        Ok((user, sid))
    }

    /// A missing cookie is an error; an unknown session id is not.
    #[instrument(skip_all)]
    pub async fn logout(&self, ctx: &RequestCtx, session_id: Option<&str>) -> AppResult<()> {
        let sid = session_id.ok_or(AppError::Unauthorized)?;
        ctx.bound(self.sessions.delete_by_id(sid)).await
    }

    /// Resolves a session cookie to its live session and owner.
    pub async fn authenticate(&self, ctx: &RequestCtx, session_id: &str) -> AppResult<(Session, User)> {
        let session = match ctx.bound(self.sessions.get_session_by_id(session_id)).await {
            Ok(s) => s,
            Err(AppError::NotFound(_)) => return Err(AppError::Unauthorized),
            Err(e) => return Err(e),
        };
        let user = match self.users.get_by_id(ctx, session.user_id).await {
            Ok(u) => u,
            Err(AppError::NotFound(_)) => {
                warn!(user_id = %session.user_id, "session owner no longer exists");
                return Err(AppError::Unauthorized);
            }
            Err(e) => return Err(e),
        };
        Ok((session, user))
    }

    pub async fn get_by_id(&self, ctx: &RequestCtx, id: Uuid) -> AppResult<User> {
        self.users.get_by_id(ctx, id).await
    }

    pub async fn find_by_name(
        &self,
        ctx: &RequestCtx,
        name: &str,
        page: &Pagination,
    ) -> AppResult<UsersList> {
        self.users.find_by_name(ctx, name, page).await
    }

    pub async fn get_users(
        &self,
        ctx: &RequestCtx,
        page: &Pagination,
        order: UserOrder,
    ) -> AppResult<UsersList> {
        self.users.list(ctx, page, order).await
    }

    /// Users may edit themselves; admins may edit anyone and change roles.
    #[instrument(skip(self, ctx, actor, req), fields(actor = %actor.id))]
    pub async fn update(
        &self,
        ctx: &RequestCtx,
        actor: &User,
        id: Uuid,
        req: UpdateUserRequest,
    ) -> AppResult<User> {
        ensure_owner_or_admin(actor, id)?;
        if req.role.is_some() && !actor.is_admin() {
            return Err(AppError::Forbidden);
        }
        self.users.update(ctx, id, req).await
    }

    /// Admin only. The user's sessions go with it.
    #[instrument(skip(self, ctx, actor), fields(actor = %actor.id))]
    pub async fn delete(&self, ctx: &RequestCtx, actor: &User, id: Uuid) -> AppResult<()> {
        if !actor.is_admin() {
            return Err(AppError::Forbidden);
        }
        self.users.delete(ctx, id).await?;
        let dropped = ctx.bound(self.sessions.delete_by_user_id(id)).await?;
        info!(user_id = %id, sessions = dropped, "user deleted");
        Ok(())
    }

    #[instrument(skip(self, ctx, actor, upload), fields(actor = %actor.id))]
    pub async fn upload_avatar(
        &self,
        ctx: &RequestCtx,
        actor: &User,
        id: Uuid,
        upload: AvatarUpload,
    ) -> AppResult<String> {
        ensure_owner_or_admin(actor, id)?;
        let ext = ext_from_mime(&upload.content_type).ok_or_else(|| {
            AppError::validation("avatar must be a jpeg, png or webp image")
        })?;
        if upload.body.is_empty() {
            return Err(AppError::validation("avatar file is empty"));
        }
        let bucket = upload
            .bucket
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| self.default_bucket.clone());

        // make sure the target exists before paying for the upload
        self.users.get_by_id(ctx, id).await?;

        let key = format!("avatars/{}/{}.{}", id, Uuid::new_v4(), ext);
        ctx.bound(async {
            self.storage
                .put_object(&bucket, &key, upload.body, &upload.content_type)
                .await
                .map_err(AppError::Storage)
        })
        .await?;

        let url = self.storage.object_url(&bucket, &key);
        self.users.update_avatar(ctx, id, &url).await?;
        info!(user_id = %id, %url, "avatar uploaded");
        Ok(url)
    }
}

fn ensure_owner_or_admin(actor: &User, target: Uuid) -> AppResult<()> {
    if actor.id == target || actor.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}
