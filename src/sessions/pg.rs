use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::{new_session_id, ttl_out_of_range, NewSession, Session, SessionStore};
use crate::error::{AppError, AppResult};

/// Sessions kept in an UNLOGGED Postgres table, so the cache is shared by
/// every replica without paying for WAL.
#[derive(Clone)]
pub struct PgSessionStore {
    db: PgPool,
}

impl PgSessionStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create_session(&self, session: NewSession, ttl: Duration) -> AppResult<String> {
        let session_id = new_session_id();
        let expires_at = time::Duration::try_from(ttl)
            .ok()
            .and_then(|ttl| OffsetDateTime::now_utc().checked_add(ttl))
            .ok_or_else(|| ttl_out_of_range(ttl))?;
        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, user_id, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&session_id)
        .bind(session.user_id)
        .bind(expires_at)
        .execute(&self.db)
        .await
        .map_err(AppError::storage)?;
        debug!(user_id = %session.user_id, "session created");
        Ok(session_id)
    }

    async fn get_session_by_id(&self, session_id: &str) -> AppResult<Session> {
        let row = sqlx::query_as::<_, (String, Uuid)>(
            r#"
            SELECT session_id, user_id
              FROM sessions
             WHERE session_id = $1 AND expires_at > now()
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.db)
        .await
        .map_err(AppError::storage)?;

        let (session_id, user_id) = row.ok_or(AppError::NotFound("session"))?;
        Ok(Session {
            session_id,
            user_id,
        })
    }

    async fn delete_by_id(&self, session_id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.db)
            .await
            .map_err(AppError::storage)?;
        Ok(())
    }

    async fn delete_by_user_id(&self, user_id: Uuid) -> AppResult<u64> {
        let res = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await
            .map_err(AppError::storage)?;
        Ok(res.rows_affected())
    }

    async fn purge_expired(&self) -> AppResult<u64> {
        let res = sqlx::query("DELETE FROM sessions WHERE expires_at <= now()")
            .execute(&self.db)
            .await
            .map_err(AppError::storage)?;
        Ok(res.rows_affected())
    }
}
