use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub mod memory;
pub mod pg;

pub use memory::MemorySessionStore;
pub use pg::PgSessionStore;

/// Authenticated session as stored in the session backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: Uuid,
}

/// Session data before an id has been assigned.
#[derive(Debug, Clone, Copy)]
pub struct NewSession {
    pub user_id: Uuid,
}

/// Key-value store for sessions. Implementations generate the session id and
/// never return records past their ttl.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: NewSession, ttl: Duration) -> AppResult<String>;
    async fn get_session_by_id(&self, session_id: &str) -> AppResult<Session>;
    /// Deleting an unknown id is not an error.
    async fn delete_by_id(&self, session_id: &str) -> AppResult<()>;
    async fn delete_by_user_id(&self, user_id: Uuid) -> AppResult<u64>;
    async fn purge_expired(&self) -> AppResult<u64>;
}

pub(crate) fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

pub(crate) fn ttl_out_of_range(ttl: Duration) -> AppError {
    AppError::storage(anyhow::anyhow!("session ttl {ttl:?} out of range"))
}

/// Periodically drops expired sessions from any backend. Reads already
/// ignore them; this only reclaims space held by abandoned sessions.
pub fn spawn_purge(store: Arc<dyn SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        loop {
            tick.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(n) => info!(purged = n, "expired sessions removed"),
                Err(e) => warn!(error = %e, "session purge failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn purge_task_reclaims_abandoned_sessions() {
        let store = Arc::new(MemorySessionStore::new());
        for _ in 0..1000 {
            store
                .create_session(NewSession { user_id: Uuid::new_v4() }, Duration::from_secs(1))
                .await
                .unwrap();
        }
        let keep = store
            .create_session(
                NewSession { user_id: Uuid::new_v4() },
                Duration::from_secs(2 * 60 * 60),
            )
            .await
            .unwrap();

        let task = spawn_purge(store.clone(), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(60 * 60)).await;

        assert_eq!(store.len().await, 1);
        assert!(store.get_session_by_id(&keep).await.is_ok());
        task.abort();
    }
}
