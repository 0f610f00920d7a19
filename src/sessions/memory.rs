use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use tokio::{sync::RwLock, time::Instant};
use tracing::debug;
use uuid::Uuid;

use super::{new_session_id, ttl_out_of_range, NewSession, Session, SessionStore};
use crate::error::{AppError, AppResult};

struct Entry {
    user_id: Uuid,
    expires_at: Instant,
}

/// In-process session cache. Sessions do not survive a restart and are not
/// shared between replicas.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, session: NewSession, ttl: Duration) -> AppResult<String> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| ttl_out_of_range(ttl))?;
        let session_id = new_session_id();
        let entry = Entry {
            user_id: session.user_id,
            expires_at,
        };
        self.entries.write().await.insert(session_id.clone(), entry);
        debug!(user_id = %session.user_id, "session created");
        Ok(session_id)
    }

    async fn get_session_by_id(&self, session_id: &str) -> AppResult<Session> {
        {
            let map = self.entries.read().await;
            match map.get(session_id) {
                Some(e) if e.expires_at > Instant::now() => {
                    return Ok(Session {
                        session_id: session_id.to_string(),
                        user_id: e.user_id,
                    })
                }
                None => return Err(AppError::NotFound("session")),
                Some(_) => {}
            }
        }
        // expired: drop it while we are here
        self.entries.write().await.remove(session_id);
        Err(AppError::NotFound("session"))
    }

    async fn delete_by_id(&self, session_id: &str) -> AppResult<()> {
        self.entries.write().await.remove(session_id);
        Ok(())
    }

    async fn delete_by_user_id(&self, user_id: Uuid) -> AppResult<u64> {
        let mut map = self.entries.write().await;
        let before = map.len();
        map.retain(|_, e| e.user_id != user_id);
        Ok((before - map.len()) as u64)
    }

    async fn purge_expired(&self) -> AppResult<u64> {
        let now = Instant::now();
        let mut map = self.entries.write().await;
        let before = map.len();
        map.retain(|_, e| e.expires_at > now);
        Ok((before - map.len()) as u64)
    }
}
