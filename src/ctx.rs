use std::{future::Future, time::Duration};

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use tokio::time::{timeout_at, Instant};
use tracing::warn;

use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

/// Per-request deadline. Every downstream call made on behalf of a request
/// runs through [`RequestCtx::bound`], so the whole request shares one budget.
#[derive(Debug, Clone, Copy)]
pub struct RequestCtx {
    deadline: Instant,
}

impl RequestCtx {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
        }
    }

    pub async fn bound<T, F>(&self, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        match timeout_at(self.deadline, fut).await {
            Ok(res) => res,
            Err(_) => {
                warn!("downstream call exceeded request deadline");
                Err(AppError::Timeout)
            }
        }
    }
}

/// Starts the request clock as soon as the request enters the router, so
/// middleware and handler share the same deadline.
pub async fn stamp_deadline(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let ctx = RequestCtx::with_timeout(state.config.request_timeout());
    req.extensions_mut().insert(ctx);
    next.run(req).await
}

#[async_trait]
impl FromRequestParts<AppState> for RequestCtx {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestCtx>()
            .copied()
            .unwrap_or_else(|| RequestCtx::with_timeout(state.config.request_timeout())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let ctx = RequestCtx::with_timeout(Duration::from_millis(50));
        let res: AppResult<()> = ctx
            .bound(async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
            .await;
        assert!(matches!(res, Err(AppError::Timeout)));
    }

    #[tokio::test]
    async fn fast_call_passes_through() {
        let ctx = RequestCtx::with_timeout(Duration::from_secs(5));
        let res = ctx.bound(async { Ok::<_, AppError>(7) }).await.unwrap();
        assert_eq!(res, 7);
    }
}
