use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use super::{
    cookie::read_cookie,
    extractors::{CurrentUser, SessionId},
};
use crate::{csrf::CSRF_HEADER, ctx::RequestCtx, error::AppError, state::AppState};

/// Resolves the session cookie to a live session and its user, and attaches
/// both to the request. Anything short of that is a 401.
pub async fn session_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let Some(sid) = read_cookie(req.headers(), &state.config.session.name) else {
        debug!("no session cookie");
        return AppError::Unauthorized.into_response();
    };

    let ctx = req
        .extensions()
        .get::<RequestCtx>()
        .copied()
        .unwrap_or_else(|| RequestCtx::with_timeout(state.config.request_timeout()));
    let (session, user) = match state.auth.authenticate(&ctx, &sid).await {
        Ok(found) => found,
        Err(e) => return e.into_response(),
    };

    req.extensions_mut().insert(SessionId(session.session_id));
    req.extensions_mut().insert(CurrentUser(user));
    next.run(req).await
}

/// Requires the `X-CSRF-Token` header to match the token derived from the
/// current session. Must run inside [`session_auth`].
pub async fn csrf_guard(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(SessionId(sid)) = req.extensions().get::<SessionId>().cloned() else {
        return AppError::Unauthorized.into_response();
    };

    let token = req
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if token.is_empty() || !state.csrf.verify_token(&sid, token) {
        warn!(method = %req.method(), uri = %req.uri(), "csrf token missing or invalid");
        return AppError::Forbidden.into_response();
    }
    next.run(req).await
}
