use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};

use crate::state::AppState;

pub mod cookie;
pub(crate) mod extractors;
pub mod handlers;
pub mod middleware;
pub mod service;

const AVATAR_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Public routes, then session-only routes, then routes that also need a
/// valid CSRF token. Guards are attached with `route_layer` so unknown paths
/// still fall through to a 404.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/all", get(handlers::get_users))
        .route("/auth/find", get(handlers::find_by_name))
        .route("/auth/:id", get(handlers::get_user_by_id));

    let guarded = Router::new()
        .route(
            "/auth/:id",
            put(handlers::update_user).delete(handlers::delete_user),
        )
        .route(
            "/auth/:id/avatar",
            post(handlers::upload_avatar).layer(DefaultBodyLimit::max(AVATAR_BODY_LIMIT)),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::csrf_guard,
        ));

    let session = Router::new()
        .route("/auth/me", get(handlers::get_me))
        .route("/auth/token", get(handlers::get_csrf_token))
        .merge(guarded)
        .route_layer(from_fn_with_state(
            state,
            middleware::session_auth,
        ));

    public.merge(session)
}
