use axum::{
    extract::{multipart::MultipartRejection, Multipart, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tracing::instrument;

use super::{
    cookie::{clear_session_cookie, read_cookie, session_cookie},
    extractors::{CurrentUser, SessionId, UserId},
    service::AvatarUpload,
};
use crate::{
    csrf::CSRF_HEADER,
    ctx::RequestCtx,
    error::{AppError, AppResult},
    pagination::{PageParams, Pagination},
    sanitize::SanitizedJson,
    state::AppState,
    users::{
        dto::{LoginRequest, RegisterRequest, UpdateUserRequest},
        User, UserOrder, UsersList,
    },
};

#[derive(Debug, Deserialize)]
pub struct FindParams {
    pub name: Option<String>,
    pub page: Option<String>,
    pub size: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AvatarParams {
    pub bucket: Option<String>,
}

fn with_cookie(value: HeaderValue) -> [(HeaderName, HeaderValue); 1] {
    [(header::SET_COOKIE, value)]
}

#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    ctx: RequestCtx,
    SanitizedJson(payload): SanitizedJson<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let (user, sid) = state.auth.register(&ctx, payload).await?;
    let cookie = session_cookie(&state.config.session, &state.config.cookie, &sid)?;
    Ok((StatusCode::CREATED, with_cookie(cookie), Json(user)))
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    ctx: RequestCtx,
    SanitizedJson(payload): SanitizedJson<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let (user, sid) = state.auth.login(&ctx, payload).await?;
    let cookie = session_cookie(&state.config.session, &state.config.cookie, &sid)?;
    Ok((StatusCode::OK, with_cookie(cookie), Json(user)))
}

#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    ctx: RequestCtx,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let sid = read_cookie(&headers, &state.config.session.name);
    state.auth.logout(&ctx, sid.as_deref()).await?;
    let cookie = clear_session_cookie(&state.config.session, &state.config.cookie)?;
    Ok((StatusCode::OK, with_cookie(cookie)))
}

#[instrument(skip_all)]
pub async fn get_me(current: Option<CurrentUser>) -> AppResult<Json<User>> {
    let CurrentUser(user) = current.ok_or(AppError::Unauthorized)?;
    Ok(Json(user))
}

#[instrument(skip_all)]
pub async fn get_csrf_token(
    State(state): State<AppState>,
    SessionId(sid): SessionId,
) -> AppResult<impl IntoResponse> {
    let token = state.csrf.make_token(&sid);
    let token = HeaderValue::from_str(&token).map_err(AppError::storage)?;
    Ok((
        StatusCode::OK,
        [
            (HeaderName::from_static("x-csrf-token"), token),
            (
                header::ACCESS_CONTROL_EXPOSE_HEADERS,
                HeaderValue::from_static(CSRF_HEADER),
            ),
        ],
    ))
}

#[instrument(skip(state, ctx))]
pub async fn get_user_by_id(
    State(state): State<AppState>,
    ctx: RequestCtx,
    UserId(id): UserId,
) -> AppResult<Json<User>> {
    Ok(Json(state.auth.get_by_id(&ctx, id).await?))
}

#[instrument(skip(state, ctx, actor, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    ctx: RequestCtx,
    CurrentUser(actor): CurrentUser,
    UserId(id): UserId,
    SanitizedJson(payload): SanitizedJson<UpdateUserRequest>,
) -> AppResult<Json<User>> {
    Ok(Json(state.auth.update(&ctx, &actor, id, payload).await?))
}

#[instrument(skip(state, ctx, actor))]
pub async fn delete_user(
    State(state): State<AppState>,
    ctx: RequestCtx,
    CurrentUser(actor): CurrentUser,
    UserId(id): UserId,
) -> AppResult<Json<&'static str>> {
    state.auth.delete(&ctx, &actor, id).await?;
    Ok(Json("User deleted"))
}

#[instrument(skip(state, ctx))]
pub async fn get_users(
    State(state): State<AppState>,
    ctx: RequestCtx,
    Query(params): Query<PageParams>,
) -> AppResult<Json<UsersList>> {
    let page = Pagination::from_params(
        params.page.as_deref(),
        params.size.as_deref(),
        &state.config.pagination,
    )?;
    let order = match params.order_by.as_deref().map(str::trim) {
        None | Some("") => UserOrder::default(),
        Some(raw) => raw.parse()?,
    };
    Ok(Json(state.auth.get_users(&ctx, &page, order).await?))
}

#[instrument(skip(state, ctx))]
pub async fn find_by_name(
    State(state): State<AppState>,
    ctx: RequestCtx,
    Query(params): Query<FindParams>,
) -> AppResult<Json<UsersList>> {
    let name = params
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::validation("name is required"))?;
    let page = Pagination::from_params(
        params.page.as_deref(),
        params.size.as_deref(),
        &state.config.pagination,
    )?;
    Ok(Json(state.auth.find_by_name(&ctx, name, &page).await?))
}

/// Multipart upload; the image is read from the `file` field.
#[instrument(skip(state, ctx, actor, multipart))]
pub async fn upload_avatar(
    State(state): State<AppState>,
    ctx: RequestCtx,
    CurrentUser(actor): CurrentUser,
    UserId(id): UserId,
    Query(params): Query<AvatarParams>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<String>> {
    let mut multipart = multipart.map_err(|e| AppError::validation(e.body_text()))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        let body = field
            .bytes()
            .await
            .map_err(|e| AppError::validation(e.body_text()))?;
        upload = Some(AvatarUpload {
            bucket: params.bucket.clone(),
            content_type,
            body,
        });
        break;
    }

    let upload = upload.ok_or_else(|| AppError::validation("file is required"))?;
    Ok(Json(state.auth.upload_avatar(&ctx, &actor, id, upload).await?))
}
