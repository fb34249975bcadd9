use axum::{
    Json, Router,
    extract::{Query, State},
    response::Redirect,
    routing::{get, post},
};

use crate::{
    dto::auth::{AuthBeginQuery, AuthCallbackQuery, RefreshRequest, RefreshResponse},
    error::AppError,
    services::auth_service,
    state::SharedState,
};

/// Routes handling the music service OAuth handshake.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/music/auth", get(begin_auth))
        .route("/api/music/callback", get(auth_callback))
        .route("/api/music/refresh", post(refresh))
}

/// Kick off the OAuth handshake for a room's host.
#[utoipa::path(
    get,
    path = "/api/music/auth",
    tag = "music",
    params(AuthBeginQuery),
    responses((status = 302, description = "Redirect to the music service authorize page"))
)]
pub async fn begin_auth(
    State(state): State<SharedState>,
    Query(query): Query<AuthBeginQuery>,
) -> Result<Redirect, AppError> {
    let url = auth_service::begin_auth(&state, &query.room_code).await?;
    Ok(Redirect::temporary(&url))
}

/// Complete the code exchange and bounce the browser back into the room.
///
/// Tokens are passed in the URL fragment so they never hit server logs.
#[utoipa::path(
    get,
    path = "/api/music/callback",
    tag = "music",
    params(AuthCallbackQuery),
    responses((status = 302, description = "Redirect back to the room with tokens in the fragment"))
)]
pub async fn auth_callback(
    State(state): State<SharedState>,
    Query(query): Query<AuthCallbackQuery>,
) -> Redirect {
    let target = auth_service::complete_callback(&state, query).await;
    Redirect::temporary(&target)
}

/// Exchange a refresh token for a fresh access token pair.
#[utoipa::path(
    post,
    path = "/api/music/refresh",
    tag = "music",
    request_body = RefreshRequest,
    responses((status = 200, description = "Fresh token pair", body = RefreshResponse))
)]
pub async fn refresh(
    State(state): State<SharedState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, AppError> {
    let response = auth_service::refresh_tokens(&state, payload).await?;
    Ok(Json(response))
}
