//! OAuth handshake against the external music service.
//!
//! Tokens travel back to the browser in a URL fragment so they never appear
//! in server logs or proxies; the room code rides through the opaque `state`
//! parameter.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use tracing::{info, warn};

use crate::{
    dto::auth::{AuthCallbackQuery, AuthStatePayload, RefreshRequest, RefreshResponse},
    error::AppError,
    state::SharedState,
};

/// Handshakes older than this are rejected on callback.
const STATE_MAX_AGE_SECS: u64 = 10 * 60;

/// Build the authorize redirect for a room's host.
pub async fn begin_auth(state: &SharedState, room_code: &str) -> Result<String, AppError> {
    {
        let registry = state.registry().lock().await;
        if registry.room(room_code).is_none() {
            return Err(AppError::NotFound(format!("room `{room_code}` not found")));
        }
    }

    let canonical = room_code.trim().to_ascii_uppercase();
    let url = state
        .gateway()
        .authorize_url(&encode_state(&canonical))?;
    info!(code = %canonical, "oauth handshake started");
    Ok(url)
}

/// Complete the code exchange and build the browser redirect.
///
/// Always redirects; failures are carried as `#error=<kind>` so the host ends
/// up back on a page that can explain the problem.
pub async fn complete_callback(state: &SharedState, query: AuthCallbackQuery) -> String {
    let base = state.config().server.base_url.trim_end_matches('/');

    let Some(payload) = query.state.as_deref().and_then(decode_state) else {
        warn!("oauth callback with missing or undecodable state");
        return format!("{base}/#error=invalid_state");
    };
    let room_url = format!("{base}/room/{}", payload.room_code);

    if now_secs().saturating_sub(payload.ts) > STATE_MAX_AGE_SECS {
        warn!(code = %payload.room_code, "oauth callback with expired state");
        return format!("{room_url}#error=expired_state");
    }
    if let Some(error) = query.error {
        warn!(code = %payload.room_code, %error, "oauth authorization denied");
        return format!("{room_url}#error={error}");
    }
    let Some(code) = query.code else {
        return format!("{room_url}#error=missing_code");
    };

    match state.gateway().exchange_code(&code).await {
        Ok(grant) => {
            info!(code = %payload.room_code, "oauth handshake completed");
            let refresh = grant.refresh_token.unwrap_or_default();
            format!(
                "{room_url}#access_token={}&refresh_token={}&expires_in={}",
                grant.access_token, refresh, grant.expires_in
            )
        }
        Err(err) => {
            warn!(code = %payload.room_code, error = %err, "oauth code exchange failed");
            format!("{room_url}#error=token_exchange_failed")
        }
    }
}

/// Exchange a refresh token for a fresh access token pair.
pub async fn refresh_tokens(
    state: &SharedState,
    request: RefreshRequest,
) -> Result<RefreshResponse, AppError> {
    if request.refresh_token.trim().is_empty() {
        return Err(AppError::BadRequest("refresh token must not be empty".into()));
    }

    let grant = state.gateway().refresh(&request.refresh_token).await?;
    Ok(RefreshResponse {
        access_token: grant.access_token,
        refresh_token: grant.refresh_token,
        expires_in: grant.expires_in,
    })
}

/// Encode the room code and a timestamp into the opaque `state` parameter.
fn encode_state(room_code: &str) -> String {
    let payload = AuthStatePayload {
        room_code: room_code.to_string(),
        ts: now_secs(),
    };
    let bytes = serde_json::to_vec(&payload).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(bytes)
}

fn decode_state(state: &str) -> Option<AuthStatePayload> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
