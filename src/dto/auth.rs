use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Query parameters for beginning the OAuth handshake.
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct AuthBeginQuery {
    /// Room the tokens are destined for, carried through `state`.
    pub room_code: String,
}

/// Query parameters the music service appends to the callback redirect.
#[derive(Debug, Deserialize, IntoParams)]
pub struct AuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Opaque payload encoded into the OAuth `state` parameter.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatePayload {
    pub room_code: String,
    /// Unix seconds at which the handshake started.
    pub ts: u64,
}

/// Body of `POST /api/music/refresh`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Fresh token pair for the host client.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    /// Present when the music service rotated the refresh token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}
