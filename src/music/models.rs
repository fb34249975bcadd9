//! Runtime models and wire shapes for the external music service.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// OAuth credentials held by a room on behalf of its host.
///
/// Tokens never leave the server through room serialization; only the
/// authenticating user id is exposed.
#[derive(Debug, Clone)]
pub struct MusicAuth {
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute wall-clock instant at which the access token expires.
    pub expires_at: SystemTime,
    /// Id of the account that granted the tokens.
    pub user_id: Option<String>,
}

impl MusicAuth {
    /// Build credentials expiring `expires_in` seconds from now.
    pub fn new(access_token: String, refresh_token: String, expires_in: u64) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: SystemTime::now() + Duration::from_secs(expires_in),
            user_id: None,
        }
    }
}

/// A single playable track as revealed to clients after a round.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub uri: String,
    pub name: String,
    pub artists: Vec<TrackArtist>,
    pub album_name: String,
    pub album_cover_url: Option<String>,
    pub duration_ms: u64,
    pub preview_url: Option<String>,
}

/// Credited artist on a track.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackArtist {
    pub id: String,
    pub name: String,
}

impl Track {
    /// Names of all credited artists, used for answer scoring.
    pub fn artist_names(&self) -> Vec<String> {
        self.artists.iter().map(|artist| artist.name.clone()).collect()
    }
}

/// Metadata of the playlist a room draws its tracks from.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistInfo {
    pub id: String,
    pub name: String,
    pub cover_url: Option<String>,
    pub total_tracks: u32,
}

/// Token pair returned by the token endpoint.
///
/// Refresh responses may omit `refresh_token`; callers keep the previous one.
#[derive(Debug, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

#[derive(Debug, Deserialize)]
pub(super) struct UserProfileResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct PlaylistResponse {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub images: Vec<ImageResponse>,
    pub tracks: PlaylistTracksSummary,
}

#[derive(Debug, Deserialize)]
pub(super) struct PlaylistTracksSummary {
    pub total: u32,
}

#[derive(Debug, Deserialize)]
pub(super) struct ImageResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct PlaylistWindowResponse {
    #[serde(default)]
    pub items: Vec<PlaylistItemResponse>,
}

#[derive(Debug, Deserialize)]
pub(super) struct PlaylistItemResponse {
    #[serde(default)]
    pub is_local: bool,
    pub track: Option<TrackResponse>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TrackResponse {
    pub id: Option<String>,
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistResponse>,
    pub album: Option<AlbumResponse>,
    #[serde(default)]
    pub duration_ms: u64,
    pub preview_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ArtistResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct AlbumResponse {
    pub name: String,
    #[serde(default)]
    pub images: Vec<ImageResponse>,
}

impl From<PlaylistResponse> for PlaylistInfo {
    fn from(value: PlaylistResponse) -> Self {
        Self {
            id: value.id,
            name: value.name,
            cover_url: value.images.into_iter().next().map(|image| image.url),
            total_tracks: value.tracks.total,
        }
    }
}

impl TrackResponse {
    /// Convert into a runtime [`Track`], returning `None` for tracks without
    /// a catalog id (local files).
    pub(super) fn into_track(self) -> Option<Track> {
        let id = self.id?;
        let (album_name, album_cover_url) = match self.album {
            Some(album) => (
                album.name,
                album.images.into_iter().next().map(|image| image.url),
            ),
            None => (String::new(), None),
        };

        Some(Track {
            id,
            uri: self.uri,
            name: self.name,
            artists: self
                .artists
                .into_iter()
                .map(|artist| TrackArtist {
                    id: artist.id.unwrap_or_default(),
                    name: artist.name,
                })
                .collect(),
            album_name,
            album_cover_url,
            duration_ms: self.duration_ms,
            preview_url: self.preview_url,
        })
    }
}
