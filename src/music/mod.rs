//! HTTP gateway to the external music service: OAuth token lifecycle,
//! playlist metadata, and random single-track fetches.

pub mod error;
pub mod models;

use std::{collections::HashSet, sync::Arc, time::Duration};

use rand::Rng;
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::MusicConfig;

pub use self::error::{MusicGatewayError, MusicResult};
pub use self::models::{MusicAuth, PlaylistInfo, TokenGrant, Track, TrackArtist};
use self::models::{PlaylistResponse, PlaylistWindowResponse, UserProfileResponse};

/// Scopes requested from the music service on authorization.
const SCOPES: &[&str] = &[
    "streaming",
    "user-read-email",
    "user-read-private",
    "user-read-playback-state",
    "user-modify-playback-state",
    "playlist-read-private",
    "playlist-read-collaborative",
];

/// Access tokens are refreshed this long before their actual expiry.
const EARLY_REFRESH_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Upper bound on random-offset attempts per track fetch.
const MAX_TRACK_ATTEMPTS: u32 = 10;

/// Bound on any single request to the external service.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest body snippet carried inside a status error.
const BODY_SNIPPET_LEN: usize = 256;

/// Canonical length of a playlist id.
const PLAYLIST_ID_LEN: usize = 22;

/// Client for the external music service.
#[derive(Clone)]
pub struct MusicGateway {
    client: Client,
    accounts_url: Arc<str>,
    api_url: Arc<str>,
    client_id: Arc<str>,
    client_secret: Arc<str>,
    redirect_uri: Arc<str>,
}

impl MusicGateway {
    /// Build the gateway with a bounded-timeout HTTP client.
    pub fn new(config: &MusicConfig) -> MusicResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| MusicGatewayError::ClientBuilder { source })?;

        Ok(Self {
            client,
            accounts_url: Arc::from(config.accounts_base_url.trim_end_matches('/')),
            api_url: Arc::from(config.api_base_url.trim_end_matches('/')),
            client_id: Arc::from(config.client_id.as_str()),
            client_secret: Arc::from(config.client_secret.as_str()),
            redirect_uri: Arc::from(config.redirect_uri.as_str()),
        })
    }

    /// Authorization URL the browser is redirected to, carrying the opaque
    /// `state` parameter through the round trip.
    pub fn authorize_url(&self, state: &str) -> MusicResult<String> {
        let base = format!("{}/authorize", self.accounts_url);
        let scope = SCOPES.join(" ");
        let url = Url::parse_with_params(
            &base,
            [
                ("response_type", "code"),
                ("client_id", self.client_id.as_ref()),
                ("scope", scope.as_str()),
                ("redirect_uri", self.redirect_uri.as_ref()),
                ("state", state),
            ],
        )
        .map_err(|_| MusicGatewayError::InvalidBaseUrl { url: base })?;

        Ok(url.into())
    }

    /// Exchange an authorization code for a token pair.
    pub async fn exchange_code(&self, code: &str) -> MusicResult<TokenGrant> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_ref()),
        ])
        .await
    }

    /// Obtain a fresh access token from a refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> MusicResult<TokenGrant> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    /// Return `auth` unchanged while its expiry is comfortably away, otherwise
    /// refresh and return the replacement credentials.
    ///
    /// A refresh response without a new refresh token keeps the prior one.
    pub async fn ensure_valid_token(&self, auth: &MusicAuth) -> MusicResult<MusicAuth> {
        let fresh_until = auth
            .expires_at
            .checked_sub(EARLY_REFRESH_WINDOW)
            .unwrap_or(std::time::UNIX_EPOCH);
        if std::time::SystemTime::now() < fresh_until {
            return Ok(auth.clone());
        }

        debug!("access token near expiry, refreshing");
        let grant = self.refresh(&auth.refresh_token).await?;
        let refresh_token = grant
            .refresh_token
            .unwrap_or_else(|| auth.refresh_token.clone());

        let mut renewed = MusicAuth::new(grant.access_token, refresh_token, grant.expires_in);
        renewed.user_id = auth.user_id.clone();
        Ok(renewed)
    }

    /// Resolve the id of the account owning `access_token`.
    pub async fn current_user(&self, access_token: &str) -> MusicResult<String> {
        let endpoint = format!("{}/me", self.api_url);
        let response = self
            .client
            .get(&endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|source| MusicGatewayError::RequestSend {
                endpoint: endpoint.clone(),
                source,
            })?;

        let profile: UserProfileResponse = decode_response(&endpoint, response).await?;
        Ok(profile.id)
    }

    /// Fetch playlist metadata (name, cover, total track count).
    pub async fn playlist(&self, access_token: &str, playlist_id: &str) -> MusicResult<PlaylistInfo> {
        let endpoint = format!("{}/playlists/{}", self.api_url, playlist_id);
        let response = self
            .client
            .get(&endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|source| MusicGatewayError::RequestSend {
                endpoint: endpoint.clone(),
                source,
            })?;

        let playlist: PlaylistResponse = decode_response(&endpoint, response).await?;
        Ok(playlist.into())
    }

    /// Pick a random not-yet-used track from the playlist.
    ///
    /// Each attempt fetches a one-item window at a uniform random offset and
    /// skips local files, missing tracks, and already-used ids. Returns `None`
    /// when every attempt failed or the used set already covers the playlist.
    pub async fn random_track(
        &self,
        access_token: &str,
        playlist_id: &str,
        total_tracks: u32,
        used: &HashSet<String>,
    ) -> MusicResult<Option<Track>> {
        if total_tracks == 0 || used.len() as u32 >= total_tracks {
            return Ok(None);
        }

        for attempt in 0..MAX_TRACK_ATTEMPTS {
            let offset = rand::rng().random_range(0..total_tracks);
            let endpoint = format!(
                "{}/playlists/{}/tracks?offset={}&limit=1",
                self.api_url, playlist_id, offset
            );
            let response = self
                .client
                .get(&endpoint)
                .bearer_auth(access_token)
                .send()
                .await
                .map_err(|source| MusicGatewayError::RequestSend {
                    endpoint: endpoint.clone(),
                    source,
                })?;

            let window: PlaylistWindowResponse = decode_response(&endpoint, response).await?;
            let Some(item) = window.items.into_iter().next() else {
                debug!(offset, attempt, "empty playlist window");
                continue;
            };
            if item.is_local {
                continue;
            }
            let Some(track) = item.track.and_then(|track| track.into_track()) else {
                continue;
            };
            if used.contains(&track.id) {
                continue;
            }
            return Ok(Some(track));
        }

        Ok(None)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> MusicResult<TokenGrant> {
        let endpoint = format!("{}/api/token", self.accounts_url);
        let response = self
            .client
            .post(&endpoint)
            .basic_auth(self.client_id.as_ref(), Some(self.client_secret.as_ref()))
            .form(form)
            .send()
            .await
            .map_err(|source| MusicGatewayError::RequestSend {
                endpoint: endpoint.clone(),
                source,
            })?;

        decode_response(&endpoint, response).await
    }
}

/// Extract a playlist id from a bare id, a web URL, or a service URI.
pub fn parse_playlist_id(input: &str) -> Option<String> {
    let trimmed = input.trim();

    if is_playlist_id(trimmed) {
        return Some(trimmed.to_string());
    }

    if let Some(start) = trimmed.find("playlist/") {
        let candidate: String = trimmed[start + "playlist/".len()..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();
        if is_playlist_id(&candidate) {
            return Some(candidate);
        }
        return None;
    }

    let mut parts = trimmed.split(':');
    if let (Some(scheme), Some("playlist"), Some(id), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    {
        if !scheme.is_empty()
            && scheme.chars().all(|c| c.is_ascii_alphabetic())
            && is_playlist_id(id)
        {
            return Some(id.to_string());
        }
    }

    None
}

fn is_playlist_id(candidate: &str) -> bool {
    candidate.len() == PLAYLIST_ID_LEN && candidate.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Map a response to the decoded JSON body, surfacing rate limits and
/// unexpected statuses as gateway errors.
async fn decode_response<T>(endpoint: &str, response: Response) -> MusicResult<T>
where
    T: DeserializeOwned,
{
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get("Retry-After")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(1);
        return Err(MusicGatewayError::RateLimited { retry_after_secs });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(BODY_SNIPPET_LEN).collect();
        return Err(MusicGatewayError::RequestStatus {
            endpoint: endpoint.to_string(),
            status,
            body: snippet,
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|source| MusicGatewayError::DecodeResponse {
            endpoint: endpoint.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_ID: &str = "37i9dQZF1DXcBWIGoYBM5M";

    #[test]
    fn parses_bare_playlist_id() {
        assert_eq!(parse_playlist_id(SAMPLE_ID), Some(SAMPLE_ID.to_string()));
        assert_eq!(parse_playlist_id(&format!("  {SAMPLE_ID}  ")), Some(SAMPLE_ID.to_string()));
    }

    #[test]
    fn parses_web_url() {
        let url = format!("https://open.example.com/playlist/{SAMPLE_ID}?si=abc123");
        assert_eq!(parse_playlist_id(&url), Some(SAMPLE_ID.to_string()));
    }

    #[test]
    fn parses_service_uri() {
        let uri = format!("spotify:playlist:{SAMPLE_ID}");
        assert_eq!(parse_playlist_id(&uri), Some(SAMPLE_ID.to_string()));
    }

    #[test]
    fn rejects_malformed_references() {
        assert_eq!(parse_playlist_id(""), None);
        assert_eq!(parse_playlist_id("tooshort"), None);
        assert_eq!(parse_playlist_id("not a playlist at all"), None);
        assert_eq!(parse_playlist_id("https://open.example.com/album/abc"), None);
        assert_eq!(parse_playlist_id(&format!("123:playlist:{SAMPLE_ID}")), None);
        assert_eq!(
            parse_playlist_id(&format!("spotify:playlist:{SAMPLE_ID}:extra")),
            None
        );
        // One char short of a valid id.
        assert_eq!(parse_playlist_id(&SAMPLE_ID[1..]), None);
    }

    #[test]
    fn decodes_token_grant_without_refresh_token() {
        let grant: TokenGrant = serde_json::from_str(
            r#"{"access_token":"fresh","token_type":"Bearer","expires_in":3600}"#,
        )
        .expect("token grant should decode");
        assert_eq!(grant.access_token, "fresh");
        assert_eq!(grant.refresh_token, None);
        assert_eq!(grant.expires_in, 3600);
    }

    #[test]
    fn decodes_playlist_metadata() {
        let playlist: models::PlaylistResponse = serde_json::from_str(
            r#"{
                "id": "37i9dQZF1DXcBWIGoYBM5M",
                "name": "Today's Top Hits",
                "images": [{"url": "https://img.example/cover.jpg"}],
                "tracks": {"total": 50}
            }"#,
        )
        .expect("playlist should decode");
        let info = PlaylistInfo::from(playlist);
        assert_eq!(info.name, "Today's Top Hits");
        assert_eq!(info.cover_url.as_deref(), Some("https://img.example/cover.jpg"));
        assert_eq!(info.total_tracks, 50);
    }

    #[test]
    fn local_files_convert_to_no_track() {
        let window: models::PlaylistWindowResponse = serde_json::from_str(
            r#"{"items":[{"is_local":true,"track":{"id":null,"uri":"local:x","name":"Home Demo"}}]}"#,
        )
        .expect("window should decode");
        let item = window.items.into_iter().next().expect("one item");
        assert!(item.is_local);
        assert!(item.track.and_then(|track| track.into_track()).is_none());
    }

    #[test]
    fn full_track_converts_with_album_cover() {
        let window: models::PlaylistWindowResponse = serde_json::from_str(
            r#"{"items":[{"track":{
                "id":"6rqhFgbbKwnb9MLmUQDhG6",
                "uri":"spotify:track:6rqhFgbbKwnb9MLmUQDhG6",
                "name":"Bohemian Rhapsody",
                "artists":[{"id":"1dfeR4HaWDbWqFHLkxsg1d","name":"Queen"}],
                "album":{"name":"A Night at the Opera","images":[{"url":"https://img.example/opera.jpg"}]},
                "duration_ms":354320,
                "preview_url":null
            }}]}"#,
        )
        .expect("window should decode");
        let track = window
            .items
            .into_iter()
            .next()
            .and_then(|item| item.track)
            .and_then(|track| track.into_track())
            .expect("a playable track");
        assert_eq!(track.name, "Bohemian Rhapsody");
        assert_eq!(track.artist_names(), vec!["Queen".to_string()]);
        assert_eq!(track.album_cover_url.as_deref(), Some("https://img.example/opera.jpg"));
    }
}
