use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Track Rush.
#[openapi(
    paths(
        crate::routes::health::health,
        crate::routes::websocket::ws_handler,
        crate::routes::auth::begin_auth,
        crate::routes::auth::auth_callback,
        crate::routes::auth::refresh,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
            crate::dto::ws::PlaybackCommandKind,
            crate::dto::room::RoomSnapshot,
            crate::dto::room::PlayerSnapshot,
            crate::dto::room::GameStateSnapshot,
            crate::dto::room::RoundResultEntry,
            crate::dto::room::PaceBrief,
            crate::dto::room::StandingEntry,
            crate::dto::auth::RefreshRequest,
            crate::dto::auth::RefreshResponse,
            crate::music::models::Track,
            crate::music::models::TrackArtist,
            crate::music::models::PlaylistInfo,
            crate::matching::GuessOutcome,
            crate::registry::room::RoomSettings,
            crate::registry::room::GameStatus,
            crate::registry::room::PauseReason,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "game", description = "WebSocket operations for game clients"),
        (name = "music", description = "OAuth handshake with the music service"),
    )
)]
pub struct ApiDoc;
