//! Outbound projections of rooms and players.
//!
//! Snapshots never carry music tokens, the used-track set, or the current
//! track (which is only revealed through `roundEnded`).

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::format_system_time,
    matching::GuessOutcome,
    music::PlaylistInfo,
    registry::{
        Player, Room,
        room::{GameStatus, PauseReason, RoomSettings},
    },
};

/// Serialized room as broadcast to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub code: String,
    pub host_id: Uuid,
    /// Players in join order.
    pub players: Vec<PlayerSnapshot>,
    pub game_state: GameStateSnapshot,
    pub has_music_auth: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist: Option<PlaylistInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_count: Option<u32>,
    pub settings: RoomSettings,
    pub created_at: String,
}

impl RoomSnapshot {
    pub fn from_room(room: &Room) -> Self {
        Self {
            code: room.code.clone(),
            host_id: room.host_id,
            players: room.players.values().map(PlayerSnapshot::from_player).collect(),
            game_state: GameStateSnapshot::from_room(room),
            has_music_auth: room.music_auth.is_some(),
            playlist: room.playlist.clone(),
            track_count: room.playlist.as_ref().map(|playlist| playlist.total_tracks),
            settings: room.settings.clone(),
            created_at: format_system_time(room.created_at),
        }
    }
}

/// Serialized player as embedded in snapshots and join events.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: Uuid,
    pub nickname: String,
    pub pace: u8,
    pub is_host: bool,
    pub is_eliminated: bool,
    pub is_connected: bool,
    pub has_submitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_round_result: Option<GuessOutcome>,
}

impl PlayerSnapshot {
    pub fn from_player(player: &Player) -> Self {
        Self {
            id: player.id,
            nickname: player.nickname.clone(),
            pace: player.pace,
            is_host: player.is_host,
            is_eliminated: player.is_eliminated,
            is_connected: player.is_connected,
            has_submitted: player.has_submitted,
            last_round_result: player.last_round_outcome,
        }
    }
}

/// Serialized gameplay state.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameStateSnapshot {
    pub status: GameStatus,
    pub current_round: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_start_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_end_time: Option<u64>,
    pub is_paused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause_reason: Option<PauseReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<Uuid>,
}

impl GameStateSnapshot {
    pub fn from_room(room: &Room) -> Self {
        Self {
            status: room.game.status,
            current_round: room.game.current_round,
            round_start_time: room.game.round_start_ms,
            round_end_time: room.game.round_end_ms,
            is_paused: room.game.is_paused,
            pause_reason: room.game.pause_reason,
            winner_id: room.game.winner_id,
        }
    }
}

/// Per-player outcome inside a `roundEnded` event.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoundResultEntry {
    pub player_id: Uuid,
    pub nickname: String,
    pub result: GuessOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub song_correct: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist_correct: Option<bool>,
    pub pace: u8,
    pub submitted: bool,
}

/// Player reference with pace, used by elimination events.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaceBrief {
    pub player_id: Uuid,
    pub nickname: String,
    pub pace: u8,
}

impl PaceBrief {
    pub fn from_player(player: &Player) -> Self {
        Self {
            player_id: player.id,
            nickname: player.nickname.clone(),
            pace: player.pace,
        }
    }
}

/// Final ranking entry inside a `gameOver` event.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StandingEntry {
    pub position: u32,
    pub player_id: Uuid,
    pub nickname: String,
    pub pace: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eliminated_in_round: Option<u32>,
}
