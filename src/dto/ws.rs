use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::room::{PaceBrief, PlayerSnapshot, RoomSnapshot, RoundResultEntry, StandingEntry},
    music::{PlaylistInfo, Track},
    registry::PauseReason,
};

/// Messages accepted from game WebSocket clients.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    CreateRoom {
        nickname: String,
    },
    JoinRoom {
        room_code: String,
        nickname: String,
    },
    LeaveRoom,
    StartGame,
    SubmitAnswer {
        song_title: String,
        artist: String,
    },
    RestartGame,
    SetMusicAuth {
        access_token: String,
        refresh_token: String,
        expires_in: u64,
    },
    LoadPlaylist {
        playlist_id: String,
    },
    /// Informational: the host's playback SDK is ready.
    PlaybackReady,
    /// Informational: the host's current track finished on its own.
    PlaybackEnded,
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    pub fn from_json_str(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

/// Playback instruction for the host client.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackCommandKind {
    Play,
    Stop,
}

/// Messages emitted to game WebSocket clients.
///
/// Broadcast to the room unless documented as unicast.
#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Unicast reply to `createRoom`.
    CreateRoomAck {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        room_code: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        player_id: Option<Uuid>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Unicast reply to `joinRoom`.
    JoinRoomAck {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        player_id: Option<Uuid>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Unicast to the joiner with the full room picture.
    RoomJoined {
        room: RoomSnapshot,
        player_id: Uuid,
    },
    RoomUpdated {
        room: RoomSnapshot,
    },
    PlayerJoined {
        player: PlayerSnapshot,
    },
    PlayerLeft {
        player_id: Uuid,
        nickname: String,
    },
    PlayerReconnected {
        player_id: Uuid,
        nickname: String,
    },
    GameStarting {
        starts_in: u64,
    },
    /// Track title and artists are deliberately absent until the reveal.
    RoundStarted {
        round_number: u32,
        duration_ms: u64,
        track_uri: String,
    },
    PlayerSubmitted {
        player_id: Uuid,
        nickname: String,
    },
    RoundEnded {
        track: Track,
        results: Vec<RoundResultEntry>,
        next_round_in: u64,
    },
    EliminationCheck {
        round: u32,
        threshold: u8,
        leader_pace: u8,
        eliminated: Vec<PaceBrief>,
        survivors: Vec<PaceBrief>,
    },
    GameOver {
        #[serde(skip_serializing_if = "Option::is_none")]
        winner_id: Option<Uuid>,
        #[serde(skip_serializing_if = "Option::is_none")]
        winner_nickname: Option<String>,
        final_standings: Vec<StandingEntry>,
    },
    GamePaused {
        reason: PauseReason,
    },
    GameResumed,
    /// Unicast to the host after `setMusicAuth` resolves the account.
    MusicConnected {
        user_id: String,
    },
    /// Unicast to the host after `loadPlaylist`.
    PlaylistLoaded {
        playlist: PlaylistInfo,
        track_count: u32,
    },
    /// Unicast to the host only; other players never receive the track URI
    /// through this channel.
    PlaybackCommand {
        command: PlaybackCommandKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        track_uri: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        position_ms: Option<u64>,
    },
    /// Unicast failure notice.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_parse_from_tagged_json() {
        let parsed = ClientMessage::from_json_str(r#"{"type":"createRoom","nickname":"Alice"}"#)
            .expect("createRoom should parse");
        assert!(matches!(parsed, ClientMessage::CreateRoom { nickname } if nickname == "Alice"));

        let parsed = ClientMessage::from_json_str(
            r#"{"type":"submitAnswer","songTitle":"Hello","artist":"Adele"}"#,
        )
        .expect("submitAnswer should parse");
        assert!(matches!(
            parsed,
            ClientMessage::SubmitAnswer { song_title, artist }
                if song_title == "Hello" && artist == "Adele"
        ));

        let parsed = ClientMessage::from_json_str(r#"{"type":"somethingNew"}"#)
            .expect("unknown types fall back");
        assert!(matches!(parsed, ClientMessage::Unknown));
    }

    #[test]
    fn server_messages_serialize_with_camel_case_payloads() {
        let message = ServerMessage::RoundStarted {
            round_number: 3,
            duration_ms: 60_000,
            track_uri: "spotify:track:abc".into(),
        };
        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(value["type"], "roundStarted");
        assert_eq!(value["roundNumber"], 3);
        assert_eq!(value["durationMs"], 60_000);
        assert_eq!(value["trackUri"], "spotify:track:abc");
    }

    #[test]
    fn ack_omits_absent_fields() {
        let message = ServerMessage::CreateRoomAck {
            success: false,
            room_code: None,
            player_id: None,
            error: Some("nope".into()),
        };
        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(value["type"], "createRoomAck");
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "nope");
        assert!(value.get("roomCode").is_none());
        assert!(value.get("playerId").is_none());
    }

    #[test]
    fn playback_command_serializes_lowercase() {
        let message = ServerMessage::PlaybackCommand {
            command: PlaybackCommandKind::Play,
            track_uri: Some("spotify:track:abc".into()),
            position_ms: Some(0),
        };
        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(value["command"], "play");
        assert_eq!(value["positionMs"], 0);
    }
}
