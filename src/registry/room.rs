//! Room and player domain types.

use std::{
    collections::HashSet,
    time::{Instant, SystemTime},
};

use indexmap::IndexMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    matching::GuessOutcome,
    music::{MusicAuth, PlaylistInfo, Track},
};

/// Alphabet for room codes; visually ambiguous characters (I, O, 0, 1) are
/// excluded.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Number of characters in a room code.
pub const ROOM_CODE_LEN: usize = 4;

/// Starting pace for every player.
pub const INITIAL_PACE: u8 = 10;

/// Per-room gameplay settings.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    pub max_players: usize,
    pub round_duration_ms: u64,
    pub reveal_duration_ms: u64,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            max_players: 10,
            round_duration_ms: 60_000,
            reveal_duration_ms: 8_000,
        }
    }
}

/// Lifecycle status of a room's game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    Lobby,
    Starting,
    Playing,
    RoundReveal,
    EliminationCheck,
    GameOver,
}

/// Why an in-progress game is paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum PauseReason {
    HostDisconnected,
}

/// Mutable gameplay state of a room.
#[derive(Debug, Clone)]
pub struct GameState {
    pub status: GameStatus,
    /// 0 while in the lobby, then increments once per round.
    pub current_round: u32,
    pub current_track: Option<Track>,
    pub round_start_ms: Option<u64>,
    pub round_end_ms: Option<u64>,
    pub is_paused: bool,
    pub pause_reason: Option<PauseReason>,
    pub winner_id: Option<Uuid>,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            status: GameStatus::Lobby,
            current_round: 0,
            current_track: None,
            round_start_ms: None,
            round_end_ms: None,
            is_paused: false,
            pause_reason: None,
            winner_id: None,
        }
    }
}

/// A round submission as recorded by the server.
#[derive(Debug, Clone)]
pub struct Answer {
    pub song_title: String,
    pub artist: String,
    pub submitted_at_ms: u64,
}

/// A participant in a room. Records survive disconnects so the nickname can
/// reclaim the slot; only an explicit leave removes them.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: Uuid,
    pub nickname: String,
    pub pace: u8,
    pub is_host: bool,
    pub is_eliminated: bool,
    pub is_connected: bool,
    pub has_submitted: bool,
    pub current_answer: Option<Answer>,
    pub last_round_outcome: Option<GuessOutcome>,
    /// Round after which the player was eliminated, for final standings.
    pub eliminated_in_round: Option<u32>,
    pub connection_id: Option<Uuid>,
}

impl Player {
    /// Create a connected player with the default pace.
    pub fn new(nickname: String, is_host: bool, connection_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            nickname,
            pace: INITIAL_PACE,
            is_host,
            is_eliminated: false,
            is_connected: true,
            has_submitted: false,
            current_answer: None,
            last_round_outcome: None,
            eliminated_in_round: None,
            connection_id: Some(connection_id),
        }
    }

    /// Whether the player takes part in the current round.
    pub fn is_active(&self) -> bool {
        self.is_connected && !self.is_eliminated
    }

    /// Reset gameplay state back to a fresh game.
    pub fn reset_for_new_game(&mut self) {
        self.pace = INITIAL_PACE;
        self.is_eliminated = false;
        self.has_submitted = false;
        self.current_answer = None;
        self.last_round_outcome = None;
        self.eliminated_in_round = None;
    }

    /// Clear the per-round submission fields.
    pub fn reset_for_round(&mut self) {
        self.has_submitted = false;
        self.current_answer = None;
        self.last_round_outcome = None;
    }
}

/// Cancellable per-room timer handles. The round and reveal timers are
/// mutually exclusive; arming one cancels the other. Cancellation is
/// best-effort; fired callbacks re-validate room status under the lock.
#[derive(Debug, Default)]
pub struct RoomTimers {
    round: Option<JoinHandle<()>>,
    reveal: Option<JoinHandle<()>>,
}

impl RoomTimers {
    /// Arm the round timer, cancelling whatever was armed before.
    pub fn arm_round(&mut self, handle: JoinHandle<()>) {
        self.cancel_all();
        self.round = Some(handle);
    }

    /// Arm the reveal timer, cancelling whatever was armed before.
    pub fn arm_reveal(&mut self, handle: JoinHandle<()>) {
        self.cancel_all();
        self.reveal = Some(handle);
    }

    pub fn cancel_round(&mut self) {
        if let Some(handle) = self.round.take() {
            handle.abort();
        }
    }

    pub fn cancel_reveal(&mut self) {
        if let Some(handle) = self.reveal.take() {
            handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        self.cancel_round();
        self.cancel_reveal();
    }
}

/// A named room and everything scoped to it.
#[derive(Debug)]
pub struct Room {
    pub code: String,
    pub host_id: Uuid,
    /// Insertion order is preserved; host succession follows it.
    pub players: IndexMap<Uuid, Player>,
    pub game: GameState,
    pub music_auth: Option<MusicAuth>,
    pub playlist: Option<PlaylistInfo>,
    /// Track ids already played within the current game.
    pub used_track_ids: HashSet<String>,
    pub created_at: SystemTime,
    pub settings: RoomSettings,
    pub timers: RoomTimers,
    /// Start of the current load-playlist cooldown window.
    pub last_playlist_load: Option<Instant>,
}

impl Room {
    /// Create a room hosted by `host`.
    pub fn new(code: String, host: Player) -> Self {
        let host_id = host.id;
        let mut players = IndexMap::new();
        players.insert(host_id, host);

        Self {
            code,
            host_id,
            players,
            game: GameState::default(),
            music_auth: None,
            playlist: None,
            used_track_ids: HashSet::new(),
            created_at: SystemTime::now(),
            settings: RoomSettings::default(),
            timers: RoomTimers::default(),
            last_playlist_load: None,
        }
    }

    /// Players participating in the current round.
    pub fn active_players(&self) -> impl Iterator<Item = &Player> {
        self.players.values().filter(|player| player.is_active())
    }

    pub fn connected_count(&self) -> usize {
        self.players.values().filter(|player| player.is_connected).count()
    }

    /// Find a player by case-insensitive nickname.
    pub fn player_by_nickname(&self, nickname: &str) -> Option<&Player> {
        self.players
            .values()
            .find(|player| player.nickname.eq_ignore_ascii_case(nickname))
    }

    /// Whether every active player has submitted an answer this round.
    pub fn all_active_submitted(&self) -> bool {
        let mut any = false;
        for player in self.active_players() {
            any = true;
            if !player.has_submitted {
                return false;
            }
        }
        any
    }

    /// Promote the first remaining player (insertion order) to host.
    ///
    /// Returns the new host id. Panics if the room is empty; callers delete
    /// empty rooms before reaching this point.
    pub fn promote_next_host(&mut self) -> Uuid {
        let next_id = *self
            .players
            .keys()
            .next()
            .expect("promote_next_host called on an empty room");
        for (id, player) in self.players.iter_mut() {
            player.is_host = *id == next_id;
        }
        self.host_id = next_id;
        next_id
    }
}

/// Draw a 4-character room code from the unambiguous alphabet.
pub fn generate_room_code<R: Rng>(rng: &mut R) -> String {
    (0..ROOM_CODE_LEN)
        .map(|_| {
            let index = rng.random_range(0..ROOM_CODE_ALPHABET.len());
            ROOM_CODE_ALPHABET[index] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_codes_use_the_allowed_alphabet() {
        let mut rng = rand::rng();
        for _ in 0..200 {
            let code = generate_room_code(&mut rng);
            assert_eq!(code.len(), ROOM_CODE_LEN);
            assert!(
                code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b)),
                "unexpected character in {code}"
            );
            for forbidden in ['I', 'O', '0', '1'] {
                assert!(!code.contains(forbidden));
            }
        }
    }

    #[test]
    fn host_promotion_follows_insertion_order() {
        let host = Player::new("alice".into(), true, Uuid::new_v4());
        let mut room = Room::new("ABCD".into(), host);
        let second = Player::new("bob".into(), false, Uuid::new_v4());
        let second_id = second.id;
        let third = Player::new("carol".into(), false, Uuid::new_v4());
        room.players.insert(second.id, second);
        room.players.insert(third.id, third);

        let old_host = room.host_id;
        room.players.shift_remove(&old_host);
        let promoted = room.promote_next_host();

        assert_eq!(promoted, second_id);
        assert!(room.players[&second_id].is_host);
        assert_eq!(
            room.players.values().filter(|player| player.is_host).count(),
            1
        );
    }

    #[test]
    fn all_active_submitted_ignores_eliminated_and_disconnected() {
        let host = Player::new("alice".into(), true, Uuid::new_v4());
        let mut room = Room::new("ABCD".into(), host);
        let mut eliminated = Player::new("bob".into(), false, Uuid::new_v4());
        eliminated.is_eliminated = true;
        let mut offline = Player::new("carol".into(), false, Uuid::new_v4());
        offline.is_connected = false;
        room.players.insert(eliminated.id, eliminated);
        room.players.insert(offline.id, offline);

        assert!(!room.all_active_submitted());

        let host_id = room.host_id;
        room.players[&host_id].has_submitted = true;
        assert!(room.all_active_submitted());
    }
}
