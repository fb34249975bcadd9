//! Per-room round state machine: countdown, track fetch, submissions,
//! scoring, eliminations, and game end.
//!
//! Every operation runs under the registry lock. The lock is never held
//! across music gateway calls; fetch results are re-validated against the
//! room's status before being applied. Timer callbacks do the same, so a
//! cancelled-but-already-started timer degrades to a no-op.

use std::{
    collections::HashSet,
    future::Future,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        room::{PaceBrief, RoomSnapshot, RoundResultEntry, StandingEntry},
        ws::{PlaybackCommandKind, ServerMessage},
    },
    error::ServiceError,
    matching::{self, GuessOutcome},
    registry::{GameStatus, Room, room::Answer},
    state::SharedState,
};

/// Countdown between `gameStarting` and the first round.
const GAME_START_DELAY: Duration = Duration::from_secs(5);
/// Pause after an elimination check before the game moves on.
const POST_ELIMINATION_DELAY: Duration = Duration::from_secs(3);
/// Connected players required to start a game.
const MIN_PLAYERS: usize = 2;

/// Start the game in the caller's room. Host-only.
pub async fn start_game(state: &SharedState, connection_id: Uuid) -> Result<(), ServiceError> {
    let mut registry = state.registry().lock().await;
    let room = registry
        .room_mut_by_connection(connection_id)
        .ok_or_else(|| ServiceError::NotFound("you are not in a room".into()))?;

    ensure_host(room, connection_id)?;

    if room.game.status != GameStatus::Lobby {
        return Err(ServiceError::InvalidState(
            "game can only start from the lobby".into(),
        ));
    }
    if room.connected_count() < MIN_PLAYERS {
        return Err(ServiceError::InvalidState(format!(
            "at least {MIN_PLAYERS} connected players are required"
        )));
    }
    if room.music_auth.is_none() {
        return Err(ServiceError::InvalidState(
            "host has not connected the music service".into(),
        ));
    }
    if room.playlist.is_none() {
        return Err(ServiceError::InvalidState("no playlist loaded".into()));
    }

    for player in room.players.values_mut() {
        player.reset_for_new_game();
    }
    room.used_track_ids.clear();
    room.game = Default::default();
    room.game.status = GameStatus::Starting;

    state.broadcast_to_room(
        room,
        &ServerMessage::GameStarting {
            starts_in: GAME_START_DELAY.as_millis() as u64,
        },
    );

    let code = room.code.clone();
    let handle = schedule(GAME_START_DELAY, start_next_round(state.clone(), code.clone()));
    room.timers.arm_reveal(handle);

    info!(%code, "game starting");
    Ok(())
}

/// Record a player's answer for the current round.
pub async fn submit_answer(
    state: &SharedState,
    connection_id: Uuid,
    song_title: String,
    artist: String,
) -> Result<(), ServiceError> {
    let mut registry = state.registry().lock().await;
    let room = registry
        .room_mut_by_connection(connection_id)
        .ok_or_else(|| ServiceError::NotFound("you are not in a room".into()))?;

    if room.game.status != GameStatus::Playing || room.game.is_paused {
        return Err(ServiceError::InvalidState("no round in progress".into()));
    }

    let (player_id, nickname, first_submission) = {
        let player = room
            .players
            .values_mut()
            .find(|player| player.connection_id == Some(connection_id))
            .ok_or_else(|| ServiceError::NotFound("player record not found".into()))?;
        if player.is_eliminated {
            return Err(ServiceError::InvalidState(
                "eliminated players cannot submit".into(),
            ));
        }

        let first_submission = !player.has_submitted;
        player.current_answer = Some(Answer {
            song_title,
            artist,
            submitted_at_ms: now_ms(),
        });
        player.has_submitted = true;
        (player.id, player.nickname.clone(), first_submission)
    };

    if first_submission {
        state.broadcast_to_room(
            room,
            &ServerMessage::PlayerSubmitted {
                player_id,
                nickname,
            },
        );
    }

    if room.all_active_submitted() {
        room.timers.cancel_round();
        finish_round(state, room);
    }

    Ok(())
}

/// Host-only: abandon the current game and return the room to the lobby.
pub async fn restart_game(state: &SharedState, connection_id: Uuid) -> Result<(), ServiceError> {
    let mut registry = state.registry().lock().await;
    let room = registry
        .room_mut_by_connection(connection_id)
        .ok_or_else(|| ServiceError::NotFound("you are not in a room".into()))?;

    ensure_host(room, connection_id)?;

    room.timers.cancel_all();
    room.game = Default::default();
    room.used_track_ids.clear();
    for player in room.players.values_mut() {
        player.reset_for_new_game();
    }

    state.broadcast_to_room(
        room,
        &ServerMessage::RoomUpdated {
            room: RoomSnapshot::from_room(room),
        },
    );

    info!(code = %room.code, "game restarted to lobby");
    Ok(())
}

/// Resume a room paused by a host disconnect, forfeiting the interrupted
/// round when one was in flight.
pub async fn resume_game(state: &SharedState, code: &str) {
    let was_playing = {
        let mut registry = state.registry().lock().await;
        let Some(room) = registry.room_mut(code) else {
            return;
        };
        if !room.game.is_paused {
            return;
        }

        room.game.is_paused = false;
        room.game.pause_reason = None;
        state.broadcast_to_room(room, &ServerMessage::GameResumed);
        info!(%code, "game resumed");
        room.game.status == GameStatus::Playing
    };

    if was_playing {
        start_next_round(state.clone(), code.to_string()).await;
    }
}

/// Begin the next round: fetch a fresh track and broadcast the round start.
///
/// Invoked by the post-countdown, post-reveal, and post-elimination timers,
/// and directly on resume.
pub(crate) async fn start_next_round(state: SharedState, code: String) {
    // Snapshot what the fetch needs, then release the lock for the network.
    let (auth, playlist, used) = {
        let mut registry = state.registry().lock().await;
        let Some(room) = registry.room_mut(&code) else {
            return;
        };
        if room.game.is_paused || is_settled(room) {
            return;
        }

        let active: Vec<Uuid> = room.active_players().map(|player| player.id).collect();
        if active.len() <= 1 {
            conclude_game(&state, room, active.first().copied());
            return;
        }

        let Some(auth) = room.music_auth.clone() else {
            warn!(%code, "music auth missing mid-game, ending game");
            conclude_game(&state, room, None);
            return;
        };
        let Some(playlist) = room.playlist.clone() else {
            warn!(%code, "playlist missing mid-game, ending game");
            conclude_game(&state, room, None);
            return;
        };
        (auth, playlist, room.used_track_ids.clone())
    };

    let fresh_auth = match state.gateway().ensure_valid_token(&auth).await {
        Ok(fresh) => fresh,
        Err(err) => {
            warn!(%code, error = %err, "token refresh failed, ending game");
            conclude_room(state.clone(), code.clone(), None).await;
            return;
        }
    };

    let fetch = |used: HashSet<String>| {
        let state = state.clone();
        let token = fresh_auth.access_token.clone();
        let playlist_id = playlist.id.clone();
        let total = playlist.total_tracks;
        async move {
            state
                .gateway()
                .random_track(&token, &playlist_id, total, &used)
                .await
        }
    };

    let mut track = match fetch(used).await {
        Ok(track) => track,
        Err(err) => {
            warn!(%code, error = %err, "track fetch failed, ending game");
            conclude_room(state.clone(), code.clone(), None).await;
            return;
        }
    };

    if track.is_none() {
        // The playlist may simply be exhausted: clear the used set once and
        // try again before declaring the game over.
        {
            let mut registry = state.registry().lock().await;
            let Some(room) = registry.room_mut(&code) else {
                return;
            };
            if room.game.is_paused || is_settled(room) {
                return;
            }
            room.used_track_ids.clear();
        }

        track = match fetch(HashSet::new()).await {
            Ok(track) => track,
            Err(err) => {
                warn!(%code, error = %err, "track fetch failed, ending game");
                conclude_room(state.clone(), code.clone(), None).await;
                return;
            }
        };
    }

    let Some(track) = track else {
        info!(%code, "no playable track available, ending game");
        conclude_room(state.clone(), code.clone(), None).await;
        return;
    };

    // Re-acquire and re-validate: the room may have restarted, emptied, or
    // paused while the fetch was in flight.
    let mut registry = state.registry().lock().await;
    let Some(room) = registry.room_mut(&code) else {
        return;
    };
    if room.game.is_paused || is_settled(room) {
        return;
    }

    if fresh_auth.access_token != auth.access_token {
        room.music_auth = Some(fresh_auth);
    }

    room.used_track_ids.insert(track.id.clone());
    for player in room.players.values_mut() {
        player.reset_for_round();
    }

    room.game.current_round += 1;
    room.game.status = GameStatus::Playing;
    let started_at = now_ms();
    room.game.round_start_ms = Some(started_at);
    room.game.round_end_ms = Some(started_at + room.settings.round_duration_ms);
    room.game.current_track = Some(track.clone());

    state.broadcast_to_room(
        room,
        &ServerMessage::RoundStarted {
            round_number: room.game.current_round,
            duration_ms: room.settings.round_duration_ms,
            track_uri: track.uri.clone(),
        },
    );
    state.send_to_host(
        room,
        &ServerMessage::PlaybackCommand {
            command: PlaybackCommandKind::Play,
            track_uri: Some(track.uri),
            position_ms: Some(0),
        },
    );

    let handle = schedule(
        Duration::from_millis(room.settings.round_duration_ms),
        end_round_by_timer(state.clone(), code.clone()),
    );
    room.timers.arm_round(handle);

    info!(%code, round = room.game.current_round, "round started");
}

/// Round timer callback.
async fn end_round_by_timer(state: SharedState, code: String) {
    let mut registry = state.registry().lock().await;
    let Some(room) = registry.room_mut(&code) else {
        return;
    };
    if room.game.status != GameStatus::Playing || room.game.is_paused {
        return;
    }
    finish_round(&state, room);
}

/// Score the round, reveal the track, and arm the reveal timer.
fn finish_round(state: &SharedState, room: &mut Room) {
    room.timers.cancel_round();
    state.send_to_host(
        room,
        &ServerMessage::PlaybackCommand {
            command: PlaybackCommandKind::Stop,
            track_uri: None,
            position_ms: None,
        },
    );

    let Some(track) = room.game.current_track.clone() else {
        warn!(code = %room.code, "round ended without a current track");
        return;
    };

    room.game.status = GameStatus::RoundReveal;

    let artist_names = track.artist_names();
    let mut results = Vec::new();
    for player in room.players.values_mut().filter(|player| !player.is_eliminated) {
        let (outcome, song_correct, artist_correct, submitted) = match &player.current_answer {
            Some(answer) if player.has_submitted => {
                let score = matching::score_answer(
                    &answer.song_title,
                    &answer.artist,
                    &track.name,
                    &artist_names,
                );
                (
                    score.outcome,
                    Some(score.song_correct),
                    Some(score.artist_correct),
                    true,
                )
            }
            _ => (GuessOutcome::None, None, None, false),
        };

        player.pace = matching::apply_pace_delta(player.pace, matching::pace_delta(outcome));
        player.last_round_outcome = Some(outcome);
        results.push(RoundResultEntry {
            player_id: player.id,
            nickname: player.nickname.clone(),
            result: outcome,
            song_correct,
            artist_correct,
            pace: player.pace,
            submitted,
        });
    }

    let next_round_in = room.settings.reveal_duration_ms;
    state.broadcast_to_room(
        room,
        &ServerMessage::RoundEnded {
            track,
            results,
            next_round_in,
        },
    );

    let code = room.code.clone();
    let delay = Duration::from_millis(next_round_in);
    let handle = if matching::is_elimination_round(room.game.current_round) {
        schedule(delay, run_elimination_check(state.clone(), code))
    } else {
        schedule(delay, start_next_round(state.clone(), code))
    };
    room.timers.arm_reveal(handle);
}

/// Reveal timer callback on every sixth round.
async fn run_elimination_check(state: SharedState, code: String) {
    let mut registry = state.registry().lock().await;
    let Some(room) = registry.room_mut(&code) else {
        return;
    };
    if room.game.status != GameStatus::RoundReveal || room.game.is_paused {
        return;
    }

    room.game.status = GameStatus::EliminationCheck;
    let report = apply_eliminations(room);
    state.broadcast_to_room(
        room,
        &ServerMessage::EliminationCheck {
            round: report.round,
            threshold: report.threshold,
            leader_pace: report.leader_pace,
            eliminated: report.eliminated,
            survivors: report.survivors.clone(),
        },
    );

    let handle = if report.survivors.len() <= 1 {
        let winner = report.survivors.first().map(|brief| brief.player_id);
        schedule(
            POST_ELIMINATION_DELAY,
            conclude_room(state.clone(), code.clone(), winner),
        )
    } else {
        schedule(POST_ELIMINATION_DELAY, start_next_round(state.clone(), code))
    };
    room.timers.arm_reveal(handle);
}

/// Everything broadcast by one elimination check.
struct EliminationReport {
    round: u32,
    threshold: u8,
    leader_pace: u8,
    eliminated: Vec<PaceBrief>,
    survivors: Vec<PaceBrief>,
}

/// Mark players whose pace lags the leader by at least the round threshold.
fn apply_eliminations(room: &mut Room) -> EliminationReport {
    let round = room.game.current_round;
    let threshold = matching::elimination_threshold(round);
    let leader_pace = room
        .players
        .values()
        .filter(|player| !player.is_eliminated)
        .map(|player| player.pace)
        .max()
        .unwrap_or(0);

    let mut eliminated = Vec::new();
    let mut survivors = Vec::new();
    for player in room.players.values_mut().filter(|player| !player.is_eliminated) {
        let gap = leader_pace.saturating_sub(player.pace);
        if gap >= threshold {
            player.is_eliminated = true;
            player.eliminated_in_round = Some(round);
            eliminated.push(PaceBrief::from_player(player));
        } else {
            survivors.push(PaceBrief::from_player(player));
        }
    }

    info!(
        code = %room.code,
        round,
        threshold,
        leader_pace,
        eliminated = eliminated.len(),
        survivors = survivors.len(),
        "elimination check"
    );

    EliminationReport {
        round,
        threshold,
        leader_pace,
        eliminated,
        survivors,
    }
}

/// Lock the registry and conclude the game unless the room already settled.
async fn conclude_room(state: SharedState, code: String, winner: Option<Uuid>) {
    let mut registry = state.registry().lock().await;
    let Some(room) = registry.room_mut(&code) else {
        return;
    };
    if is_settled(room) {
        return;
    }
    conclude_game(&state, room, winner);
}

/// Terminal transition: stop playback, compute standings, broadcast the
/// winner. Safe to call from any non-settled status.
fn conclude_game(state: &SharedState, room: &mut Room, winner: Option<Uuid>) {
    room.timers.cancel_all();
    state.send_to_host(
        room,
        &ServerMessage::PlaybackCommand {
            command: PlaybackCommandKind::Stop,
            track_uri: None,
            position_ms: None,
        },
    );

    room.game.status = GameStatus::GameOver;
    room.game.is_paused = false;
    room.game.pause_reason = None;
    room.game.winner_id = winner;

    let final_standings = compute_standings(room, winner);
    let winner_nickname = winner
        .and_then(|id| room.players.get(&id))
        .map(|player| player.nickname.clone());

    state.broadcast_to_room(
        room,
        &ServerMessage::GameOver {
            winner_id: winner,
            winner_nickname,
            final_standings,
        },
    );

    info!(code = %room.code, ?winner, "game over");
}

/// Final ranking: winner first, survivors before eliminated, eliminated by
/// later round first, ties by higher pace.
fn compute_standings(room: &Room, winner: Option<Uuid>) -> Vec<StandingEntry> {
    let mut players: Vec<_> = room.players.values().collect();
    players.sort_by(|a, b| {
        let a_winner = Some(a.id) == winner;
        let b_winner = Some(b.id) == winner;
        b_winner
            .cmp(&a_winner)
            .then_with(|| a.is_eliminated.cmp(&b.is_eliminated))
            .then_with(|| {
                b.eliminated_in_round
                    .unwrap_or(0)
                    .cmp(&a.eliminated_in_round.unwrap_or(0))
            })
            .then_with(|| b.pace.cmp(&a.pace))
    });

    players
        .into_iter()
        .enumerate()
        .map(|(index, player)| StandingEntry {
            position: index as u32 + 1,
            player_id: player.id,
            nickname: player.nickname.clone(),
            pace: player.pace,
            eliminated_in_round: player.eliminated_in_round,
        })
        .collect()
}

/// Whether the room reached a state where in-flight round work must be
/// discarded.
fn is_settled(room: &Room) -> bool {
    matches!(room.game.status, GameStatus::Lobby | GameStatus::GameOver)
}

fn ensure_host(room: &Room, connection_id: Uuid) -> Result<(), ServiceError> {
    let is_host = room
        .players
        .get(&room.host_id)
        .and_then(|host| host.connection_id)
        == Some(connection_id);
    if is_host {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized(
            "only the host can do that".into(),
        ))
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Run `task` after `delay` on the runtime; the handle is abortable.
fn schedule<F>(delay: Duration, task: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        task.await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{AppConfig, Environment, MusicConfig, ServerConfig},
        music::{MusicAuth, PlaylistInfo},
        registry::Player,
    };

    fn test_state() -> SharedState {
        let config = AppConfig {
            music: MusicConfig {
                client_id: "client".into(),
                client_secret: "secret".into(),
                redirect_uri: "http://localhost:8080/api/music/callback".into(),
                accounts_base_url: "http://localhost:9/accounts".into(),
                api_base_url: "http://localhost:9/api".into(),
            },
            server: ServerConfig {
                base_url: "http://localhost:3000".into(),
                port: 0,
                environment: Environment::Development,
            },
        };
        crate::state::AppState::new(config).expect("test state")
    }

    fn room_with_paces(paces: &[(&str, u8)]) -> Room {
        let mut players = paces.iter();
        let (host_name, host_pace) = players.next().expect("at least one player");
        let mut host = Player::new(host_name.to_string(), true, Uuid::new_v4());
        host.pace = *host_pace;
        let mut room = Room::new("ABCD".into(), host);
        for (name, pace) in players {
            let mut player = Player::new(name.to_string(), false, Uuid::new_v4());
            player.pace = *pace;
            room.players.insert(player.id, player);
        }
        room
    }

    #[test]
    fn round_six_with_wide_gaps_eliminates_nobody() {
        let mut room = room_with_paces(&[("lead", 10), ("mid", 3), ("trail", 1)]);
        room.game.current_round = 6;

        let report = apply_eliminations(&mut room);

        assert_eq!(report.threshold, 10);
        assert_eq!(report.leader_pace, 10);
        assert!(report.eliminated.is_empty());
        assert_eq!(report.survivors.len(), 3);
    }

    #[test]
    fn round_twelve_eliminates_the_laggards() {
        let mut room = room_with_paces(&[("lead", 10), ("mid", 1), ("trail", 0)]);
        room.game.current_round = 12;

        let report = apply_eliminations(&mut room);

        assert_eq!(report.threshold, 9);
        let eliminated: Vec<&str> = report
            .eliminated
            .iter()
            .map(|brief| brief.nickname.as_str())
            .collect();
        assert_eq!(eliminated, vec!["mid", "trail"]);
        assert_eq!(report.survivors.len(), 1);
        assert_eq!(report.survivors[0].nickname, "lead");

        // Elimination rounds are recorded for the final standings.
        let marked = room
            .players
            .values()
            .filter(|player| player.eliminated_in_round == Some(12))
            .count();
        assert_eq!(marked, 2);
    }

    #[test]
    fn elimination_is_exactly_the_gap_rule() {
        let mut room = room_with_paces(&[("a", 10), ("b", 9), ("c", 1), ("d", 0)]);
        room.game.current_round = 12; // threshold 9

        apply_eliminations(&mut room);

        for player in room.players.values() {
            let gap = 10 - player.pace;
            assert_eq!(
                player.is_eliminated,
                gap >= 9,
                "player {} with gap {gap}",
                player.nickname
            );
        }
    }

    #[test]
    fn standings_rank_winner_then_survivors_then_late_eliminations() {
        let mut room = room_with_paces(&[("winner", 8), ("runner", 9), ("late", 4), ("early", 7)]);
        let ids: Vec<Uuid> = room.players.keys().copied().collect();
        let winner_id = ids[0];

        room.players[&ids[2]].is_eliminated = true;
        room.players[&ids[2]].eliminated_in_round = Some(12);
        room.players[&ids[3]].is_eliminated = true;
        room.players[&ids[3]].eliminated_in_round = Some(6);

        let standings = compute_standings(&room, Some(winner_id));
        let order: Vec<&str> = standings
            .iter()
            .map(|entry| entry.nickname.as_str())
            .collect();

        // Winner outranks the higher-paced survivor; the round-12 elimination
        // outranks the round-6 one despite the lower pace.
        assert_eq!(order, vec!["winner", "runner", "late", "early"]);
        assert_eq!(standings[0].position, 1);
        assert_eq!(standings[3].position, 4);
    }

    #[tokio::test]
    async fn start_game_rejects_strangers_and_non_hosts() {
        let state = test_state();
        let err = start_game(&state, Uuid::new_v4())
            .await
            .expect_err("stranger cannot start");
        assert!(matches!(err, ServiceError::NotFound(_)));

        let guest_conn = Uuid::new_v4();
        {
            let mut registry = state.registry().lock().await;
            let created = registry.create_room("host".into(), Uuid::new_v4());
            registry
                .join_room(&created.room_code, "guest".into(), guest_conn)
                .expect("join");
        }
        let err = start_game(&state, guest_conn)
            .await
            .expect_err("guest cannot start");
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn start_game_checks_players_auth_and_playlist() {
        let state = test_state();
        let host_conn = Uuid::new_v4();
        let code = {
            let mut registry = state.registry().lock().await;
            registry.create_room("host".into(), host_conn).room_code
        };

        let err = start_game(&state, host_conn)
            .await
            .expect_err("one player is not enough");
        assert!(matches!(err, ServiceError::InvalidState(_)));

        {
            let mut registry = state.registry().lock().await;
            registry
                .join_room(&code, "guest".into(), Uuid::new_v4())
                .expect("join");
        }
        let err = start_game(&state, host_conn)
            .await
            .expect_err("music auth is required");
        assert!(matches!(err, ServiceError::InvalidState(_)));

        {
            let mut registry = state.registry().lock().await;
            let room = registry.room_mut(&code).expect("room");
            room.music_auth = Some(MusicAuth::new("token".into(), "refresh".into(), 3600));
        }
        let err = start_game(&state, host_conn)
            .await
            .expect_err("playlist is required");
        assert!(matches!(err, ServiceError::InvalidState(_)));

        {
            let mut registry = state.registry().lock().await;
            let room = registry.room_mut(&code).expect("room");
            room.playlist = Some(PlaylistInfo {
                id: "37i9dQZF1DXcBWIGoYBM5M".into(),
                name: "Hits".into(),
                cover_url: None,
                total_tracks: 40,
            });
        }
        start_game(&state, host_conn).await.expect("all preconditions met");

        let registry = state.registry().lock().await;
        let room = registry.room(&code).expect("room");
        assert_eq!(room.game.status, GameStatus::Starting);
        assert!(room.used_track_ids.is_empty());
        assert!(room.players.values().all(|player| player.pace == 10));
    }

    #[tokio::test]
    async fn submit_is_rejected_outside_a_round() {
        let state = test_state();
        let host_conn = Uuid::new_v4();
        {
            let mut registry = state.registry().lock().await;
            registry.create_room("host".into(), host_conn);
        }

        let err = submit_answer(&state, host_conn, "Hello".into(), "Adele".into())
            .await
            .expect_err("lobby has no round");
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn restart_returns_a_finished_game_to_the_lobby() {
        let state = test_state();
        let host_conn = Uuid::new_v4();
        let code = {
            let mut registry = state.registry().lock().await;
            let created = registry.create_room("host".into(), host_conn);
            let room = registry.room_mut(&created.room_code).expect("room");
            room.game.status = GameStatus::GameOver;
            room.game.current_round = 14;
            room.used_track_ids.insert("track".into());
            for player in room.players.values_mut() {
                player.pace = 3;
                player.is_eliminated = true;
                player.eliminated_in_round = Some(12);
            }
            created.room_code
        };

        restart_game(&state, host_conn).await.expect("host restarts");

        let registry = state.registry().lock().await;
        let room = registry.room(&code).expect("room");
        assert_eq!(room.game.status, GameStatus::Lobby);
        assert_eq!(room.game.current_round, 0);
        assert!(room.used_track_ids.is_empty());
        for player in room.players.values() {
            assert_eq!(player.pace, 10);
            assert!(!player.is_eliminated);
            assert_eq!(player.eliminated_in_round, None);
        }
    }

    #[test]
    fn standings_break_elimination_ties_by_pace() {
        let mut room = room_with_paces(&[("winner", 10), ("faster", 5), ("slower", 2)]);
        let ids: Vec<Uuid> = room.players.keys().copied().collect();

        for id in &ids[1..] {
            room.players[id].is_eliminated = true;
            room.players[id].eliminated_in_round = Some(6);
        }

        let standings = compute_standings(&room, Some(ids[0]));
        let order: Vec<&str> = standings
            .iter()
            .map(|entry| entry.nickname.as_str())
            .collect();
        assert_eq!(order, vec!["winner", "faster", "slower"]);
    }
}
