//! WebSocket lifecycle and inbound event dispatch.
//!
//! Each accepted socket gets a server-assigned connection id, a dedicated
//! writer task, and an entry in the shared connection table. Inbound frames
//! are parsed into [`ClientMessage`] and routed to the registry or the game
//! engine; failures become unicast `error` events or negative acks, never a
//! torn-down room.

use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        room::{PlayerSnapshot, RoomSnapshot},
        validation,
        ws::{ClientMessage, ServerMessage},
    },
    engine,
    error::ServiceError,
    music::{self, MusicAuth},
    registry::Room,
    state::{ClientConnection, SharedState},
};

/// Minimum spacing between `loadPlaylist` attempts per room.
const PLAYLIST_LOAD_COOLDOWN_SECS: u64 = 5;

/// Handle the full lifecycle of one game WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we
    // await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let connection_id = Uuid::new_v4();
    state.register_connection(ClientConnection {
        id: connection_id,
        tx: outbound_tx.clone(),
    });
    info!(%connection_id, "client connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_frame(&state, connection_id, &text).await;
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%connection_id, error = %err, "websocket error");
                break;
            }
        }
    }

    handle_departure(&state, connection_id).await;
    state.remove_connection(connection_id);
    info!(%connection_id, "client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Parse one inbound frame and dispatch it.
async fn handle_frame(state: &SharedState, connection_id: Uuid, text: &str) {
    let message = match ClientMessage::from_json_str(text) {
        Ok(message) => message,
        Err(err) => {
            warn!(%connection_id, error = %err, "failed to parse client message");
            unicast_error(
                state,
                connection_id,
                &ServiceError::InvalidInput("malformed message".into()),
            );
            return;
        }
    };

    match message {
        ClientMessage::CreateRoom { nickname } => {
            create_room(state, connection_id, nickname).await;
        }
        ClientMessage::JoinRoom {
            room_code,
            nickname,
        } => {
            join_room(state, connection_id, room_code, nickname).await;
        }
        ClientMessage::LeaveRoom => {
            leave_room(state, connection_id).await;
        }
        ClientMessage::StartGame => {
            if let Err(err) = engine::start_game(state, connection_id).await {
                unicast_error(state, connection_id, &err);
            }
        }
        ClientMessage::SubmitAnswer { song_title, artist } => {
            if let Err(err) =
                engine::submit_answer(state, connection_id, song_title, artist).await
            {
                unicast_error(state, connection_id, &err);
            }
        }
        ClientMessage::RestartGame => {
            if let Err(err) = engine::restart_game(state, connection_id).await {
                unicast_error(state, connection_id, &err);
            }
        }
        ClientMessage::SetMusicAuth {
            access_token,
            refresh_token,
            expires_in,
        } => {
            set_music_auth(state, connection_id, access_token, refresh_token, expires_in).await;
        }
        ClientMessage::LoadPlaylist { playlist_id } => {
            load_playlist(state, connection_id, playlist_id).await;
        }
        ClientMessage::PlaybackReady => {
            debug!(%connection_id, "host playback ready");
        }
        ClientMessage::PlaybackEnded => {
            debug!(%connection_id, "host playback ended");
        }
        ClientMessage::Unknown => {
            unicast_error(
                state,
                connection_id,
                &ServiceError::InvalidInput("unknown message type".into()),
            );
        }
    }
}

async fn create_room(state: &SharedState, connection_id: Uuid, nickname: String) {
    if let Err(err) = validation::validate_nickname(&nickname) {
        send_create_ack(state, connection_id, Err(validation_message(&err)));
        return;
    }

    let mut registry = state.registry().lock().await;
    if registry.player_by_connection(connection_id).is_some() {
        send_create_ack(state, connection_id, Err("already in a room".into()));
        return;
    }

    let created = registry.create_room(nickname.trim().to_string(), connection_id);
    let Some(room) = registry.room(&created.room_code) else {
        return;
    };

    send_create_ack(
        state,
        connection_id,
        Ok((created.room_code.clone(), created.player_id)),
    );
    state.send_to_connection(
        connection_id,
        &ServerMessage::RoomJoined {
            room: RoomSnapshot::from_room(room),
            player_id: created.player_id,
        },
    );
}

async fn join_room(state: &SharedState, connection_id: Uuid, room_code: String, nickname: String) {
    if let Err(err) = validation::validate_nickname(&nickname) {
        send_join_ack(state, connection_id, Err(validation_message(&err)));
        return;
    }

    let resume_code = {
        let mut registry = state.registry().lock().await;
        if registry.player_by_connection(connection_id).is_some() {
            send_join_ack(state, connection_id, Err("already in a room".into()));
            return;
        }

        let joined =
            match registry.join_room(&room_code, nickname.trim().to_string(), connection_id) {
                Ok(joined) => joined,
                Err(err) => {
                    send_join_ack(state, connection_id, Err(err.to_string()));
                    return;
                }
            };

        let Some(room) = registry.room(&joined.room_code) else {
            return;
        };
        let Some(player) = room.players.get(&joined.player_id) else {
            return;
        };

        send_join_ack(state, connection_id, Ok(joined.player_id));
        state.send_to_connection(
            connection_id,
            &ServerMessage::RoomJoined {
                room: RoomSnapshot::from_room(room),
                player_id: joined.player_id,
            },
        );

        if joined.is_rejoin {
            state.broadcast_to_room(
                room,
                &ServerMessage::PlayerReconnected {
                    player_id: joined.player_id,
                    nickname: player.nickname.clone(),
                },
            );
            state.broadcast_to_room(
                room,
                &ServerMessage::RoomUpdated {
                    room: RoomSnapshot::from_room(room),
                },
            );
            // A paused room resumes once its host is back.
            (player.is_host && room.game.is_paused).then(|| joined.room_code.clone())
        } else {
            state.broadcast_to_room(
                room,
                &ServerMessage::PlayerJoined {
                    player: PlayerSnapshot::from_player(player),
                },
            );
            None
        }
    };

    if let Some(code) = resume_code {
        engine::resume_game(state, &code).await;
    }
}

async fn leave_room(state: &SharedState, connection_id: Uuid) {
    let mut registry = state.registry().lock().await;
    let Some(removed) = registry.remove_player(connection_id) else {
        unicast_error(
            state,
            connection_id,
            &ServiceError::NotFound("you are not in a room".into()),
        );
        return;
    };

    if removed.room_deleted {
        return;
    }
    let Some(room) = registry.room(&removed.room_code) else {
        return;
    };

    state.broadcast_to_room(
        room,
        &ServerMessage::PlayerLeft {
            player_id: removed.player_id,
            nickname: removed.nickname,
        },
    );
    state.broadcast_to_room(
        room,
        &ServerMessage::RoomUpdated {
            room: RoomSnapshot::from_room(room),
        },
    );
}

/// Socket closed or errored: apply registry disconnect semantics and tell the
/// room. Never surfaced as an error to the departing peer.
async fn handle_departure(state: &SharedState, connection_id: Uuid) {
    let mut registry = state.registry().lock().await;
    let Some(outcome) = registry.handle_disconnect(connection_id) else {
        return;
    };
    let Some(room) = registry.room(&outcome.room_code) else {
        return;
    };

    state.broadcast_to_room(
        room,
        &ServerMessage::RoomUpdated {
            room: RoomSnapshot::from_room(room),
        },
    );
    if outcome.paused_game {
        if let Some(reason) = room.game.pause_reason {
            state.broadcast_to_room(room, &ServerMessage::GamePaused { reason });
        }
    }
}

/// Store host tokens, then resolve the owning account with the lock released.
async fn set_music_auth(
    state: &SharedState,
    connection_id: Uuid,
    access_token: String,
    refresh_token: String,
    expires_in: u64,
) {
    let code = {
        let mut registry = state.registry().lock().await;
        let Some(room) = registry.room_mut_by_connection(connection_id) else {
            unicast_error(
                state,
                connection_id,
                &ServiceError::NotFound("you are not in a room".into()),
            );
            return;
        };
        if let Err(err) = ensure_host(room, connection_id) {
            unicast_error(state, connection_id, &err);
            return;
        }

        room.music_auth = Some(MusicAuth::new(
            access_token.clone(),
            refresh_token,
            expires_in,
        ));
        room.code.clone()
    };

    match state.gateway().current_user(&access_token).await {
        Ok(user_id) => {
            let mut registry = state.registry().lock().await;
            let Some(room) = registry.room_mut(&code) else {
                return;
            };
            if let Some(auth) = room.music_auth.as_mut() {
                auth.user_id = Some(user_id.clone());
            }

            state.send_to_connection(connection_id, &ServerMessage::MusicConnected { user_id });
            state.broadcast_to_room(
                room,
                &ServerMessage::RoomUpdated {
                    room: RoomSnapshot::from_room(room),
                },
            );
            info!(%code, "music service connected");
        }
        Err(err) => {
            warn!(%code, error = %err, "failed to resolve music account");
            unicast_error(state, connection_id, &ServiceError::from(err));
        }
    }
}

/// Resolve and store the room playlist. Rate-limited per room.
async fn load_playlist(state: &SharedState, connection_id: Uuid, playlist_input: String) {
    let (code, auth, playlist_id) = {
        let mut registry = state.registry().lock().await;
        let Some(room) = registry.room_mut_by_connection(connection_id) else {
            unicast_error(
                state,
                connection_id,
                &ServiceError::NotFound("you are not in a room".into()),
            );
            return;
        };
        if let Err(err) = ensure_host(room, connection_id) {
            unicast_error(state, connection_id, &err);
            return;
        }

        if let Some(last) = room.last_playlist_load {
            let elapsed = last.elapsed().as_secs();
            if elapsed < PLAYLIST_LOAD_COOLDOWN_SECS {
                unicast_error(
                    state,
                    connection_id,
                    &ServiceError::RateLimited {
                        wait_secs: PLAYLIST_LOAD_COOLDOWN_SECS - elapsed,
                    },
                );
                return;
            }
        }

        let Some(playlist_id) = music::parse_playlist_id(&playlist_input) else {
            unicast_error(
                state,
                connection_id,
                &ServiceError::InvalidInput("invalid playlist reference".into()),
            );
            return;
        };
        let Some(auth) = room.music_auth.clone() else {
            unicast_error(
                state,
                connection_id,
                &ServiceError::InvalidState(
                    "connect the music service before loading a playlist".into(),
                ),
            );
            return;
        };

        room.last_playlist_load = Some(Instant::now());
        (room.code.clone(), auth, playlist_id)
    };

    let auth = match state.gateway().ensure_valid_token(&auth).await {
        Ok(auth) => auth,
        Err(err) => {
            unicast_error(state, connection_id, &ServiceError::from(err));
            return;
        }
    };

    match state.gateway().playlist(&auth.access_token, &playlist_id).await {
        Ok(playlist) => {
            let mut registry = state.registry().lock().await;
            let Some(room) = registry.room_mut(&code) else {
                return;
            };
            room.music_auth = Some(auth);
            room.playlist = Some(playlist.clone());

            let track_count = playlist.total_tracks;
            state.send_to_connection(
                connection_id,
                &ServerMessage::PlaylistLoaded {
                    playlist,
                    track_count,
                },
            );
            state.broadcast_to_room(
                room,
                &ServerMessage::RoomUpdated {
                    room: RoomSnapshot::from_room(room),
                },
            );
            info!(%code, %playlist_id, track_count, "playlist loaded");
        }
        Err(err) => {
            warn!(%code, %playlist_id, error = %err, "playlist fetch failed");
            unicast_error(state, connection_id, &ServiceError::from(err));
        }
    }
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

fn send_create_ack(
    state: &SharedState,
    connection_id: Uuid,
    outcome: Result<(String, Uuid), String>,
) {
    let message = match outcome {
        Ok((room_code, player_id)) => ServerMessage::CreateRoomAck {
            success: true,
            room_code: Some(room_code),
            player_id: Some(player_id),
            error: None,
        },
        Err(error) => ServerMessage::CreateRoomAck {
            success: false,
            room_code: None,
            player_id: None,
            error: Some(error),
        },
    };
    state.send_to_connection(connection_id, &message);
}

fn send_join_ack(state: &SharedState, connection_id: Uuid, outcome: Result<Uuid, String>) {
    let message = match outcome {
        Ok(player_id) => ServerMessage::JoinRoomAck {
            success: true,
            player_id: Some(player_id),
            error: None,
        },
        Err(error) => ServerMessage::JoinRoomAck {
            success: false,
            player_id: None,
            error: Some(error),
        },
    };
    state.send_to_connection(connection_id, &message);
}

/// Unicast a failure to one connection, with its machine-readable code.
fn unicast_error(state: &SharedState, connection_id: Uuid, err: &ServiceError) {
    state.send_to_connection(
        connection_id,
        &ServerMessage::Error {
            message: err.to_string(),
            code: Some(err.code().to_string()),
        },
    );
}

fn validation_message(err: &validator::ValidationError) -> String {
    err.message
        .as_ref()
        .map(|message| message.to_string())
        .unwrap_or_else(|| "invalid input".to_string())
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
