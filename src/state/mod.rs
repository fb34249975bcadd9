//! Central application state: the room registry behind its lock, the live
//! connection table, and the outbound send surface.

use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc};
use tracing::warn;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dto::ws::ServerMessage,
    music::{MusicGateway, MusicResult},
    registry::{Room, RoomRegistry},
};

pub type SharedState = Arc<AppState>;

/// Handle used to push messages to a connected client.
///
/// The sender feeds the connection's dedicated writer task, so pushes never
/// block and per-connection ordering is preserved.
#[derive(Clone)]
pub struct ClientConnection {
    pub id: Uuid,
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Central application state shared by routes, the dispatcher, and timers.
pub struct AppState {
    config: AppConfig,
    gateway: MusicGateway,
    /// All room state transitions serialize through this lock.
    registry: Mutex<RoomRegistry>,
    /// Live sockets keyed by connection id. The registry's connection index
    /// maps into this table.
    connections: DashMap<Uuid, ClientConnection>,
}

impl AppState {
    /// Construct the shared state, building the music gateway from config.
    pub fn new(config: AppConfig) -> MusicResult<SharedState> {
        let gateway = MusicGateway::new(&config.music)?;
        Ok(Arc::new(Self {
            config,
            gateway,
            registry: Mutex::new(RoomRegistry::new()),
            connections: DashMap::new(),
        }))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn gateway(&self) -> &MusicGateway {
        &self.gateway
    }

    /// The room registry lock. Hold it only across non-blocking work; music
    /// gateway calls happen with the lock released.
    pub fn registry(&self) -> &Mutex<RoomRegistry> {
        &self.registry
    }

    /// Register a freshly accepted socket.
    pub fn register_connection(&self, connection: ClientConnection) {
        self.connections.insert(connection.id, connection);
    }

    /// Forget a closed socket.
    pub fn remove_connection(&self, connection_id: Uuid) {
        self.connections.remove(&connection_id);
    }

    /// Number of sockets currently registered.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Push a message onto one connection's writer queue.
    ///
    /// Serialization failures are logged and dropped (a bug, not a transient
    /// condition); a closed writer is ignored; the reader side tears the
    /// connection down.
    pub fn send_to_connection(&self, connection_id: Uuid, message: &ServerMessage) {
        let Some(connection) = self.connections.get(&connection_id) else {
            return;
        };

        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "failed to serialize server message `{message:?}`");
                return;
            }
        };

        let _ = connection.tx.send(Message::Text(payload.into()));
    }

    /// Push a message to every connected player of a room.
    pub fn broadcast_to_room(&self, room: &Room, message: &ServerMessage) {
        for player in room.players.values() {
            if let Some(connection_id) = player.connection_id {
                self.send_to_connection(connection_id, message);
            }
        }
    }

    /// Push a message to the room's host only.
    pub fn send_to_host(&self, room: &Room, message: &ServerMessage) {
        if let Some(connection_id) = room
            .players
            .get(&room.host_id)
            .and_then(|host| host.connection_id)
        {
            self.send_to_connection(connection_id, message);
        }
    }
}
