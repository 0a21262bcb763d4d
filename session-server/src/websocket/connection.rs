use session_types::{Participant, ParticipantId, ServerMessage};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub participant: Option<Participant>,
    pub room: Option<String>,
    pub connected_at: Instant,
    pub last_activity: Instant,
    pub sender: mpsc::UnboundedSender<ServerMessage>,
}

impl Connection {
    pub fn new(id: ConnectionId) -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let now = Instant::now();

        let connection = Self {
            id,
            participant: None,
            room: None,
            connected_at: now,
            last_activity: now,
            sender,
        };

        (connection, receiver)
    }

    pub fn update_activity(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn send_message(&self, message: ServerMessage) -> Result<(), String> {
        self.sender
            .send(message)
            .map_err(|_| "Connection closed".to_string())
    }

    pub fn is_inactive(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }
}

/// Tracks live websocket connections and their room membership. The
/// (room, participant id) index gives targeted delivery without scanning.
pub struct ConnectionManager {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
    seat_index: RwLock<HashMap<(String, ParticipantId), ConnectionId>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            seat_index: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create_connection(
        &self,
        id: ConnectionId,
    ) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (conn, receiver) = Connection::new(id);

        {
            let mut connections = self.connections.write().await;
            connections.insert(id, conn);
        }

        receiver
    }

    /// Drop the connection and its room seat, returning the room and
    /// participant it occupied so the caller can notify the room.
    pub async fn remove_connection(&self, id: ConnectionId) -> Option<(String, Participant)> {
        let seat = {
            let mut connections = self.connections.write().await;
            connections
                .remove(&id)
                .and_then(|conn| conn.room.zip(conn.participant))
        };

        if let Some((room, participant)) = &seat {
            let mut seat_index = self.seat_index.write().await;
            seat_index.remove(&(room.clone(), participant.id));
        }
        seat
    }

    pub async fn get_connection(&self, id: ConnectionId) -> Option<Connection> {
        let connections = self.connections.read().await;
        connections.get(&id).cloned()
    }

    /// Seat the connection in a room under a participant identity. Fails if
    /// another live connection already holds that seat.
    pub async fn claim_seat(
        &self,
        id: ConnectionId,
        room: &str,
        participant: Participant,
    ) -> Result<(), String> {
        {
            let seat_index = self.seat_index.read().await;
            if seat_index.contains_key(&(room.to_string(), participant.id)) {
                return Err("Participant already connected".to_string());
            }
        }

        {
            let mut connections = self.connections.write().await;
            match connections.get_mut(&id) {
                Some(connection) => {
                    connection.room = Some(room.to_string());
                    connection.participant = Some(participant.clone());
                }
                None => return Err("Connection not found".to_string()),
            }
        }

        let mut seat_index = self.seat_index.write().await;
        seat_index.insert((room.to_string(), participant.id), id);
        Ok(())
    }

    /// Release the room seat but keep the socket alive.
    pub async fn release_seat(&self, id: ConnectionId) -> Option<(String, Participant)> {
        let seat = {
            let mut connections = self.connections.write().await;
            connections
                .get_mut(&id)
                .and_then(|conn| conn.room.take().zip(conn.participant.take()))
        };

        if let Some((room, participant)) = &seat {
            let mut seat_index = self.seat_index.write().await;
            seat_index.remove(&(room.clone(), participant.id));
        }
        seat
    }

    pub async fn update_activity(&self, id: ConnectionId) {
        let mut connections = self.connections.write().await;
        if let Some(connection) = connections.get_mut(&id) {
            connection.update_activity();
        }
    }

    pub async fn send_to_connection(
        &self,
        id: ConnectionId,
        message: ServerMessage,
    ) -> Result<(), String> {
        let connections = self.connections.read().await;
        if let Some(connection) = connections.get(&id) {
            connection.send_message(message)
        } else {
            Err("Connection not found".to_string())
        }
    }

    pub async fn send_to_participant(
        &self,
        room: &str,
        participant: ParticipantId,
        message: ServerMessage,
    ) -> Result<(), String> {
        let connection_id = {
            let seat_index = self.seat_index.read().await;
            seat_index.get(&(room.to_string(), participant)).copied()
        };

        match connection_id {
            Some(connection_id) => self.send_to_connection(connection_id, message).await,
            None => Err("Participant not connected".to_string()),
        }
    }

    pub async fn send_to_room(&self, room: &str, message: ServerMessage) {
        let connections = self.connections.read().await;
        for connection in connections.values() {
            if connection.room.as_deref() == Some(room) {
                let _ = connection.send_message(message.clone());
            }
        }
    }

    pub async fn send_to_room_except(
        &self,
        room: &str,
        except: ParticipantId,
        message: ServerMessage,
    ) {
        let connections = self.connections.read().await;
        for connection in connections.values() {
            if connection.room.as_deref() != Some(room) {
                continue;
            }
            if connection.participant.as_ref().map(|p| p.id) == Some(except) {
                continue;
            }
            let _ = connection.send_message(message.clone());
        }
    }

    /// Connections in the room, for occupancy checks.
    pub async fn room_population(&self, room: &str) -> usize {
        let connections = self.connections.read().await;
        connections
            .values()
            .filter(|conn| conn.room.as_deref() == Some(room))
            .count()
    }

    pub async fn inactive_connections(&self, timeout: Duration) -> Vec<ConnectionId> {
        let connections = self.connections.read().await;
        connections
            .values()
            .filter(|conn| conn.is_inactive(timeout))
            .map(|conn| conn.id)
            .collect()
    }

    // Test helper methods
    pub async fn connection_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    pub async fn seat_count(&self) -> usize {
        let seat_index = self.seat_index.read().await;
        seat_index.len()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
