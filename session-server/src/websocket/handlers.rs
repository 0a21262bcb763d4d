use std::sync::Arc;
use tracing::{info, warn};

use crate::room::RoomManager;
use crate::websocket::connection::{ConnectionId, ConnectionManager};
use session_types::{ClientMessage, Participant, ParticipantId, ServerMessage};

#[derive(Clone)]
pub struct MessageHandler {
    connection_id: ConnectionId,
    connection_manager: Arc<ConnectionManager>,
    room_manager: Arc<RoomManager>,
}

impl MessageHandler {
    pub fn new(
        connection_id: ConnectionId,
        connection_manager: Arc<ConnectionManager>,
        room_manager: Arc<RoomManager>,
    ) -> Self {
        Self {
            connection_id,
            connection_manager,
            room_manager,
        }
    }

    pub async fn handle_message(&self, message: ClientMessage) {
        // Update connection activity
        self.connection_manager
            .update_activity(self.connection_id)
            .await;

        match message {
            ClientMessage::JoinRoom {
                room,
                participant_id,
                display_name,
                avatar_index,
            } => {
                self.handle_join_room(room, participant_id, &display_name, avatar_index)
                    .await
            }
            ClientMessage::StartMatch { total_rounds } => {
                self.handle_start_match(total_rounds).await
            }
            ClientMessage::SubmitHint { hint, secret } => {
                self.handle_submit_hint(hint, secret).await
            }
            ClientMessage::SubmitGuess { guess } => self.handle_submit_guess(guess).await,
            ClientMessage::RequestRestart => self.handle_request_restart().await,
            ClientMessage::LeaveRoom => self.handle_leave_room().await,
            ClientMessage::Heartbeat => {} // Activity already updated
        }
    }

    pub async fn handle_disconnect(&self) {
        info!("Handling disconnect for connection {}", self.connection_id);

        if let Some((room, participant)) = self
            .connection_manager
            .remove_connection(self.connection_id)
            .await
        {
            self.announce_departure(&room, participant.id).await;
        }
    }

    async fn handle_join_room(
        &self,
        room: String,
        participant_id: u32,
        display_name: &str,
        avatar_index: u8,
    ) {
        let participant = match Participant::validated(
            ParticipantId(participant_id),
            display_name,
            avatar_index,
        ) {
            Ok(participant) => participant,
            Err(err) => {
                self.send_error(err.to_string()).await;
                return;
            }
        };

        if let Err(err) = self
            .connection_manager
            .claim_seat(self.connection_id, &room, participant.clone())
            .await
        {
            self.send_error(err).await;
            return;
        }

        match self.room_manager.join(&room, participant.clone()).await {
            Ok(roster) => {
                self.send_message(ServerMessage::RoomJoined {
                    room: room.clone(),
                    participant: participant.clone(),
                    roster,
                })
                .await;
                self.connection_manager
                    .send_to_room_except(
                        &room,
                        participant.id,
                        ServerMessage::PeerJoined { participant },
                    )
                    .await;
            }
            Err(err) => {
                warn!("Join failed for connection {}: {}", self.connection_id, err);
                self.connection_manager
                    .release_seat(self.connection_id)
                    .await;
                self.send_error(err.to_string()).await;
            }
        }
    }

    async fn handle_leave_room(&self) {
        if let Some((room, participant)) = self
            .connection_manager
            .release_seat(self.connection_id)
            .await
        {
            self.announce_departure(&room, participant.id).await;
            self.send_message(ServerMessage::RoomLeft).await;
        } else {
            self.send_error("Not joined to a room".to_string()).await;
        }
    }

    async fn announce_departure(&self, room: &str, participant: ParticipantId) {
        self.room_manager.leave(room, participant).await;
        self.connection_manager
            .send_to_room(
                room,
                ServerMessage::PeerLeft {
                    participant_id: participant,
                },
            )
            .await;
    }

    async fn handle_start_match(&self, total_rounds: u32) {
        let Some((room, sender)) = self.current_seat().await else {
            self.send_error("Not joined to a room".to_string()).await;
            return;
        };
        if let Some(active) = self.room_manager.get(&room).await {
            if let Err(err) = active.start_match(sender, total_rounds).await {
                self.send_error(err.to_string()).await;
            }
        }
    }

    async fn handle_submit_hint(&self, hint: String, secret: Option<u8>) {
        let Some((room, sender)) = self.current_seat().await else {
            self.send_error("Not joined to a room".to_string()).await;
            return;
        };
        if let Some(active) = self.room_manager.get(&room).await {
            if let Err(err) = active.submit_hint(sender, hint, secret).await {
                self.send_error(err.to_string()).await;
            }
        }
    }

    async fn handle_submit_guess(&self, guess: u8) {
        let Some((room, sender)) = self.current_seat().await else {
            self.send_error("Not joined to a room".to_string()).await;
            return;
        };
        if let Some(active) = self.room_manager.get(&room).await {
            if let Err(err) = active.submit_guess(sender, guess).await {
                self.send_error(err.to_string()).await;
            }
        }
    }

    async fn handle_request_restart(&self) {
        let Some((room, sender)) = self.current_seat().await else {
            self.send_error("Not joined to a room".to_string()).await;
            return;
        };
        if let Some(active) = self.room_manager.get(&room).await {
            if let Err(err) = active.request_restart(sender).await {
                self.send_error(err.to_string()).await;
            }
        }
    }

    async fn current_seat(&self) -> Option<(String, ParticipantId)> {
        let connection = self
            .connection_manager
            .get_connection(self.connection_id)
            .await?;
        let room = connection.room?;
        let participant = connection.participant?;
        Some((room, participant.id))
    }

    async fn send_message(&self, message: ServerMessage) {
        if let Err(err) = self
            .connection_manager
            .send_to_connection(self.connection_id, message)
            .await
        {
            warn!(
                "Failed to reply to connection {}: {}",
                self.connection_id, err
            );
        }
    }

    pub async fn send_error(&self, message: String) {
        self.send_message(ServerMessage::Error { message }).await;
    }
}
