use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use session_core::{Delivery, Directive, RoundController, SessionConfig, TimerKind};
use session_persistence::{RoundOutcome, StatsLedger};
use session_types::{
    NetMessage, Participant, ParticipantId, RoundPhase, ServerMessage, SessionError,
    guess_in_range,
};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::ServerError;
use crate::websocket::connection::ConnectionManager;

/// One hosted session. The server runs a single engine per room, seated as
/// the current authority participant; clients are thin and receive the
/// engine's sends as relayed `Net` messages.
pub struct Room {
    name: String,
    me: Weak<Room>,
    controller: Mutex<RoundController>,
    timers: Mutex<HashMap<TimerKind, JoinHandle<()>>>,
    last_activity: Mutex<Instant>,
    connection_manager: Arc<ConnectionManager>,
    ledger: Arc<StatsLedger>,
}

impl Room {
    fn new(
        name: String,
        first: Participant,
        config: SessionConfig,
        connection_manager: Arc<ConnectionManager>,
        ledger: Arc<StatsLedger>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            name,
            me: me.clone(),
            controller: Mutex::new(RoundController::new(first, config)),
            timers: Mutex::new(HashMap::new()),
            last_activity: Mutex::new(Instant::now()),
            connection_manager,
            ledger,
        })
    }

    async fn touch(&self) {
        *self.last_activity.lock().await = Instant::now();
    }

    async fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.lock().await.elapsed() > timeout
    }

    /// Abort pending timer tasks; called when the room is dropped from the
    /// manager so no task fires into a dead room.
    async fn shutdown(&self) {
        let mut timers = self.timers.lock().await;
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }

    pub async fn join(&self, participant: Participant) -> Result<Vec<Participant>, ServerError> {
        self.touch().await;
        let (directives, roster) = {
            let mut controller = self.controller.lock().await;
            let directives = controller.participant_joined(participant)?;
            let roster: Vec<Participant> = controller.roster().participants().cloned().collect();
            (directives, roster)
        };
        self.execute(directives).await;
        Ok(roster)
    }

    pub async fn leave(&self, participant: ParticipantId) {
        self.touch().await;
        let directives = {
            let mut controller = self.controller.lock().await;
            if controller.local_id() == participant {
                // The engine seat is leaving; move to the successor before
                // reporting the departure so takeover runs on live state.
                let successor = controller
                    .roster()
                    .connected()
                    .map(|p| p.id)
                    .filter(|id| *id != participant)
                    .min();
                if let Some(successor) = successor {
                    if let Err(err) = controller.seat(successor) {
                        error!(room = %self.name, %err, "failed to re-seat engine");
                    }
                }
            }
            controller.participant_left(participant)
        };
        self.execute(directives).await;
    }

    pub async fn start_match(
        &self,
        sender: ParticipantId,
        total_rounds: u32,
    ) -> Result<(), ServerError> {
        self.touch().await;
        let directives = {
            let mut controller = self.controller.lock().await;
            if controller.roster().authority() != Some(sender) {
                return Err(ServerError::NotAuthority);
            }
            controller.start_match(total_rounds)?
        };
        self.execute(directives).await;
        Ok(())
    }

    pub async fn submit_hint(
        &self,
        sender: ParticipantId,
        hint: String,
        chosen_secret: Option<u8>,
    ) -> Result<(), ServerError> {
        self.touch().await;
        let (directives, relay) = {
            let mut controller = self.controller.lock().await;
            if controller.local_id() == sender {
                (controller.submit_hint(&hint, chosen_secret)?, None)
            } else {
                let round = controller
                    .round()
                    .ok_or(SessionError::WrongPhase {
                        phase: controller.phase(),
                    })?
                    .clone();
                if round.host != sender {
                    return Err(SessionError::NotHost {
                        participant: sender,
                    }
                    .into());
                }
                let hint = hint.trim().to_string();
                if hint.is_empty() {
                    return Err(SessionError::EmptyHint.into());
                }
                let secret = round
                    .secret
                    .or(chosen_secret)
                    .ok_or(SessionError::SecretRequired)?;
                if !guess_in_range(secret) {
                    return Err(SessionError::GuessOutOfRange { value: secret }.into());
                }

                let message = NetMessage::BroadcastHint {
                    hint: hint.clone(),
                    secret,
                };
                let directives = controller.handle_message(sender, message.clone())?;
                // The engine applied the hint; the other clients still need
                // the broadcast the host would have sent peer-to-peer.
                let relay = (controller.phase() == RoundPhase::Voting).then_some(message);
                (directives, relay)
            }
        };
        if let Some(message) = relay {
            self.connection_manager
                .send_to_room_except(&self.name, sender, ServerMessage::Net { message })
                .await;
        }
        self.execute(directives).await;
        Ok(())
    }

    pub async fn submit_guess(&self, sender: ParticipantId, value: u8) -> Result<(), ServerError> {
        self.touch().await;
        let directives = {
            let mut controller = self.controller.lock().await;
            if controller.local_id() == sender {
                controller.submit_local_guess(value)?
            } else {
                let round = controller.round().ok_or(SessionError::WrongPhase {
                    phase: controller.phase(),
                })?;
                if round.phase != RoundPhase::Voting {
                    return Err(SessionError::WrongPhase { phase: round.phase }.into());
                }
                if round.host == sender {
                    return Err(SessionError::HostCannotGuess.into());
                }
                if !guess_in_range(value) {
                    return Err(SessionError::GuessOutOfRange { value }.into());
                }
                controller.handle_message(
                    sender,
                    NetMessage::SubmitGuess {
                        participant: sender,
                        guess: value,
                    },
                )?
            }
        };
        self.execute(directives).await;
        Ok(())
    }

    pub async fn request_restart(&self, sender: ParticipantId) -> Result<(), ServerError> {
        self.touch().await;
        let directives = {
            let mut controller = self.controller.lock().await;
            if controller.local_id() == sender {
                controller.request_restart()?
            } else {
                let directives = controller.handle_message(sender, NetMessage::RequestRestart)?;
                self.connection_manager
                    .send_to_room_except(
                        &self.name,
                        sender,
                        ServerMessage::Net {
                            message: NetMessage::RequestRestart,
                        },
                    )
                    .await;
                directives
            }
        };
        self.execute(directives).await;
        Ok(())
    }

    async fn timer_fired(&self, kind: TimerKind, generation: u64) {
        self.timers.lock().await.remove(&kind);
        let directives = {
            let mut controller = self.controller.lock().await;
            controller.timer_fired(kind, generation)
        };
        self.execute(directives).await;
    }

    // Returns a boxed future to break the `Send` auto-trait inference cycle
    // between `execute`, the spawned task and `arm_timer` itself.
    fn arm_timer(
        &self,
        kind: TimerKind,
        generation: u64,
        delay: Duration,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let Some(room) = self.me.upgrade() else {
                return;
            };
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                room.timer_fired(kind, generation).await;
            });
            if let Some(previous) = self.timers.lock().await.insert(kind, handle) {
                previous.abort();
            }
        })
    }

    async fn cancel_timer(&self, kind: TimerKind) {
        if let Some(handle) = self.timers.lock().await.remove(&kind) {
            handle.abort();
        }
    }

    /// Carry out the engine's side effects on the live connections, the
    /// timer tasks and the ledger.
    async fn execute(&self, directives: Vec<Directive>) {
        for directive in directives {
            match directive {
                Directive::Send { to, message } => {
                    let message = ServerMessage::Net { message };
                    match to {
                        Delivery::All => {
                            self.connection_manager
                                .send_to_room(&self.name, message)
                                .await;
                        }
                        Delivery::AllExcept(except) => {
                            self.connection_manager
                                .send_to_room_except(&self.name, except, message)
                                .await;
                        }
                        Delivery::One(target) => {
                            if let Err(err) = self
                                .connection_manager
                                .send_to_participant(&self.name, target, message)
                                .await
                            {
                                warn!(room = %self.name, %target, "send failed: {}", err);
                            }
                        }
                    }
                }
                Directive::StartTimer {
                    kind,
                    generation,
                    delay,
                } => {
                    self.arm_timer(kind, generation, delay).await;
                }
                Directive::CancelTimer { kind } => {
                    self.cancel_timer(kind).await;
                }
                Directive::RecordOutcomes { outcomes } => {
                    let named = {
                        let controller = self.controller.lock().await;
                        outcomes
                            .into_iter()
                            .map(|outcome| {
                                let name_of = |id: ParticipantId| {
                                    controller
                                        .roster()
                                        .get(id)
                                        .map(|p| p.display_name.clone())
                                        .unwrap_or_default()
                                };
                                RoundOutcome {
                                    guesser: outcome.guesser,
                                    guesser_name: name_of(outcome.guesser),
                                    guesser_avatar: outcome.guesser_avatar,
                                    host: outcome.host,
                                    host_name: name_of(outcome.host),
                                    host_avatar: outcome.host_avatar,
                                    points: outcome.points,
                                }
                            })
                            .collect::<Vec<_>>()
                    };
                    for outcome in &named {
                        if let Err(err) = self.ledger.record_outcome(outcome).await {
                            error!(room = %self.name, %err, "failed to record ledger outcome");
                        }
                    }
                }
                Directive::MatchCancelled => {
                    info!(room = %self.name, "match cancelled");
                    self.connection_manager
                        .send_to_room(&self.name, ServerMessage::MatchCancelled)
                        .await;
                }
            }
        }
    }

    // Test helper methods
    pub async fn phase(&self) -> RoundPhase {
        self.controller.lock().await.phase()
    }

    pub async fn authority(&self) -> Option<ParticipantId> {
        self.controller.lock().await.roster().authority()
    }
}

/// Owns the live rooms and creates them on first join.
pub struct RoomManager {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    session_config: SessionConfig,
    connection_manager: Arc<ConnectionManager>,
    ledger: Arc<StatsLedger>,
}

impl RoomManager {
    pub fn new(
        session_config: SessionConfig,
        connection_manager: Arc<ConnectionManager>,
        ledger: Arc<StatsLedger>,
    ) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            session_config,
            connection_manager,
            ledger,
        }
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Room>> {
        let rooms = self.rooms.read().await;
        rooms.get(name).cloned()
    }

    /// Join a room, creating it with the joiner as the first participant if
    /// it does not exist yet. Returns the roster snapshot for catch-up.
    pub async fn join(
        &self,
        name: &str,
        participant: Participant,
    ) -> Result<Vec<Participant>, ServerError> {
        let room = {
            let mut rooms = self.rooms.write().await;
            match rooms.get(name) {
                Some(room) => room.clone(),
                None => {
                    info!(room = %name, "creating room");
                    let room = Room::new(
                        name.to_string(),
                        participant.clone(),
                        self.session_config.clone(),
                        self.connection_manager.clone(),
                        self.ledger.clone(),
                    );
                    rooms.insert(name.to_string(), room.clone());
                    room
                }
            }
        };
        room.join(participant).await
    }

    /// Handle a departure; empty rooms are torn down immediately.
    pub async fn leave(&self, name: &str, participant: ParticipantId) {
        let Some(room) = self.get(name).await else {
            return;
        };
        room.leave(participant).await;

        if self.connection_manager.room_population(name).await == 0 {
            self.remove_room(name).await;
        }
    }

    async fn remove_room(&self, name: &str) {
        let removed = {
            let mut rooms = self.rooms.write().await;
            rooms.remove(name)
        };
        if let Some(room) = removed {
            info!(room = %name, "removing room");
            room.shutdown().await;
        }
    }

    /// Drop rooms with no recent activity.
    pub async fn cleanup_expired_rooms(&self, timeout: Duration) {
        let expired: Vec<String> = {
            let rooms = self.rooms.read().await;
            let mut expired = Vec::new();
            for (name, room) in rooms.iter() {
                if room.is_expired(timeout).await {
                    expired.push(name.clone());
                }
            }
            expired
        };

        for name in expired {
            info!(room = %name, "expiring idle room");
            self.remove_room(&name).await;
        }
    }

    pub async fn room_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.len()
    }
}
