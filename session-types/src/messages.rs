use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{GuessScore, LeaderboardRow, Participant, ParticipantId};

/// The closed peer-protocol message set exchanged over the messaging
/// channel. Dispatch is by variant, never by string name, so a handler
/// match is checked for exhaustiveness at compile time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum NetMessage {
    /// Authority → all: the round's host and secret. `secret: None` defers
    /// the choice to the host, who supplies it with the hint.
    SetHost {
        host: ParticipantId,
        secret: Option<u8>,
    },
    /// Host → all: hint confirmed; voting opens everywhere.
    BroadcastHint { hint: String, secret: u8 },
    /// Guesser → authority: one guess for the current round.
    SubmitGuess { participant: ParticipantId, guess: u8 },
    /// Authority → all-but-sender: live mirror of an accepted guess.
    MirrorGuess { participant: ParticipantId, guess: u8 },
    /// Authority → all: the full finalized set for a round. Carries every
    /// scored guess so a peer that missed earlier mirrors still converges.
    FinalizeRound {
        round_index: u32,
        results: Vec<GuessScore>,
    },
    /// Authority → all: final leaderboard, rendered verbatim by followers.
    ShowLeaderboard { rows: Vec<LeaderboardRow> },
    /// Any peer → all: ask the authority to restart the match.
    RequestRestart,
    /// Identity catch-up, targeted at a newly-joined participant.
    AnnounceIdentity { participant: Participant },
}

/// Messages a websocket client sends to the relay.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ClientMessage {
    JoinRoom {
        room: String,
        participant_id: u32,
        display_name: String,
        avatar_index: u8,
    },
    StartMatch { total_rounds: u32 },
    /// `secret` is only read when the room defers the secret choice to the
    /// round host; otherwise the authoritative draw stands.
    SubmitHint { hint: String, secret: Option<u8> },
    SubmitGuess { guess: u8 },
    RequestRestart,
    LeaveRoom,
    Heartbeat,
}

/// Messages the relay sends to a websocket client.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ServerMessage {
    RoomJoined {
        room: String,
        participant: Participant,
        roster: Vec<Participant>,
    },
    PeerJoined { participant: Participant },
    PeerLeft { participant_id: ParticipantId },
    /// A peer-protocol message relayed to this participant.
    Net { message: NetMessage },
    /// Population collapsed below two participants; the match is over.
    MatchCancelled,
    RoomLeft,
    Error { message: String },
}
