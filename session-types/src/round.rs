use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ParticipantId;

/// Inclusive bounds of a legal secret number or guess.
pub const GUESS_MIN: u8 = 0;
pub const GUESS_MAX: u8 = 10;

/// Fixed "possible points" a guesser banks in the pairwise ledger per
/// recorded round, independent of the points actually earned.
pub const POSSIBLE_PER_ROUND: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum RoundPhase {
    /// No match running.
    Idle,
    /// The authority is picking a host and secret for the next round.
    HostSelection,
    /// Waiting for the host to confirm a hint.
    HintPending,
    /// Guess input open for every non-host participant.
    Voting,
    /// The authority is scoring and broadcasting the finalized set.
    Finalizing,
    /// Round scored; waiting out the advance delay.
    RoundComplete,
    /// Final leaderboard shown; a restart returns to Idle.
    LeaderboardDisplay,
    /// Terminal: population collapsed, no further rounds.
    Cancelled,
}

/// Authoritative state of the active round. Superseded each round; the
/// secret is `None` only while a follower waits for the authoritative value
/// or while the choice is deferred to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RoundState {
    pub round_index: u32,
    pub host: ParticipantId,
    pub secret: Option<u8>,
    pub hint: Option<String>,
    pub phase: RoundPhase,
}

/// One finalized guess as broadcast by the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GuessScore {
    pub participant: ParticipantId,
    pub guess: u8,
    pub points: u32,
}

/// A ranked leaderboard entry. Followers render received rows verbatim so
/// every peer shows identical rounding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LeaderboardRow {
    pub participant: ParticipantId,
    pub display_name: String,
    pub avatar_index: u8,
    pub total_points: u32,
    pub percentage_share: f64,
    pub hosted: bool,
}

impl RoundState {
    pub fn new(round_index: u32, host: ParticipantId, secret: Option<u8>) -> Self {
        Self {
            round_index,
            host,
            secret,
            hint: None,
            phase: RoundPhase::HostSelection,
        }
    }
}

/// Validate a raw guess value against the legal range.
pub fn guess_in_range(value: u8) -> bool {
    (GUESS_MIN..=GUESS_MAX).contains(&value)
}
