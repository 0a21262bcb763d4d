use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{ParticipantId, RoundPhase};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum SessionError {
    /// Guess outside the legal 0..=10 range. Rejected locally, never sent.
    GuessOutOfRange { value: u8 },
    /// Hint text was empty after trimming.
    EmptyHint,
    /// A match needs at least one round.
    InvalidRoundCount,
    /// The operation is reserved for the round's host.
    NotHost { participant: ParticipantId },
    /// The host's guess input is disabled for their own round.
    HostCannotGuess,
    /// Secret choice was deferred to the host but none was supplied.
    SecretRequired,
    /// The operation is reserved for the session authority.
    NotAuthority { participant: ParticipantId },
    /// The operation does not apply in the current phase.
    WrongPhase { phase: RoundPhase },
    /// No such participant in the roster.
    ParticipantNotFound { id: ParticipantId },
    /// Identity record arrived with an empty display name.
    EmptyDisplayName { id: ParticipantId },
    /// The match was cancelled; no further round operations apply.
    MatchCancelled,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::GuessOutOfRange { value } => {
                write!(f, "guess {} outside 0..=10", value)
            }
            SessionError::EmptyHint => write!(f, "hint must not be empty"),
            SessionError::InvalidRoundCount => write!(f, "round count must be at least 1"),
            SessionError::NotHost { participant } => {
                write!(f, "participant {} is not the round host", participant)
            }
            SessionError::HostCannotGuess => {
                write!(f, "the host does not guess in their own round")
            }
            SessionError::SecretRequired => {
                write!(f, "host must choose a secret number with the hint")
            }
            SessionError::NotAuthority { participant } => {
                write!(f, "participant {} is not the authority", participant)
            }
            SessionError::WrongPhase { phase } => {
                write!(f, "operation not valid in phase {:?}", phase)
            }
            SessionError::ParticipantNotFound { id } => {
                write!(f, "participant {} not in roster", id)
            }
            SessionError::EmptyDisplayName { id } => {
                write!(f, "participant {} announced an empty display name", id)
            }
            SessionError::MatchCancelled => write!(f, "match has been cancelled"),
        }
    }
}

impl std::error::Error for SessionError {}
