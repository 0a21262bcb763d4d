use std::collections::BTreeMap;

use session_types::{ParticipantId, SessionError, guess_in_range};

/// Per-round guess accumulator: one guess per non-host participant, first
/// submission wins. The authority's collector decides completion; follower
/// collectors are read-only mirrors fed by `MirrorGuess` broadcasts.
#[derive(Debug, Clone, Default)]
pub struct GuessCollector {
    guesses: BTreeMap<ParticipantId, u8>,
}

impl GuessCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a guess. Returns `Ok(true)` when stored, `Ok(false)` when the
    /// participant already guessed this round (silent no-op, later
    /// duplicates are dropped without error), and an error for an
    /// out-of-range value.
    pub fn submit(&mut self, participant: ParticipantId, value: u8) -> Result<bool, SessionError> {
        if !guess_in_range(value) {
            return Err(SessionError::GuessOutOfRange { value });
        }
        if self.guesses.contains_key(&participant) {
            return Ok(false);
        }
        self.guesses.insert(participant, value);
        Ok(true)
    }

    /// True once every expected guesser has submitted.
    pub fn is_complete(&self, expected: usize) -> bool {
        self.guesses.len() >= expected
    }

    pub fn contains(&self, participant: ParticipantId) -> bool {
        self.guesses.contains_key(&participant)
    }

    pub fn len(&self) -> usize {
        self.guesses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guesses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParticipantId, u8)> + '_ {
        self.guesses.iter().map(|(id, value)| (*id, *value))
    }

    pub fn clear(&mut self) {
        self.guesses.clear();
    }
}
