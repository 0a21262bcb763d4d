use std::collections::BTreeMap;

use session_types::ParticipantId;
pub use session_types::POSSIBLE_PER_ROUND;

/// Proximity score for a single guess: 3 for exact, 2 for off-by-one,
/// 1 for off-by-two, 0 beyond. The host never earns round points.
pub fn points(secret: u8, guess: u8) -> u32 {
    match secret.abs_diff(guess) {
        0 => 3,
        1 => 2,
        2 => 1,
        _ => 0,
    }
}

/// Accumulated per-participant points across the rounds of the current
/// match. Reset whenever a match (re)starts.
#[derive(Debug, Clone, Default)]
pub struct SessionTotals {
    totals: BTreeMap<ParticipantId, u32>,
}

impl SessionTotals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, participant: ParticipantId, round_points: u32) {
        *self.totals.entry(participant).or_insert(0) += round_points;
    }

    pub fn get(&self, participant: ParticipantId) -> u32 {
        self.totals.get(&participant).copied().unwrap_or(0)
    }

    pub fn sum(&self) -> u32 {
        self.totals.values().sum()
    }

    pub fn reset(&mut self) {
        self.totals.clear();
    }
}
