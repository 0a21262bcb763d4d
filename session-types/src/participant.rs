use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::SessionError;

/// Highest avatar index the client art set knows about.
pub const MAX_AVATAR_INDEX: u8 = 15;

/// Stable per-installation participant id, assigned once and replicated to
/// all peers by the identity layer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct ParticipantId(pub u32);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    pub avatar_index: u8,
}

impl Participant {
    /// Build a participant record, validating at the identity-sync boundary.
    /// An empty display name is rejected; an out-of-range avatar index is
    /// clamped to the known avatar set.
    pub fn validated(
        id: ParticipantId,
        display_name: &str,
        avatar_index: u8,
    ) -> Result<Self, SessionError> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(SessionError::EmptyDisplayName { id });
        }

        Ok(Self {
            id,
            display_name: display_name.to_string(),
            avatar_index: avatar_index.min(MAX_AVATAR_INDEX),
        })
    }
}
