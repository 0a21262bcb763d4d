use session_types::{Participant, ParticipantId, SessionError};
use tracing::debug;

#[derive(Debug, Clone)]
struct RosterEntry {
    participant: Participant,
    connected: bool,
}

/// Join-ordered set of known participants with connectivity tracking.
///
/// The roster is also the source of the authority election: the connected
/// participant with the lowest id is the authority, so every peer derives
/// the same answer without any extra coordination messages.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a validated participant record. Returns true when
    /// the participant was previously unknown.
    pub fn upsert(&mut self, participant: Participant) -> bool {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.participant.id == participant.id)
        {
            entry.participant = participant;
            entry.connected = true;
            return false;
        }

        debug!(id = %participant.id, name = %participant.display_name, "roster add");
        self.entries.push(RosterEntry {
            participant,
            connected: true,
        });
        true
    }

    /// Validate and apply an identity announcement. Invalid records are
    /// rejected at this boundary and never reach the round state machine.
    pub fn handle_announce(&mut self, announced: &Participant) -> Result<bool, SessionError> {
        let validated = Participant::validated(
            announced.id,
            &announced.display_name,
            announced.avatar_index,
        )?;
        Ok(self.upsert(validated))
    }

    pub fn mark_left(&mut self, id: ParticipantId) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.participant.id == id) {
            entry.connected = false;
        }
    }

    pub fn get(&self, id: ParticipantId) -> Option<&Participant> {
        self.entries
            .iter()
            .find(|e| e.participant.id == id)
            .map(|e| &e.participant)
    }

    pub fn is_connected(&self, id: ParticipantId) -> bool {
        self.entries
            .iter()
            .any(|e| e.participant.id == id && e.connected)
    }

    pub fn connected(&self) -> impl Iterator<Item = &Participant> {
        self.entries
            .iter()
            .filter(|e| e.connected)
            .map(|e| &e.participant)
    }

    pub fn connected_count(&self) -> usize {
        self.entries.iter().filter(|e| e.connected).count()
    }

    /// The current authority: lowest id among connected participants.
    /// Deterministic, so reselection after an authority departure needs no
    /// handshake.
    pub fn authority(&self) -> Option<ParticipantId> {
        self.connected().map(|p| p.id).min()
    }

    /// Position in join order, used as the leaderboard tie-break.
    pub fn join_index(&self, id: ParticipantId) -> Option<usize> {
        self.entries.iter().position(|e| e.participant.id == id)
    }

    /// Snapshot of every known participant in join order.
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.entries.iter().map(|e| &e.participant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: u32, name: &str) -> Participant {
        Participant {
            id: ParticipantId(id),
            display_name: name.to_string(),
            avatar_index: 0,
        }
    }

    #[test]
    fn test_upsert_and_join_order() {
        let mut roster = Roster::new();
        assert!(roster.upsert(p(5, "Eve")));
        assert!(roster.upsert(p(2, "Bob")));
        assert!(!roster.upsert(p(5, "Eve Renamed")));

        assert_eq!(roster.join_index(ParticipantId(5)), Some(0));
        assert_eq!(roster.join_index(ParticipantId(2)), Some(1));
        assert_eq!(
            roster.get(ParticipantId(5)).unwrap().display_name,
            "Eve Renamed"
        );
    }

    #[test]
    fn test_authority_is_lowest_connected_id() {
        let mut roster = Roster::new();
        roster.upsert(p(9, "Nine"));
        roster.upsert(p(3, "Three"));
        roster.upsert(p(7, "Seven"));
        assert_eq!(roster.authority(), Some(ParticipantId(3)));

        roster.mark_left(ParticipantId(3));
        assert_eq!(roster.authority(), Some(ParticipantId(7)));

        roster.mark_left(ParticipantId(7));
        roster.mark_left(ParticipantId(9));
        assert_eq!(roster.authority(), None);
    }

    #[test]
    fn test_departed_participant_stays_known() {
        let mut roster = Roster::new();
        roster.upsert(p(1, "One"));
        roster.mark_left(ParticipantId(1));

        assert!(!roster.is_connected(ParticipantId(1)));
        assert!(roster.get(ParticipantId(1)).is_some());
        assert_eq!(roster.connected_count(), 0);
    }

    #[test]
    fn test_announce_validation() {
        let mut roster = Roster::new();
        let bad = Participant {
            id: ParticipantId(4),
            display_name: "  ".to_string(),
            avatar_index: 0,
        };
        assert!(roster.handle_announce(&bad).is_err());
        assert!(roster.get(ParticipantId(4)).is_none());

        let clamped = Participant {
            id: ParticipantId(4),
            display_name: "Dana".to_string(),
            avatar_index: 99,
        };
        assert!(roster.handle_announce(&clamped).unwrap());
        assert_eq!(roster.get(ParticipantId(4)).unwrap().avatar_index, 15);
    }
}
