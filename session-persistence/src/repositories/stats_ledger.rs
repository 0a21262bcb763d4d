use std::collections::HashMap;

use anyhow::Result;
use sea_orm::DatabaseConnection;
use session_types::ParticipantId;
use tokio::sync::RwLock;
use tracing::debug;

use crate::repositories::{FriendStat, LedgerRepository, RoundOutcome};

/// Write-through view over the pairwise ledger.
///
/// Reads are served from an in-memory working set keyed by owner, loaded on
/// first access. Every write goes to the database first and only then
/// invalidates the affected owners, so a crashed process never loses a
/// recorded round and a reloaded working set always matches the store.
pub struct StatsLedger {
    repo: LedgerRepository,
    cache: RwLock<HashMap<ParticipantId, Vec<FriendStat>>>,
}

impl StatsLedger {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            repo: LedgerRepository::new(db),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// All ledger rows for `owner`, ranked by points earned against each
    /// other participant.
    pub async fn for_owner(&self, owner: ParticipantId) -> Result<Vec<FriendStat>> {
        if let Some(rows) = self.cache.read().await.get(&owner) {
            return Ok(rows.clone());
        }

        let rows = self.repo.load_all(owner).await?;
        debug!(owner = %owner, rows = rows.len(), "ledger working set loaded");
        self.cache.write().await.insert(owner, rows.clone());
        Ok(rows)
    }

    /// Persist one finalized guess for both participants involved.
    pub async fn record_outcome(&self, outcome: &RoundOutcome) -> Result<()> {
        self.repo.record_outcome(outcome).await?;

        let mut cache = self.cache.write().await;
        cache.remove(&outcome.guesser);
        cache.remove(&outcome.host);
        Ok(())
    }

    /// Wipe the owner's ledger rows, store first.
    pub async fn hard_reset(&self, owner: ParticipantId) -> Result<()> {
        self.repo.hard_reset(owner).await?;
        self.cache.write().await.remove(&owner);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::connect_to_memory_database;
    use migration::{Migrator, MigratorTrait};

    async fn setup_ledger() -> StatsLedger {
        let db = connect_to_memory_database().await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        StatsLedger::new(db)
    }

    fn outcome(guesser: u32, host: u32, points: u32) -> RoundOutcome {
        RoundOutcome {
            guesser: ParticipantId(guesser),
            guesser_name: format!("Guesser{}", guesser),
            guesser_avatar: 0,
            host: ParticipantId(host),
            host_name: format!("Host{}", host),
            host_avatar: 0,
            points,
        }
    }

    #[tokio::test]
    async fn test_cached_read_sees_later_writes() {
        let ledger = setup_ledger().await;

        ledger.record_outcome(&outcome(1, 2, 3)).await.unwrap();
        let first = ledger.for_owner(ParticipantId(1)).await.unwrap();
        assert_eq!(first[0].points_to, 3);

        // The write invalidates the cached set; the next read reloads.
        ledger.record_outcome(&outcome(1, 2, 2)).await.unwrap();
        let second = ledger.for_owner(ParticipantId(1)).await.unwrap();
        assert_eq!(second[0].points_to, 5);
        assert_eq!(second[0].possible_to, 4);
    }

    #[tokio::test]
    async fn test_hard_reset_clears_working_set() {
        let ledger = setup_ledger().await;

        ledger.record_outcome(&outcome(1, 2, 1)).await.unwrap();
        assert_eq!(ledger.for_owner(ParticipantId(1)).await.unwrap().len(), 1);

        ledger.hard_reset(ParticipantId(1)).await.unwrap();
        assert!(ledger.for_owner(ParticipantId(1)).await.unwrap().is_empty());
        // The counterpart's rows are untouched.
        assert_eq!(ledger.for_owner(ParticipantId(2)).await.unwrap().len(), 1);
    }
}
