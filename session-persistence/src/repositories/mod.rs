pub mod ledger_repository;
pub mod stats_ledger;

pub use ledger_repository::{FriendStat, LedgerRepository, RoundOutcome};
pub use stats_ledger::StatsLedger;
