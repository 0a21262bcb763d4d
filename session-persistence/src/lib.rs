pub mod connection;
pub mod entities;
pub mod repositories;

pub use connection::{connect_and_migrate, connect_to_database, connect_to_memory_database};
pub use repositories::{FriendStat, LedgerRepository, RoundOutcome, StatsLedger};
