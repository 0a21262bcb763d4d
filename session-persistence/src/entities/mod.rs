pub mod friend_stats;
pub mod prelude;
