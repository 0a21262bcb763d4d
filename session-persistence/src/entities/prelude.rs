pub use super::friend_stats::Entity as FriendStats;
