use sea_orm::entity::prelude::*;

/// One directed (owner, other) row of the pairwise ledger. `points_to` and
/// `possible_to` cover rounds where the owner guessed the other's secret;
/// the `_from` columns cover the reverse direction.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "friend_stats")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub owner_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub other_id: i64,
    /// Display name of the other participant, refreshed on every write.
    pub display_name: String,
    pub avatar_index: i32,
    pub points_to: i64,
    pub points_from: i64,
    pub possible_to: i64,
    pub possible_from: i64,
    pub last_played: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
