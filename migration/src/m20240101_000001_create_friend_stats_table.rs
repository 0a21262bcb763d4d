use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FriendStats::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(FriendStats::OwnerId).integer().not_null())
                    .col(ColumnDef::new(FriendStats::OtherId).integer().not_null())
                    .col(
                        ColumnDef::new(FriendStats::DisplayName)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FriendStats::AvatarIndex)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(FriendStats::PointsTo)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(FriendStats::PointsFrom)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(FriendStats::PossibleTo)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(FriendStats::PossibleFrom)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(FriendStats::LastPlayed)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(FriendStats::OwnerId)
                            .col(FriendStats::OtherId),
                    )
                    .to_owned(),
            )
            .await?;

        // Create index on points_to for ranked ledger queries
        manager
            .create_index(
                Index::create()
                    .name("idx_friend_stats_points_to")
                    .table(FriendStats::Table)
                    .col(FriendStats::PointsTo)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FriendStats::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FriendStats {
    Table,
    OwnerId,
    OtherId,
    DisplayName,
    AvatarIndex,
    PointsTo,
    PointsFrom,
    PossibleTo,
    PossibleFrom,
    LastPlayed,
}
