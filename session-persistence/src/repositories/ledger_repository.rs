use anyhow::Result;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use session_types::{POSSIBLE_PER_ROUND, ParticipantId};

use crate::entities::{friend_stats, prelude::*};

#[derive(Clone)]
pub struct LedgerRepository {
    db: DatabaseConnection,
}

/// One pairwise ledger row from the owner's perspective.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FriendStat {
    pub other_id: ParticipantId,
    pub display_name: String,
    pub avatar_index: u8,
    /// Points the owner earned guessing the other's secrets.
    pub points_to: u32,
    /// Points the other earned guessing the owner's secrets.
    pub points_from: u32,
    pub possible_to: u32,
    pub possible_from: u32,
    pub last_played: String,
}

/// A single finalized guess, carried with enough identity to refresh the
/// name and avatar stored on both perspective rows.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub guesser: ParticipantId,
    pub guesser_name: String,
    pub guesser_avatar: u8,
    pub host: ParticipantId,
    pub host_name: String,
    pub host_avatar: u8,
    pub points: u32,
}

/// Column increments applied to one perspective row.
#[derive(Debug, Clone, Copy)]
struct RowDelta {
    points_to: i64,
    points_from: i64,
    possible_to: i64,
    possible_from: i64,
}

impl LedgerRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn model_to_stat(model: friend_stats::Model) -> FriendStat {
        FriendStat {
            other_id: ParticipantId(model.other_id as u32),
            display_name: model.display_name,
            avatar_index: model.avatar_index as u8,
            points_to: model.points_to as u32,
            points_from: model.points_from as u32,
            possible_to: model.possible_to as u32,
            possible_from: model.possible_from as u32,
            last_played: model.last_played.to_rfc3339(),
        }
    }

    pub async fn load_all(&self, owner: ParticipantId) -> Result<Vec<FriendStat>> {
        let models = FriendStats::find()
            .filter(friend_stats::Column::OwnerId.eq(i64::from(owner.0)))
            .order_by_desc(friend_stats::Column::PointsTo)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(Self::model_to_stat).collect())
    }

    pub async fn load_pair(
        &self,
        owner: ParticipantId,
        other: ParticipantId,
    ) -> Result<Option<FriendStat>> {
        let model = FriendStats::find_by_id((i64::from(owner.0), i64::from(other.0)))
            .one(&self.db)
            .await?;
        Ok(model.map(Self::model_to_stat))
    }

    /// Record one finalized guess on both perspective rows. Each call adds
    /// the earned points and the fixed possible amount; callers must apply
    /// a given round exactly once, double application double-counts.
    pub async fn record_outcome(&self, outcome: &RoundOutcome) -> Result<()> {
        let possible = i64::from(POSSIBLE_PER_ROUND);
        // Guesser's row about the host: points earned "to" the host.
        self.bump_row(
            outcome.guesser,
            outcome.host,
            &outcome.host_name,
            outcome.host_avatar,
            RowDelta {
                points_to: i64::from(outcome.points),
                points_from: 0,
                possible_to: possible,
                possible_from: 0,
            },
        )
        .await?;
        // Host's row about the guesser: points conceded "from" the guesser.
        self.bump_row(
            outcome.host,
            outcome.guesser,
            &outcome.guesser_name,
            outcome.guesser_avatar,
            RowDelta {
                points_to: 0,
                points_from: i64::from(outcome.points),
                possible_to: 0,
                possible_from: possible,
            },
        )
        .await?;
        Ok(())
    }

    async fn bump_row(
        &self,
        owner: ParticipantId,
        other: ParticipantId,
        other_name: &str,
        other_avatar: u8,
        delta: RowDelta,
    ) -> Result<()> {
        let existing = FriendStats::find_by_id((i64::from(owner.0), i64::from(other.0)))
            .one(&self.db)
            .await?;
        let now = chrono::Utc::now().into();

        match existing {
            Some(model) => {
                let updated = friend_stats::ActiveModel {
                    owner_id: sea_orm::ActiveValue::Unchanged(model.owner_id),
                    other_id: sea_orm::ActiveValue::Unchanged(model.other_id),
                    display_name: sea_orm::ActiveValue::Set(other_name.to_string()),
                    avatar_index: sea_orm::ActiveValue::Set(i32::from(other_avatar)),
                    points_to: sea_orm::ActiveValue::Set(model.points_to + delta.points_to),
                    points_from: sea_orm::ActiveValue::Set(model.points_from + delta.points_from),
                    possible_to: sea_orm::ActiveValue::Set(model.possible_to + delta.possible_to),
                    possible_from: sea_orm::ActiveValue::Set(
                        model.possible_from + delta.possible_from,
                    ),
                    last_played: sea_orm::ActiveValue::Set(now),
                };
                FriendStats::update(updated).exec(&self.db).await?;
            }
            None => {
                let fresh = friend_stats::ActiveModel {
                    owner_id: sea_orm::ActiveValue::Set(i64::from(owner.0)),
                    other_id: sea_orm::ActiveValue::Set(i64::from(other.0)),
                    display_name: sea_orm::ActiveValue::Set(other_name.to_string()),
                    avatar_index: sea_orm::ActiveValue::Set(i32::from(other_avatar)),
                    points_to: sea_orm::ActiveValue::Set(delta.points_to),
                    points_from: sea_orm::ActiveValue::Set(delta.points_from),
                    possible_to: sea_orm::ActiveValue::Set(delta.possible_to),
                    possible_from: sea_orm::ActiveValue::Set(delta.possible_from),
                    last_played: sea_orm::ActiveValue::Set(now),
                };
                FriendStats::insert(fresh).exec(&self.db).await?;
            }
        }
        Ok(())
    }

    /// Drop every ledger row owned by `owner`. Irreversible.
    pub async fn hard_reset(&self, owner: ParticipantId) -> Result<()> {
        FriendStats::delete_many()
            .filter(friend_stats::Column::OwnerId.eq(i64::from(owner.0)))
            .exec(&self.db)
            .await?;
        Ok(())
    }
}
