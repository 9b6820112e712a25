//! Room poll lifecycle entity (1:1 with a room-scoped poll).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a room-scoped poll.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum RoomPollStatus {
    /// Created, not yet started by the room admin.
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Accepting votes.
    #[sea_orm(string_value = "active")]
    Active,
    /// Terminal.
    #[sea_orm(string_value = "closed")]
    Closed,
}

impl Default for RoomPollStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl RoomPollStatus {
    /// Wire name used in JSON responses and events.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for RoomPollStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "room_poll")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub poll_id: String,

    #[sea_orm(indexed)]
    pub room_id: String,

    #[sea_orm(indexed)]
    pub status: RoomPollStatus,

    /// Set on pending -> active
    #[sea_orm(nullable)]
    pub started_at: Option<DateTimeWithTimeZone>,

    /// Set on active -> closed
    #[sea_orm(nullable)]
    pub closed_at: Option<DateTimeWithTimeZone>,

    pub duration_minutes: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::poll::Entity",
        from = "Column::PollId",
        to = "super::poll::Column::Id",
        on_delete = "Cascade"
    )]
    Poll,
    #[sea_orm(
        belongs_to = "super::room::Entity",
        from = "Column::RoomId",
        to = "super::room::Column::Id",
        on_delete = "Cascade"
    )]
    Room,
}

impl Related<super::poll::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Poll.def()
    }
}

impl Related<super::room::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Room.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
