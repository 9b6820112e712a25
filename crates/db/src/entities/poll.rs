//! Poll entity.
//!
//! A poll is either global (`room_id` is NULL, open until `end_time`) or
//! scoped to a room, in which case a [`super::room_poll`] row carries its
//! lifecycle.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "poll")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(column_type = "Text")]
    pub question: String,

    pub option1: String,

    pub option2: String,

    #[sea_orm(nullable)]
    pub option3: Option<String>,

    #[sea_orm(nullable)]
    pub option4: Option<String>,

    /// Image reference (URL or drive key), not the image itself
    #[sea_orm(nullable)]
    pub image: Option<String>,

    /// NULL for global polls
    #[sea_orm(indexed, nullable)]
    pub room_id: Option<String>,

    #[sea_orm(indexed)]
    pub created_by: String,

    pub created_at: DateTimeWithTimeZone,

    /// Closing instant for global polls. Informational for room polls,
    /// whose lifecycle record is authoritative.
    pub end_time: DateTimeWithTimeZone,
}

impl Model {
    /// Label of a 1-based option, if that option exists on this poll.
    #[must_use]
    pub fn option_label(&self, option: i32) -> Option<&str> {
        match option {
            1 => Some(self.option1.as_str()),
            2 => Some(self.option2.as_str()),
            3 => self.option3.as_deref(),
            4 => self.option4.as_deref(),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::CreatedBy",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Creator,
    #[sea_orm(
        belongs_to = "super::room::Entity",
        from = "Column::RoomId",
        to = "super::room::Column::Id",
        on_delete = "Cascade"
    )]
    Room,
    #[sea_orm(has_one = "super::room_poll::Entity")]
    Lifecycle,
    #[sea_orm(has_many = "super::vote::Entity")]
    Votes,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Creator.def()
    }
}

impl Related<super::room::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Room.def()
    }
}

impl Related<super::room_poll::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lifecycle.def()
    }
}

impl Related<super::vote::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Votes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
