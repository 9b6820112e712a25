//! Create `room_poll` table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RoomPoll::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RoomPoll::PollId)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RoomPoll::RoomId).string_len(32).not_null())
                    .col(
                        ColumnDef::new(RoomPoll::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(RoomPoll::StartedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(RoomPoll::ClosedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(RoomPoll::DurationMinutes)
                            .integer()
                            .not_null(),
                    )
                    .check(Expr::col(RoomPoll::DurationMinutes).gt(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_room_poll_poll")
                            .from(RoomPoll::Table, RoomPoll::PollId)
                            .to(Poll::Table, Poll::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_room_poll_room")
                            .from(RoomPoll::Table, RoomPoll::RoomId)
                            .to(Room::Table, Room::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_room_poll_room_id")
                    .table(RoomPoll::Table)
                    .col(RoomPoll::RoomId)
                    .to_owned(),
            )
            .await?;

        // Index: status (expiry sweep scans active polls)
        manager
            .create_index(
                Index::create()
                    .name("idx_room_poll_status")
                    .table(RoomPoll::Table)
                    .col(RoomPoll::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RoomPoll::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum RoomPoll {
    Table,
    PollId,
    RoomId,
    Status,
    StartedAt,
    ClosedAt,
    DurationMinutes,
}

#[derive(Iden)]
enum Poll {
    Table,
    Id,
}

#[derive(Iden)]
enum Room {
    Table,
    Id,
}
