//! Room poll lifecycle repository.
//!
//! Status changes are conditional updates (`... WHERE status = <expected>`):
//! the store decides which of two racing transitions wins.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use crate::entities::{RoomPoll, room_poll, room_poll::RoomPollStatus};
use pollhub_common::{AppError, AppResult};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set,
};

/// Column values written by a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleUpdate {
    pub status: RoomPollStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Repository for room poll lifecycle records.
#[derive(Clone)]
pub struct RoomPollRepository {
    db: Arc<DatabaseConnection>,
}

impl RoomPollRepository {
    /// Create a new room poll repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find the lifecycle record of a poll within a room.
    pub async fn find_in_room(
        &self,
        room_id: &str,
        poll_id: &str,
    ) -> AppResult<Option<room_poll::Model>> {
        RoomPoll::find_by_id(poll_id)
            .filter(room_poll::Column::RoomId.eq(room_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Read a lifecycle record with a shared row lock.
    ///
    /// Inside a transaction this holds off concurrent status updates until
    /// commit, so a vote accepted as "active" cannot interleave with a close.
    pub async fn find_for_vote_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        poll_id: &str,
    ) -> AppResult<Option<room_poll::Model>> {
        RoomPoll::find_by_id(poll_id)
            .lock_shared()
            .one(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All lifecycle records currently marked active.
    pub async fn find_active(&self) -> AppResult<Vec<room_poll::Model>> {
        RoomPoll::find()
            .filter(room_poll::Column::Status.eq(RoomPollStatus::Active))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Apply a transition only if the stored status still equals `expected`.
    ///
    /// Returns `false` when another writer changed the status first.
    pub async fn update_if_status(
        &self,
        poll_id: &str,
        expected: RoomPollStatus,
        update: LifecycleUpdate,
    ) -> AppResult<bool> {
        let changes = room_poll::ActiveModel {
            status: Set(update.status),
            started_at: Set(update.started_at.map(Into::into)),
            closed_at: Set(update.closed_at.map(Into::into)),
            ..Default::default()
        };

        let result = RoomPoll::update_many()
            .set(changes)
            .filter(room_poll::Column::PollId.eq(poll_id))
            .filter(room_poll::Column::Status.eq(expected))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected == 1)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    #[tokio::test]
    async fn test_update_if_status_reports_lost_race() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 1,
                    },
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 0,
                    },
                ])
                .into_connection(),
        );

        let repo = RoomPollRepository::new(db);
        let update = LifecycleUpdate {
            status: RoomPollStatus::Active,
            started_at: Some(Utc::now()),
            closed_at: None,
        };

        assert!(
            repo.update_if_status("p1", RoomPollStatus::Pending, update)
                .await
                .unwrap()
        );
        assert!(
            !repo
                .update_if_status("p1", RoomPollStatus::Pending, update)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_find_for_vote_takes_shared_lock() {
        let lifecycle = fixtures::lifecycle_active("p1", "room1", 10);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[lifecycle]])
            .into_connection();

        let repo = RoomPollRepository::new(Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
        ));
        let found = repo.find_for_vote_on(&db, "p1").await.unwrap();
        assert!(found.is_some());

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 1);
        assert!(format!("{:?}", log[0]).contains("FOR SHARE"));
    }

    #[tokio::test]
    async fn test_find_active() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[
                    fixtures::lifecycle_active("p1", "room1", 10),
                    fixtures::lifecycle_active("p2", "room2", 1),
                ]])
                .into_connection(),
        );

        let repo = RoomPollRepository::new(db);
        let active = repo.find_active().await.unwrap();

        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|rp| rp.status == RoomPollStatus::Active));
    }
}
