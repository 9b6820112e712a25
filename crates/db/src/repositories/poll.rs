//! Poll repository.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crate::entities::{Poll, RoomPoll, poll, room_poll, vote};
use pollhub_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, Order,
    QueryFilter, QueryOrder, TransactionTrait, sea_query::Query,
};

/// A poll together with its lifecycle record (room polls only).
#[derive(Debug, Clone)]
pub struct PollWithLifecycle {
    pub poll: poll::Model,
    pub lifecycle: Option<room_poll::Model>,
}

/// Poll repository for database operations.
#[derive(Clone)]
pub struct PollRepository {
    db: Arc<DatabaseConnection>,
}

impl PollRepository {
    /// Create a new poll repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a poll by ID on the given connection.
    pub async fn find_by_id_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
    ) -> AppResult<Option<poll::Model>> {
        Poll::find_by_id(id)
            .one(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a poll by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<poll::Model>> {
        self.find_by_id_on(self.db.as_ref(), id).await
    }

    /// Get a poll by ID, returning error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<poll::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Poll not found: {id}")))
    }

    /// Create a global poll.
    pub async fn create(&self, model: poll::ActiveModel) -> AppResult<poll::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a room poll and its pending lifecycle record in one transaction.
    pub async fn create_with_lifecycle(
        &self,
        poll: poll::ActiveModel,
        lifecycle: room_poll::ActiveModel,
    ) -> AppResult<PollWithLifecycle> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let poll = poll
            .insert(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        let lifecycle = lifecycle
            .insert(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(PollWithLifecycle {
            poll,
            lifecycle: Some(lifecycle),
        })
    }

    /// Delete a poll. Votes and the lifecycle record go with it (FK cascade).
    ///
    /// Returns whether a row was deleted.
    pub async fn delete(&self, id: &str) -> AppResult<bool> {
        let result = Poll::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected > 0)
    }

    /// All polls of a room, newest first, with their lifecycle records.
    pub async fn find_by_room(&self, room_id: &str) -> AppResult<Vec<PollWithLifecycle>> {
        let polls = Poll::find()
            .filter(poll::Column::RoomId.eq(room_id))
            .order_by(poll::Column::CreatedAt, Order::Desc)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if polls.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<String> = polls.iter().map(|p| p.id.clone()).collect();
        let mut lifecycles: HashMap<String, room_poll::Model> = RoomPoll::find()
            .filter(room_poll::Column::PollId.is_in(ids))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .into_iter()
            .map(|rp| (rp.poll_id.clone(), rp))
            .collect();

        Ok(polls
            .into_iter()
            .map(|poll| {
                let lifecycle = lifecycles.remove(&poll.id);
                PollWithLifecycle { poll, lifecycle }
            })
            .collect())
    }

    /// Global polls still open at `now`, newest first.
    pub async fn find_open_global(&self, now: DateTime<Utc>) -> AppResult<Vec<poll::Model>> {
        Poll::find()
            .filter(poll::Column::RoomId.is_null())
            .filter(poll::Column::EndTime.gt(now))
            .order_by(poll::Column::CreatedAt, Order::Desc)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Polls created by a user, newest first.
    pub async fn find_by_creator(&self, user_id: &str) -> AppResult<Vec<poll::Model>> {
        Poll::find()
            .filter(poll::Column::CreatedBy.eq(user_id))
            .order_by(poll::Column::CreatedAt, Order::Desc)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Ended global polls the user voted on, most recently ended first.
    pub async fn find_finished_voted_by(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<poll::Model>> {
        Poll::find()
            .filter(poll::Column::RoomId.is_null())
            .filter(poll::Column::EndTime.lte(now))
            .filter(
                poll::Column::Id.in_subquery(
                    Query::select()
                        .column(vote::Column::PollId)
                        .from(vote::Entity)
                        .and_where(vote::Column::UserId.eq(user_id))
                        .to_owned(),
                ),
            )
            .order_by(poll::Column::EndTime, Order::Desc)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Set};

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<poll::Model>::new()])
                .into_connection(),
        );

        let repo = PollRepository::new(db);
        let result = repo.get_by_id("missing").await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_find_by_room_attaches_lifecycles() {
        let p1 = fixtures::room_poll("p1", "room1", "admin");
        let p2 = fixtures::room_poll("p2", "room1", "admin");
        let lc1 = fixtures::lifecycle_active("p1", "room1", 10);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[p1, p2]])
                .append_query_results([[lc1]])
                .into_connection(),
        );

        let repo = PollRepository::new(db);
        let polls = repo.find_by_room("room1").await.unwrap();

        assert_eq!(polls.len(), 2);
        assert_eq!(polls[0].poll.id, "p1");
        assert!(polls[0].lifecycle.is_some());
        assert!(polls[1].lifecycle.is_none());
    }

    #[tokio::test]
    async fn test_find_by_room_empty_skips_lifecycle_query() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<poll::Model>::new()])
                .into_connection(),
        );

        let repo = PollRepository::new(db);
        assert!(repo.find_by_room("room1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_with_lifecycle() {
        let poll = fixtures::room_poll("p1", "room1", "admin");
        let lifecycle = fixtures::lifecycle_pending("p1", "room1", 5);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[poll.clone()]])
                .append_query_results([[lifecycle.clone()]])
                .into_connection(),
        );

        let repo = PollRepository::new(db);
        let created = repo
            .create_with_lifecycle(
                poll::ActiveModel {
                    id: Set("p1".to_string()),
                    ..Default::default()
                },
                room_poll::ActiveModel {
                    poll_id: Set("p1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(created.poll.id, "p1");
        assert_eq!(created.lifecycle.unwrap().duration_minutes, 5);
    }

    #[tokio::test]
    async fn test_delete_reports_missing_row() {
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

        let repo = PollRepository::new(db);

        assert!(repo.delete("p1").await.unwrap());
        assert!(!repo.delete("p1").await.unwrap());
    }
}
