//! Vote repository.

use std::sync::Arc;

use crate::entities::{Vote, vote};
use pollhub_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, FromQueryResult,
    IntoActiveModel, PaginatorTrait, QueryFilter, QuerySelect, SqlErr, sea_query::Expr,
};

/// Vote count for one option of one poll.
#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult)]
pub struct OptionCount {
    pub option_selected: i32,
    pub vote_count: i64,
}

/// Vote count for one option, keyed by poll.
#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult)]
pub struct PollOptionCount {
    pub poll_id: String,
    pub option_selected: i32,
    pub vote_count: i64,
}

/// Whether a database error is a unique constraint violation.
#[must_use]
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
        || err.to_string().contains("duplicate key value")
}

/// Vote repository for database operations.
#[derive(Clone)]
pub struct VoteRepository {
    db: Arc<DatabaseConnection>,
}

impl VoteRepository {
    /// Create a new vote repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Insert a vote on the given connection.
    ///
    /// The `(poll_id, user_id)` unique index is the final arbiter of the
    /// one-vote-per-user rule; hitting it yields [`AppError::DuplicateVote`].
    pub async fn insert_on<C: ConnectionTrait>(&self, conn: &C, model: vote::Model) -> AppResult<()> {
        Vote::insert(model.into_active_model().reset_all())
            .exec_without_returning(conn)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::DuplicateVote
                } else {
                    AppError::Database(e.to_string())
                }
            })?;
        Ok(())
    }

    /// Find a user's vote on a poll.
    pub async fn find_by_user_and_poll(
        &self,
        user_id: &str,
        poll_id: &str,
    ) -> AppResult<Option<vote::Model>> {
        Vote::find()
            .filter(vote::Column::UserId.eq(user_id))
            .filter(vote::Column::PollId.eq(poll_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// A user's votes across several polls.
    pub async fn find_by_user_and_polls(
        &self,
        user_id: &str,
        poll_ids: &[String],
    ) -> AppResult<Vec<vote::Model>> {
        if poll_ids.is_empty() {
            return Ok(vec![]);
        }

        Vote::find()
            .filter(vote::Column::UserId.eq(user_id))
            .filter(vote::Column::PollId.is_in(poll_ids.iter().cloned()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Total votes recorded for a poll.
    pub async fn count_by_poll(&self, poll_id: &str) -> AppResult<u64> {
        Vote::find()
            .filter(vote::Column::PollId.eq(poll_id))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Per-option counts for one poll, in a single grouped query.
    ///
    /// Options without votes are absent from the result.
    pub async fn count_by_option(&self, poll_id: &str) -> AppResult<Vec<OptionCount>> {
        Vote::find()
            .select_only()
            .column(vote::Column::OptionSelected)
            .column_as(Expr::col(vote::Column::Id).count(), "vote_count")
            .filter(vote::Column::PollId.eq(poll_id))
            .group_by(vote::Column::OptionSelected)
            .into_model::<OptionCount>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Per-option counts for several polls, in a single grouped query.
    pub async fn count_by_option_many(
        &self,
        poll_ids: &[String],
    ) -> AppResult<Vec<PollOptionCount>> {
        if poll_ids.is_empty() {
            return Ok(vec![]);
        }

        Vote::find()
            .select_only()
            .column(vote::Column::PollId)
            .column(vote::Column::OptionSelected)
            .column_as(Expr::col(vote::Column::Id).count(), "vote_count")
            .filter(vote::Column::PollId.is_in(poll_ids.iter().cloned()))
            .group_by(vote::Column::PollId)
            .group_by(vote::Column::OptionSelected)
            .into_model::<PollOptionCount>()
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
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, RuntimeErr, Value};

    fn duplicate_key_error() -> DbErr {
        DbErr::Exec(RuntimeErr::Internal(
            "duplicate key value violates unique constraint \"idx_vote_poll_user\"".to_string(),
        ))
    }

    #[test]
    fn test_is_unique_violation() {
        assert!(is_unique_violation(&duplicate_key_error()));
        assert!(!is_unique_violation(&DbErr::Custom("boom".to_string())));
    }

    #[tokio::test]
    async fn test_insert_maps_unique_violation_to_duplicate_vote() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .append_exec_errors([duplicate_key_error()])
            .into_connection();

        let repo = VoteRepository::new(Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
        ));

        let first = repo.insert_on(&db, fixtures::vote("v1", "p1", "user1", 2)).await;
        assert!(first.is_ok());

        let second = repo.insert_on(&db, fixtures::vote("v2", "p1", "user1", 3)).await;
        assert!(matches!(second, Err(AppError::DuplicateVote)));
    }

    #[tokio::test]
    async fn test_insert_passes_other_errors_through() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_errors([DbErr::Custom("connection reset".to_string())])
            .into_connection();

        let repo = VoteRepository::new(Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
        ));

        let result = repo.insert_on(&db, fixtures::vote("v1", "p1", "user1", 1)).await;
        assert!(matches!(result, Err(AppError::Database(_))));
    }

    #[tokio::test]
    async fn test_count_by_option() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![
                    maplit::btreemap! {
                        "option_selected" => Value::Int(Some(1)),
                        "vote_count" => Value::BigInt(Some(3)),
                    },
                    maplit::btreemap! {
                        "option_selected" => Value::Int(Some(4)),
                        "vote_count" => Value::BigInt(Some(1)),
                    },
                ]])
                .into_connection(),
        );

        let repo = VoteRepository::new(db);
        let counts = repo.count_by_option("p1").await.unwrap();

        assert_eq!(
            counts,
            vec![
                OptionCount {
                    option_selected: 1,
                    vote_count: 3
                },
                OptionCount {
                    option_selected: 4,
                    vote_count: 1
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_count_by_option_many_empty_input() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let repo = VoteRepository::new(db);

        assert!(repo.count_by_option_many(&[]).await.unwrap().is_empty());
        assert!(repo.find_by_user_and_polls("user1", &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_count_by_poll() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![maplit::btreemap! {
                    "num_items" => Value::BigInt(Some(7)),
                }]])
                .into_connection(),
        );

        let repo = VoteRepository::new(db);
        assert_eq!(repo.count_by_poll("p1").await.unwrap(), 7);
    }
}
