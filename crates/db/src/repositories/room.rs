//! Room repository.
//!
//! Rooms and memberships are maintained elsewhere; this repository only
//! answers the questions the poll core asks of them.

use std::sync::Arc;

use crate::entities::{Room, RoomMember, room, room_member};
use pollhub_common::{AppError, AppResult};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
};

/// Repository for room lookups.
#[derive(Clone)]
pub struct RoomRepository {
    db: Arc<DatabaseConnection>,
}

impl RoomRepository {
    /// Create a new room repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find room by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<room::Model>> {
        Room::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get room by ID, returning error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<room::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Room not found: {id}")))
    }

    /// Check room membership on the given connection.
    pub async fn is_member_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        room_id: &str,
        user_id: &str,
    ) -> AppResult<bool> {
        let count = RoomMember::find()
            .filter(room_member::Column::RoomId.eq(room_id))
            .filter(room_member::Column::UserId.eq(user_id))
            .count(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(count > 0)
    }

    /// Check room membership.
    pub async fn is_member(&self, room_id: &str, user_id: &str) -> AppResult<bool> {
        self.is_member_on(self.db.as_ref(), room_id, user_id).await
    }

    /// Check whether a user may see the room: its creator or a member.
    pub async fn can_view(&self, room: &room::Model, user_id: &str) -> AppResult<bool> {
        if room.is_admin(user_id) {
            return Ok(true);
        }
        self.is_member(&room.id, user_id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<room::Model>::new()])
                .into_connection(),
        );

        let repo = RoomRepository::new(db);
        let result = repo.get_by_id("missing").await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_is_member_counts_rows() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[maplit::btreemap! {
                    "num_items" => sea_orm::Value::BigInt(Some(1))
                }]])
                .append_query_results([[maplit::btreemap! {
                    "num_items" => sea_orm::Value::BigInt(Some(0))
                }]])
                .into_connection(),
        );

        let repo = RoomRepository::new(db);

        assert!(repo.is_member("room1", "member").await.unwrap());
        assert!(!repo.is_member("room1", "stranger").await.unwrap());
    }

    #[tokio::test]
    async fn test_can_view_admin_skips_membership_query() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let room = fixtures::room("room1", "admin");

        let repo = RoomRepository::new(db);

        assert!(repo.can_view(&room, "admin").await.unwrap());
    }
}
