//! API middleware.

use std::sync::Arc;

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use pollhub_common::config::PollsConfig;
use pollhub_core::{
    BroadcastCoordinator, LifecycleService, PollService, UserService, VoteService,
};
use pollhub_db::repositories::{
    PollRepository, RoomPollRepository, RoomRepository, UserRepository, VoteRepository,
};
use sea_orm::DatabaseConnection;
use tracing::debug;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub user_service: UserService,
    pub poll_service: PollService,
    pub vote_service: VoteService,
    pub lifecycle_service: LifecycleService,
    pub broadcaster: Arc<BroadcastCoordinator>,
}

impl AppState {
    /// Wire repositories and services over one connection pool.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>, polls: &PollsConfig) -> Self {
        let user_repo = UserRepository::new(Arc::clone(&db));
        let poll_repo = PollRepository::new(Arc::clone(&db));
        let room_repo = RoomRepository::new(Arc::clone(&db));
        let room_poll_repo = RoomPollRepository::new(Arc::clone(&db));
        let vote_repo = VoteRepository::new(Arc::clone(&db));

        let broadcaster = Arc::new(BroadcastCoordinator::new(polls.viewer_buffer));

        let lifecycle_service = LifecycleService::new(
            room_repo.clone(),
            room_poll_repo.clone(),
            broadcaster.clone(),
        );
        let vote_service = VoteService::new(
            db,
            poll_repo.clone(),
            room_repo.clone(),
            room_poll_repo.clone(),
            vote_repo.clone(),
            lifecycle_service.clone(),
            broadcaster.clone(),
            polls.vote_timeout(),
        );
        let poll_service = PollService::new(
            poll_repo,
            room_repo,
            room_poll_repo,
            vote_repo,
            user_repo.clone(),
            lifecycle_service.clone(),
            polls.max_duration_minutes,
        );

        Self {
            user_service: UserService::new(user_repo),
            poll_service,
            vote_service,
            lifecycle_service,
            broadcaster,
        }
    }
}

/// Authentication middleware.
///
/// Resolves `Authorization: Bearer <token>` to an
/// [`Identity`](pollhub_core::Identity) request extension. Requests without
/// a valid token pass through unauthenticated.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(auth_header) = req.headers().get("Authorization")
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        match state.user_service.identify(token).await {
            Ok(identity) => {
                req.extensions_mut().insert(identity);
            }
            Err(e) => debug!(error = %e, "Bearer token rejected"),
        }
    }

    next.run(req).await
}
