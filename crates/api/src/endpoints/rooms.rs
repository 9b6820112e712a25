//! Room poll endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use pollhub_common::AppResult;
use pollhub_core::{CreateRoomPollInput, RoomPollView, VoteScope};
use pollhub_db::entities::room_poll::{self, RoomPollStatus};
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::Serialize;

use super::VoteRequest;
use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// Lifecycle state after a start or close.
#[derive(Debug, Serialize)]
pub struct LifecycleResponse {
    pub poll_id: String,
    pub room_id: String,
    pub poll_status: RoomPollStatus,
    pub started_at: Option<DateTimeWithTimeZone>,
    pub closed_at: Option<DateTimeWithTimeZone>,
    pub duration_minutes: i32,
}

impl From<room_poll::Model> for LifecycleResponse {
    fn from(record: room_poll::Model) -> Self {
        Self {
            poll_id: record.poll_id,
            room_id: record.room_id,
            poll_status: record.status,
            started_at: record.started_at,
            closed_at: record.closed_at,
            duration_minutes: record.duration_minutes,
        }
    }
}

/// Accepted vote.
#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub message: &'static str,
    pub poll_id: String,
    pub option_selected: i32,
    #[serde(flatten)]
    pub tally: Option<pollhub_core::Tally>,
}

impl From<pollhub_core::RecordedVote> for VoteResponse {
    fn from(recorded: pollhub_core::RecordedVote) -> Self {
        Self {
            message: "Vote recorded",
            poll_id: recorded.vote.poll_id,
            option_selected: recorded.vote.option_selected,
            tally: recorded.tally,
        }
    }
}

async fn create_poll(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(input): Json<CreateRoomPollInput>,
) -> AppResult<ApiResponse<RoomPollView>> {
    let view = state
        .poll_service
        .create_room_poll(&identity, &room_id, input)
        .await?;
    Ok(ApiResponse::created(view))
}

async fn list_polls(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> AppResult<ApiResponse<Vec<RoomPollView>>> {
    let polls = state
        .poll_service
        .list_room_polls(&identity, &room_id)
        .await?;
    Ok(ApiResponse::ok(polls))
}

async fn start_poll(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Path((room_id, poll_id)): Path<(String, String)>,
) -> AppResult<ApiResponse<LifecycleResponse>> {
    let record = state
        .lifecycle_service
        .start(&identity, &room_id, &poll_id)
        .await?;
    Ok(ApiResponse::ok(record.into()))
}

async fn close_poll(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Path((room_id, poll_id)): Path<(String, String)>,
) -> AppResult<ApiResponse<LifecycleResponse>> {
    let record = state
        .lifecycle_service
        .close(&identity, &room_id, &poll_id)
        .await?;
    Ok(ApiResponse::ok(record.into()))
}

async fn vote(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Path((room_id, poll_id)): Path<(String, String)>,
    Json(req): Json<VoteRequest>,
) -> AppResult<ApiResponse<VoteResponse>> {
    let option = req.option()?;
    let recorded = state
        .vote_service
        .record_vote(&identity, &poll_id, option, VoteScope::Room { room_id })
        .await?;
    Ok(ApiResponse::ok(recorded.into()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{room_id}/polls", get(list_polls).post(create_poll))
        .route("/{room_id}/polls/{poll_id}/start", post(start_poll))
        .route("/{room_id}/polls/{poll_id}/close", post(close_poll))
        .route("/{room_id}/polls/{poll_id}/vote", post(vote))
}
