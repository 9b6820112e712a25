//! Global poll endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
};
use pollhub_common::AppResult;
use pollhub_core::{CreateGlobalPollInput, PollView, VoteScope};

use super::{VoteRequest, rooms::VoteResponse};
use crate::{
    extractors::AuthUser,
    middleware::AppState,
    response::{self, ApiResponse},
};

async fn create(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreateGlobalPollInput>,
) -> AppResult<ApiResponse<PollView>> {
    let poll = state
        .poll_service
        .create_global_poll(&identity, input)
        .await?;
    Ok(ApiResponse::created(poll))
}

async fn active(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<PollView>>> {
    Ok(ApiResponse::ok(
        state.poll_service.list_active(&identity).await?,
    ))
}

async fn mine(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<PollView>>> {
    Ok(ApiResponse::ok(state.poll_service.list_mine(&identity).await?))
}

async fn finished(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<PollView>>> {
    Ok(ApiResponse::ok(
        state.poll_service.list_finished(&identity).await?,
    ))
}

async fn show(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
) -> AppResult<ApiResponse<PollView>> {
    Ok(ApiResponse::ok(
        state.poll_service.get_poll(&identity, &poll_id).await?,
    ))
}

async fn results(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
) -> AppResult<ApiResponse<PollView>> {
    Ok(ApiResponse::ok(
        state.poll_service.results(&identity, &poll_id).await?,
    ))
}

async fn vote(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
    Json(req): Json<VoteRequest>,
) -> AppResult<ApiResponse<VoteResponse>> {
    let option = req.option()?;
    let recorded = state
        .vote_service
        .record_vote(&identity, &poll_id, option, VoteScope::Global)
        .await?;
    Ok(ApiResponse::ok(recorded.into()))
}

async fn delete(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.poll_service.delete_poll(&identity, &poll_id).await?;
    Ok(response::ok())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create))
        .route("/active", get(active))
        .route("/mine", get(mine))
        .route("/finished", get(finished))
        .route("/{poll_id}", get(show).delete(delete))
        .route("/{poll_id}/results", get(results))
        .route("/{poll_id}/vote", post(vote))
}
