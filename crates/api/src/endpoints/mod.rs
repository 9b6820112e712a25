//! API endpoints.

mod polls;
mod rooms;

use axum::Router;
use serde::Deserialize;

use crate::middleware::AppState;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/rooms", rooms::router())
        .nest("/polls", polls::router())
}

/// Vote request body, shared by room and global polls.
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    /// Missing is reported as an invalid option rather than a parse error.
    #[serde(default)]
    pub option_selected: Option<i32>,
}

impl VoteRequest {
    fn option(&self) -> pollhub_common::AppResult<i32> {
        self.option_selected.ok_or_else(|| {
            pollhub_common::AppError::InvalidOption("Option required".to_string())
        })
    }
}
