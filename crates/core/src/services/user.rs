//! User service.

use pollhub_common::{AppError, AppResult};
use pollhub_db::{entities::user, repositories::UserRepository};

use crate::identity::Identity;

/// Resolves bearer tokens to users.
#[derive(Clone)]
pub struct UserService {
    user_repo: UserRepository,
}

impl UserService {
    #[must_use]
    pub const fn new(user_repo: UserRepository) -> Self {
        Self { user_repo }
    }

    /// Authenticate a user by access token.
    pub async fn authenticate_by_token(&self, token: &str) -> AppResult<user::Model> {
        self.user_repo
            .find_by_token(token)
            .await?
            .ok_or(AppError::Unauthorized)
    }

    /// Authenticate and build the caller identity in one step.
    pub async fn identify(&self, token: &str) -> AppResult<Identity> {
        self.authenticate_by_token(token)
            .await
            .map(|user| Identity::from(&user))
    }
}
