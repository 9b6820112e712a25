//! Authenticated caller identity.

use pollhub_db::entities::user;

/// The authenticated caller of a core operation.
///
/// Built once per request (or per WebSocket connection) from the bearer
/// token and passed explicitly into every operation that authorizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    /// Name shown to other viewers.
    pub display_name: String,
    /// Site administrator.
    pub is_admin: bool,
}

impl Identity {
    #[must_use]
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            is_admin: false,
        }
    }

    #[must_use]
    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }
}

impl From<&user::Model> for Identity {
    fn from(user: &user::Model) -> Self {
        Self {
            user_id: user.id.clone(),
            display_name: user.display_name().to_string(),
            is_admin: user.is_admin,
        }
    }
}
