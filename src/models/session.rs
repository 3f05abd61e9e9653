use serde::{Deserialize, Serialize};

/// Authenticated user as seen by the core. Anonymous callers have no session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: None,
        }
    }
}
