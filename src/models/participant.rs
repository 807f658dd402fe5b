use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A live connection's presence in a session.
///
/// Identity is the connection id, not the display name: a user who
/// reconnects gets a new entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub connection_id: String,
    pub username: String,
    pub is_admin: bool,
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(connection_id: impl Into<String>, username: impl Into<String>, is_admin: bool) -> Self {
        Self {
            connection_id: connection_id.into(),
            username: username.into(),
            is_admin,
            joined_at: Utc::now(),
        }
    }
}
