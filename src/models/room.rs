use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::models::{Language, Participant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoomVisibility {
    #[default]
    Public,
    Private,
}

impl fmt::Display for RoomVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomVisibility::Public => write!(f, "public"),
            RoomVisibility::Private => write!(f, "private"),
        }
    }
}

/// Durable record of a room as kept by the persistence collaborator.
/// The credential hash of private rooms never leaves that collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomRecord {
    pub room_id: String,
    #[serde(default)]
    pub room_name: String,
    #[serde(default)]
    pub admin: String,
    #[serde(default)]
    pub visibility: RoomVisibility,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub revision: i64,
    #[serde(default)]
    pub participants: Vec<Participant>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoomRecord {
    /// A fresh record for a room created on first join
    pub fn new(room_id: impl Into<String>, admin: impl Into<String>, code: impl Into<String>) -> Self {
        let room_id = room_id.into();
        let now = Utc::now();
        Self {
            room_name: room_id.clone(),
            room_id,
            admin: admin.into(),
            visibility: RoomVisibility::Public,
            code: code.into(),
            language: Language::default(),
            revision: 0,
            participants: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Buffer state written by a checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCheckpoint {
    pub room_id: String,
    pub code: String,
    pub language: Language,
    pub revision: i64,
    pub updated_at: DateTime<Utc>,
}
