use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Language, Participant};

/// Where a session snapshot was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotSource {
    Memory,
    Storage,
}

/// API response describing a session
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshotResponse {
    pub session_id: String,
    pub buffer: String,
    pub language: Language,
    pub revision_stamp: i64,
    pub participants: Vec<Participant>,
    pub dirty: bool,
    pub source: SnapshotSource,
}
