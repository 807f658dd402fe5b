use thiserror::Error;

/// Failures of the durable storage backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store service request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store service answered with status {0}")]
    Status(u16),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors of the session synchronization core
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("proposal revision {proposed} is not newer than {current}")]
    StaleProposal { proposed: i64, current: i64 },
    #[error("session '{0}' not found")]
    SessionNotFound(String),
    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(#[from] StoreError),
    #[error("connection closed")]
    TransportDisconnect,
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl SessionError {
    /// Short machine readable code sent to clients in `error` frames
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::StaleProposal { .. } => "stale_proposal",
            SessionError::SessionNotFound(_) => "session_not_found",
            SessionError::PersistenceUnavailable(_) => "persistence_unavailable",
            SessionError::TransportDisconnect => "transport_disconnect",
            SessionError::InvalidMessage(_) => "invalid_message",
        }
    }

    /// Only session identity and malformed input are reported back to the client
    pub fn is_client_visible(&self) -> bool {
        matches!(self, SessionError::SessionNotFound(_) | SessionError::InvalidMessage(_))
    }
}
