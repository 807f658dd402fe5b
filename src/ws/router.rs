use std::sync::Arc;
use tracing::debug;

use crate::models::ServerMessage;
use crate::ws::session::SessionHandle;

/// Who receives a broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    Everyone,
    AllExcept(String),
}

/// A message fanned out to every subscriber of a session
#[derive(Debug, Clone)]
pub struct Envelope {
    pub audience: Audience,
    pub message: Arc<ServerMessage>,
}

impl Envelope {
    pub fn is_for(&self, connection_id: &str) -> bool {
        match &self.audience {
            Audience::Everyone => true,
            Audience::AllExcept(origin) => origin != connection_id,
        }
    }
}

/// Best-effort, at-most-once delivery to all live connections of a session.
/// Returns the number of subscribers the message was handed to.
pub fn broadcast(session: &SessionHandle, audience: Audience, message: ServerMessage) -> usize {
    let envelope = Envelope {
        audience,
        message: Arc::new(message),
    };
    match session.sender().send(envelope) {
        Ok(receivers) => receivers,
        Err(_) => {
            debug!(session_id = %session.id, "No subscribers left for broadcast");
            0
        }
    }
}

pub fn to_all(session: &SessionHandle, message: ServerMessage) -> usize {
    broadcast(session, Audience::Everyone, message)
}

pub fn to_others(session: &SessionHandle, origin: &str, message: ServerMessage) -> usize {
    broadcast(session, Audience::AllExcept(origin.to_string()), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PongMessage, UserTypingMessage};

    #[tokio::test]
    async fn others_skips_origin_only() {
        let session = SessionHandle::new("r1", 16);
        let mut rx = session.subscribe();

        to_others(
            &session,
            "a",
            ServerMessage::UserTyping(UserTypingMessage { display_name: "ada".to_string() }),
        );
        let envelope = rx.recv().await.unwrap();
        assert!(!envelope.is_for("a"));
        assert!(envelope.is_for("b"));
    }

    #[tokio::test]
    async fn everyone_includes_origin() {
        let session = SessionHandle::new("r1", 16);
        let mut rx = session.subscribe();
        let delivered = to_all(&session, ServerMessage::Pong(PongMessage { date: "now".to_string() }));
        assert_eq!(delivered, 1);
        assert!(rx.recv().await.unwrap().is_for("a"));
    }

    #[test]
    fn broadcast_without_subscribers_is_dropped() {
        let session = SessionHandle::new("r1", 16);
        let delivered = to_all(&session, ServerMessage::Pong(PongMessage { date: "now".to_string() }));
        assert_eq!(delivered, 0);
    }
}
