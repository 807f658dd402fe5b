use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::SessionError;
use crate::models::{ErrorMessage, ServerMessage};
use crate::services::session_service::SessionService;
use crate::ws::router::Envelope;

pub type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Serialize and write one frame. Returns false once the socket is gone.
pub async fn send_frame(sender: &WsSender, message: &ServerMessage) -> bool {
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to serialize outbound message: {}", e);
            return true;
        }
    };
    sender.lock().await.send(Message::Text(text)).await.is_ok()
}

/// State of one websocket connection
pub struct ConnCtx {
    pub connection_id: String,
    sender: WsSender,
    session_id: Option<String>,
    forwarder: Option<JoinHandle<()>>,
}

impl ConnCtx {
    pub fn new(connection_id: String, sender: WsSender) -> Self {
        Self {
            connection_id,
            sender,
            session_id: None,
            forwarder: None,
        }
    }

    pub fn current_session(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Frames naming another session than the joined one are refused
    pub fn ensure_scope(&self, session_id: &str) -> Result<(), SessionError> {
        if self.current_session() == Some(session_id) {
            Ok(())
        } else {
            Err(SessionError::SessionNotFound(session_id.to_string()))
        }
    }

    pub async fn send(&self, message: ServerMessage) {
        if !send_frame(&self.sender, &message).await {
            debug!(connection_id = %self.connection_id, "Dropping reply, socket closed");
        }
    }

    pub async fn send_error(&self, e: &SessionError) {
        self.send(ServerMessage::Error(ErrorMessage {
            code: e.code().to_string(),
            message: e.to_string(),
        }))
        .await;
    }

    /// Start forwarding the broadcasts of a joined session to this socket
    pub fn attach(&mut self, session_id: String, mut receiver: broadcast::Receiver<Envelope>) {
        self.stop_forwarding();

        let sender = self.sender.clone();
        let connection_id = self.connection_id.clone();
        let scope = session_id.clone();
        self.forwarder = Some(tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(envelope) => {
                        if !envelope.is_for(&connection_id) {
                            continue;
                        }
                        if !send_frame(&sender, &envelope.message).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Missed frames are recovered by the next room_state
                        warn!(session_id = %scope, connection_id = %connection_id, "Connection lagged, {} messages skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
        self.session_id = Some(session_id);
    }

    /// Leave the joined session, if any
    pub async fn detach(&mut self, service: &SessionService) {
        self.stop_forwarding();
        if let Some(session_id) = self.session_id.take() {
            service.leave(&self.connection_id, &session_id).await;
        }
    }

    fn stop_forwarding(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

impl Drop for ConnCtx {
    fn drop(&mut self) {
        self.stop_forwarding();
    }
}
