use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::store::SessionStore;
use crate::error::SessionError;
use crate::models::{
    ChatMessage, CodeChangeMessage, JoinRoomMessage, LanguageChangeMessage, Participant,
    ParticipantJoinedMessage, ParticipantLeftMessage, RoomRecord, ServerMessage,
    SessionSnapshotResponse, SnapshotSource, TypingMessage, UserTypingMessage,
};
use crate::services::sync_service::PersistenceSynchronizer;
use crate::ws::presence;
use crate::ws::registry::SessionRegistry;
use crate::ws::resolver::{Accepted, EditProposal, LanguageProposal, RevisionResolver};
use crate::ws::router::{self, Envelope};
use crate::ws::session::{SessionHandle, SessionState};

/// Result of a successful join
#[derive(Debug)]
pub struct Joined {
    pub session: Arc<SessionHandle>,
    pub receiver: broadcast::Receiver<Envelope>,
    pub participant: Participant,
    pub roster: Vec<Participant>,
}

/// Entry point for every session mutation coming from a connection.
///
/// Each operation takes the session lock for its read-modify-write and
/// broadcast, and leaves durable I/O to the synchronizer.
#[derive(Clone)]
pub struct SessionService {
    registry: SessionRegistry,
    sync: PersistenceSynchronizer,
    resolver: RevisionResolver,
    auto_create: bool,
    notify_stale_edits: bool,
}

impl SessionService {
    pub fn new(config: &Config, store: Arc<dyn SessionStore>) -> Self {
        let resolver = RevisionResolver::new(config.revision_mode);
        debug!("Session service on {} storage, {:?} revisions", store.backend(), resolver.mode());
        Self {
            registry: SessionRegistry::new(config.broadcast_capacity),
            sync: PersistenceSynchronizer::new(store, config.checkpoint_debounce()),
            resolver,
            auto_create: config.auto_create_sessions,
            notify_stale_edits: config.notify_stale_edits,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn synchronizer(&self) -> &PersistenceSynchronizer {
        &self.sync
    }

    pub fn notify_stale_edits(&self) -> bool {
        self.notify_stale_edits
    }

    /// Register a connection in a session, hydrating the session when cold.
    ///
    /// The returned receiver is subscribed before the roster broadcast, so
    /// the joining connection sees its own `room_state`.
    pub async fn join(&self, connection_id: &str, request: JoinRoomMessage) -> Result<Joined, SessionError> {
        if request.session_id.trim().is_empty() {
            return Err(SessionError::InvalidMessage("session id must not be empty".to_string()));
        }

        loop {
            let session = self.registry.get_or_create(&request.session_id);
            let template = self.auto_create.then(|| {
                RoomRecord::new(
                    session.id.clone(),
                    request.display_name.clone(),
                    request.current_buffer.clone().unwrap_or_default(),
                )
            });
            match self.sync.reconcile(&session, template).await {
                Ok(()) => {}
                Err(SessionError::PersistenceUnavailable(e)) => {
                    warn!(session_id = %session.id, "Storage unreachable, merging later: {}", e);
                }
                Err(e) => {
                    self.discard_if_unused(&session).await;
                    return Err(e);
                }
            }

            let mut state = session.lock().await;
            if state.evicted {
                // Lost a race with eviction, register again
                continue;
            }

            let receiver = session.subscribe();
            let participant = Participant::new(connection_id, request.display_name.clone(), request.is_admin);
            let roster = presence::join(&mut state, participant.clone());

            router::to_all(&session, ServerMessage::RoomState(state.room_state()));
            router::to_all(
                &session,
                ServerMessage::ParticipantJoined(ParticipantJoinedMessage {
                    participant: participant.clone(),
                    participants: roster.clone(),
                }),
            );
            self.sync.record_join(&session, &participant);
            drop(state);

            info!(
                session_id = %session.id,
                connection_id = %connection_id,
                "{} joined ({} participants)",
                participant.username,
                roster.len()
            );

            return Ok(Joined {
                session,
                receiver,
                participant,
                roster,
            });
        }
    }

    async fn discard_if_unused(&self, session: &Arc<SessionHandle>) {
        let mut state = session.lock().await;
        if state.participants.is_empty() && !state.dirty && !state.evicted {
            state.evicted = true;
            self.registry.remove(&session.id);
        }
    }

    fn ensure_member(state: &SessionState, connection_id: &str) -> Result<(), SessionError> {
        if state.evicted || presence::find(state, connection_id).is_none() {
            return Err(SessionError::SessionNotFound(state.session_id.clone()));
        }
        Ok(())
    }

    /// Run a buffer edit through the resolver and fan it out on acceptance
    pub async fn apply_edit(&self, connection_id: &str, change: CodeChangeMessage) -> Result<Accepted, SessionError> {
        let session = self.registry.get(&change.session_id)?;
        let accepted = {
            let mut state = session.lock().await;
            Self::ensure_member(&state, connection_id)?;

            let proposal = EditProposal {
                payload: change.buffer.clone(),
                proposer: change.proposer_name.clone(),
                revision: change.revision_stamp,
            };
            let accepted = self.resolver.apply(&mut state, proposal).map_err(|e| {
                debug!(session_id = %session.id, connection_id = %connection_id, "Dropping edit: {}", e);
                e
            })?;

            router::to_others(
                &session,
                connection_id,
                ServerMessage::CodeChange(CodeChangeMessage {
                    revision_stamp: accepted.revision,
                    ..change
                }),
            );
            accepted
        };

        self.sync.schedule_checkpoint(&session);
        Ok(accepted)
    }

    pub async fn change_language(
        &self,
        connection_id: &str,
        change: LanguageChangeMessage,
    ) -> Result<Accepted, SessionError> {
        let session = self.registry.get(&change.session_id)?;
        let accepted = {
            let mut state = session.lock().await;
            Self::ensure_member(&state, connection_id)?;

            let proposal = LanguageProposal {
                language: change.language,
                proposer: change.proposer_name.clone(),
                revision: change.revision_stamp,
            };
            let accepted = self.resolver.apply_language(&mut state, proposal).map_err(|e| {
                debug!(session_id = %session.id, connection_id = %connection_id, "Dropping language change: {}", e);
                e
            })?;

            info!(session_id = %session.id, "{} switched language to {}", accepted.proposer, change.language);
            router::to_others(
                &session,
                connection_id,
                ServerMessage::LanguageChange(LanguageChangeMessage {
                    revision_stamp: Some(accepted.revision),
                    timestamp: Some(Utc::now().to_rfc3339()),
                    ..change
                }),
            );
            accepted
        };

        self.sync.schedule_checkpoint(&session);
        Ok(accepted)
    }

    /// Remove a connection from a session. Unknown sessions and connections are ignored.
    pub async fn leave(&self, connection_id: &str, session_id: &str) -> Option<Participant> {
        let session = self.registry.get(session_id).ok()?;
        let (left, now_empty) = {
            let mut state = session.lock().await;
            let left = presence::leave(&mut state, connection_id)?;
            router::to_others(
                &session,
                connection_id,
                ServerMessage::ParticipantLeft(ParticipantLeftMessage {
                    connection_id: connection_id.to_string(),
                    participants: state.participants.clone(),
                }),
            );
            self.sync.record_leave(&session, connection_id);
            (left, state.participants.is_empty())
        };

        info!(session_id = %session_id, connection_id = %connection_id, "{} left", left.username);

        if now_empty {
            let service = self.clone();
            tokio::spawn(async move { service.evict_when_idle(session).await });
        }
        Some(left)
    }

    /// Flush an empty session and drop it from the registry once storage has it.
    /// Stops as soon as someone joins again.
    async fn evict_when_idle(&self, session: Arc<SessionHandle>) {
        loop {
            if !session.lock().await.participants.is_empty() {
                return;
            }

            if let Err(e) = self.sync.flush(&session).await {
                warn!(session_id = %session.id, "Eviction postponed, flush failed: {}", e);
                tokio::time::sleep(self.sync.debounce()).await;
                continue;
            }

            let mut state = session.lock().await;
            if state.evicted || !state.participants.is_empty() {
                return;
            }
            if state.dirty {
                continue;
            }
            state.evicted = true;
            self.registry.remove(&session.id);
            info!(session_id = %session.id, "Idle session evicted, {} sessions loaded", self.registry.len());
            return;
        }
    }

    /// Relay a chat line to the other participants. Chat is not session state.
    pub async fn relay_chat(&self, connection_id: &str, message: ChatMessage) -> Result<(), SessionError> {
        let session = self.registry.get(&message.session_id)?;
        let state = session.lock().await;
        Self::ensure_member(&state, connection_id)?;
        router::to_others(&session, connection_id, ServerMessage::ChatMessage(message));
        Ok(())
    }

    pub async fn relay_typing(&self, connection_id: &str, message: TypingMessage) -> Result<(), SessionError> {
        let session = self.registry.get(&message.session_id)?;
        let state = session.lock().await;
        let participant = presence::find(&state, connection_id)
            .ok_or_else(|| SessionError::SessionNotFound(message.session_id.clone()))?;
        router::to_others(
            &session,
            connection_id,
            ServerMessage::UserTyping(UserTypingMessage {
                display_name: participant.username.clone(),
            }),
        );
        Ok(())
    }

    /// Live state when registered, else what durable storage has
    pub async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshotResponse, SessionError> {
        if let Ok(session) = self.registry.get(session_id) {
            let state = session.lock().await;
            if !state.evicted {
                return Ok(SessionSnapshotResponse {
                    session_id: state.session_id.clone(),
                    buffer: state.buffer.clone(),
                    language: state.language,
                    revision_stamp: state.revision_stamp(),
                    participants: state.participants.clone(),
                    dirty: state.dirty,
                    source: SnapshotSource::Memory,
                });
            }
        }

        let record = self
            .sync
            .store()
            .fetch_room(session_id)
            .await?
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))?;
        Ok(SessionSnapshotResponse {
            session_id: record.room_id,
            buffer: record.code,
            language: record.language,
            revision_stamp: record.revision,
            participants: record.participants,
            dirty: false,
            source: SnapshotSource::Storage,
        })
    }

    /// Flush every dirty session. Returns the number of sessions that could not be written.
    pub async fn shutdown(&self) -> usize {
        let sessions = self.registry.sessions();
        info!("Flushing {} sessions", sessions.len());
        self.sync.flush_all(&sessions).await
    }
}
