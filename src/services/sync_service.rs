use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::db::store::SessionStore;
use crate::error::SessionError;
use crate::models::{Participant, RoomRecord, ServerMessage};
use crate::ws::router;
use crate::ws::session::{RosterWrite, SessionHandle, SessionState};

/// Keeps durable storage eventually consistent with in-memory sessions.
///
/// Buffer and language are written by a trailing-edge debounced checkpoint.
/// Roster changes are queued per session and written in order.
#[derive(Clone)]
pub struct PersistenceSynchronizer {
    store: Arc<dyn SessionStore>,
    debounce: Duration,
}

impl PersistenceSynchronizer {
    pub fn new(store: Arc<dyn SessionStore>, debounce: Duration) -> Self {
        Self { store, debounce }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Merge the durable record into the session, once per handle.
    ///
    /// A missing record is created from `create`, or reported as
    /// `SessionNotFound` when no template is given. Errors leave the session
    /// unreconciled so that the next caller tries again.
    pub async fn reconcile(&self, session: &SessionHandle, create: Option<RoomRecord>) -> Result<(), SessionError> {
        session
            .hydration
            .get_or_try_init(|| async move {
                match self.store.fetch_room(&session.id).await? {
                    Some(record) => {
                        self.adopt(session, record).await;
                        Ok::<(), SessionError>(())
                    }
                    None => match create {
                        Some(template) => {
                            self.create_from(session, template).await;
                            Ok(())
                        }
                        None => Err(SessionError::SessionNotFound(session.id.clone())),
                    },
                }
            })
            .await?;
        Ok(())
    }

    async fn adopt(&self, session: &SessionHandle, record: RoomRecord) {
        let mut state = session.lock().await;
        let stored = record.revision;
        let live_revision = state.revision;

        match live_revision {
            Some(live) if live > stored || stored == 0 => {
                // Edits accepted while storage was away are newer
                if state.language_revision.is_none() {
                    state.language = record.language;
                }
                state.mark_dirty();
            }
            Some(live) if live == stored => {}
            live => {
                let language = if state.language_revision.is_some() {
                    state.language
                } else {
                    record.language
                };
                state.restore(record.code.clone(), language, stored);
                state.dirty = false;
                if state.language_revision.is_some() {
                    state.mark_dirty();
                }
                if let Some(live) = live {
                    warn!(
                        session_id = %session.id,
                        "Dropping edits up to revision {} made while storage was unreachable, stored revision is {}",
                        live,
                        stored
                    );
                    router::to_all(session, ServerMessage::RoomState(state.room_state()));
                }
            }
        }

        self.reconcile_roster(session, &state, &record.participants);
        info!(session_id = %session.id, revision = state.revision_stamp(), "Hydrated session ({} bytes)", state.buffer.len());
    }

    /// Queue writes that make the durable roster match the live one
    fn reconcile_roster(&self, session: &SessionHandle, state: &SessionState, stored: &[Participant]) {
        if state.participants.is_empty() {
            if !stored.is_empty() {
                debug!(session_id = %session.id, "Clearing {} stale participants", stored.len());
                self.enqueue(session, RosterWrite::Clear);
            }
            return;
        }

        for participant in stored {
            if !state.participants.iter().any(|p| p.connection_id == participant.connection_id) {
                self.enqueue(session, RosterWrite::Remove(participant.connection_id.clone()));
            }
        }
        for participant in &state.participants {
            if !stored.iter().any(|p| p.connection_id == participant.connection_id) {
                self.enqueue(session, RosterWrite::Add(participant.clone()));
            }
        }
    }

    async fn create_from(&self, session: &SessionHandle, mut template: RoomRecord) {
        let record = {
            let mut state = session.lock().await;
            if state.revision.is_none() && state.buffer.is_empty() {
                state.buffer = template.code.clone();
            }
            template.code = state.buffer.clone();
            template.language = state.language;
            template.revision = state.revision_stamp();
            template
        };
        if let Err(e) = self.create_room(&record).await {
            warn!(session_id = %session.id, "Failed to create room record: {}", e);
        }
        // Participants that joined while storage was unreachable
        let state = session.lock().await;
        self.reconcile_roster(session, &state, &[]);
    }

    /// Persist a room created by a join
    pub async fn create_room(&self, record: &RoomRecord) -> Result<(), SessionError> {
        self.store.create_room(record).await?;
        info!(session_id = %record.room_id, "Room record created");
        Ok(())
    }

    /// Arm or re-arm the debounce timer of a session.
    ///
    /// Re-arming cancels a timer that has not fired yet. A write already in
    /// flight is not affected.
    pub fn schedule_checkpoint(&self, session: &Arc<SessionHandle>) {
        let sync = self.clone();
        let target = session.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(sync.debounce).await;
            // Detach the write so that re-arming cannot abort it
            tokio::spawn(async move {
                if let Err(e) = sync.checkpoint(&target).await {
                    warn!(session_id = %target.id, "Checkpoint failed, retrying next window: {}", e);
                    sync.schedule_checkpoint(&target);
                }
            });
        });

        let mut slot = session
            .checkpoint_timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = slot.replace(timer) {
            previous.abort();
        }
    }

    fn cancel_timer(&self, session: &SessionHandle) {
        let mut slot = session
            .checkpoint_timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(timer) = slot.take() {
            timer.abort();
        }
    }

    /// Write the session if dirty. Returns whether a write happened.
    ///
    /// The session lock is held only to snapshot and to clear the dirty flag.
    pub async fn checkpoint(&self, session: &SessionHandle) -> Result<bool, SessionError> {
        let _write = session.write_lock.lock().await;
        if !session.lock().await.dirty {
            return Ok(false);
        }

        match self.reconcile(session, None).await {
            // Nothing stored yet, the upsert creates the room
            Ok(()) | Err(SessionError::SessionNotFound(_)) => {}
            Err(e) => {
                warn!(session_id = %session.id, "Not writing a session that storage has not been merged into: {}", e);
                return Err(e);
            }
        }

        let (checkpoint, epoch) = {
            let state = session.lock().await;
            if !state.dirty {
                return Ok(false);
            }
            (state.checkpoint(), state.epoch)
        };

        if let Err(e) = self.store.upsert_room(&checkpoint).await {
            error!(session_id = %session.id, "Failed to persist session: {}", e);
            return Err(e.into());
        }

        let mut state = session.lock().await;
        // A newer change keeps the session dirty for its own checkpoint
        if state.epoch == epoch {
            state.dirty = false;
        }
        info!(session_id = %session.id, revision = checkpoint.revision, "Session checkpointed");
        Ok(true)
    }

    /// Cancel the pending timer and write now
    pub async fn flush(&self, session: &SessionHandle) -> Result<bool, SessionError> {
        self.cancel_timer(session);
        self.checkpoint(session).await
    }

    /// Flush every given session, returning how many failed
    pub async fn flush_all(&self, sessions: &[Arc<SessionHandle>]) -> usize {
        let mut failures = 0;
        for session in sessions {
            if let Err(e) = self.flush(session).await {
                error!(session_id = %session.id, "Final flush failed: {}", e);
                failures += 1;
            }
        }
        failures
    }

    /// Queue a join for durable storage. Call under the session lock so
    /// that queue order matches roster order.
    pub fn record_join(&self, session: &SessionHandle, participant: &Participant) {
        self.enqueue(session, RosterWrite::Add(participant.clone()));
    }

    /// Queue a leave for durable storage. Call under the session lock.
    pub fn record_leave(&self, session: &SessionHandle, connection_id: &str) {
        self.enqueue(session, RosterWrite::Remove(connection_id.to_string()));
    }

    fn enqueue(&self, session: &SessionHandle, write: RosterWrite) {
        let queue = session.roster_queue.get_or_init(|| self.spawn_roster_writer(&session.id));
        if queue.send(write).is_err() {
            error!(session_id = %session.id, "Roster writer is gone, dropping roster write");
        }
    }

    /// One writer per session applies roster writes strictly in order.
    /// It stops once the session handle, and with it the sender, is dropped.
    fn spawn_roster_writer(&self, session_id: &str) -> mpsc::UnboundedSender<RosterWrite> {
        let (tx, mut rx) = mpsc::unbounded_channel::<RosterWrite>();
        let store = self.store.clone();
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            while let Some(write) = rx.recv().await {
                let result = match &write {
                    RosterWrite::Add(participant) => store.add_participant(&session_id, participant).await,
                    RosterWrite::Remove(connection_id) => store.remove_participant(&session_id, connection_id).await,
                    RosterWrite::Clear => store.clear_participants(&session_id).await,
                };
                if let Err(e) = result {
                    warn!(session_id = %session_id, "Failed to persist roster change {:?}: {}", write, e);
                }
            }
            debug!(session_id = %session_id, "Roster writer stopped");
        });
        tx
    }
}
