use chrono::Utc;
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use tokio::sync::{broadcast, mpsc, Mutex, MutexGuard, OnceCell};
use tokio::task::JoinHandle;

use crate::models::{Language, Participant, RoomCheckpoint, RoomStateMessage};
use crate::ws::router::Envelope;

/// Authoritative in-memory state of one session
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: String,
    pub buffer: String,
    pub language: Language,
    /// Highest accepted buffer revision, `None` until the first accepted edit
    pub revision: Option<i64>,
    /// Marker of the language stream, independent of `revision`
    pub language_revision: Option<i64>,
    /// Ordered by join time
    pub participants: Vec<Participant>,
    pub dirty: bool,
    /// Bumped on every change that needs persisting
    pub epoch: u64,
    /// Set once the handle has been dropped from the registry
    pub evicted: bool,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            buffer: String::new(),
            language: Language::default(),
            revision: None,
            language_revision: None,
            participants: Vec::new(),
            dirty: false,
            epoch: 0,
            evicted: false,
        }
    }

    pub fn revision_stamp(&self) -> i64 {
        self.revision.unwrap_or(0)
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.epoch += 1;
    }

    pub fn room_state(&self) -> RoomStateMessage {
        RoomStateMessage {
            session_id: self.session_id.clone(),
            buffer: self.buffer.clone(),
            language: self.language,
            revision_stamp: self.revision_stamp(),
            participants: self.participants.clone(),
        }
    }

    pub fn checkpoint(&self) -> RoomCheckpoint {
        RoomCheckpoint {
            room_id: self.session_id.clone(),
            code: self.buffer.clone(),
            language: self.language,
            revision: self.revision_stamp(),
            updated_at: Utc::now(),
        }
    }

    /// Seed from durable storage. A stored revision of 0 means no edit was ever accepted.
    pub fn restore(&mut self, buffer: String, language: Language, revision: i64) {
        self.buffer = buffer;
        self.language = language;
        self.revision = (revision > 0).then_some(revision);
    }
}

/// A pending roster write, applied to durable storage in queue order
#[derive(Debug, Clone, PartialEq)]
pub enum RosterWrite {
    Add(Participant),
    Remove(String),
    Clear,
}

/// Shared handle to a registered session
#[derive(Debug)]
pub struct SessionHandle {
    pub id: String,
    state: Mutex<SessionState>,
    broadcast: broadcast::Sender<Envelope>,
    /// Set once the session has been reconciled with durable storage.
    /// Left empty while storage is unreachable.
    pub(crate) hydration: OnceCell<()>,
    /// Pending debounce timer of the next checkpoint
    pub(crate) checkpoint_timer: StdMutex<Option<JoinHandle<()>>>,
    /// Serializes durable writes of this session
    pub(crate) write_lock: Mutex<()>,
    /// Ordered roster writes, drained by one task per session
    pub(crate) roster_queue: OnceLock<mpsc::UnboundedSender<RosterWrite>>,
}

impl SessionHandle {
    pub fn new(id: impl Into<String>, broadcast_capacity: usize) -> Arc<Self> {
        let id = id.into();
        let (broadcast, _rx) = broadcast::channel(broadcast_capacity.max(1));
        Arc::new(Self {
            state: Mutex::new(SessionState::new(id.clone())),
            id,
            broadcast,
            hydration: OnceCell::new(),
            checkpoint_timer: StdMutex::new(None),
            write_lock: Mutex::new(()),
            roster_queue: OnceLock::new(),
        })
    }

    /// Serialize access to the session. Never hold the guard across durable I/O.
    pub async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.broadcast.subscribe()
    }

    pub(crate) fn sender(&self) -> &broadcast::Sender<Envelope> {
        &self.broadcast
    }

    pub fn connection_count(&self) -> usize {
        self.broadcast.receiver_count()
    }
}
