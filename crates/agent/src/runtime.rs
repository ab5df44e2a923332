use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use bankbot_core::lexicon::LexiconError;

use crate::conversation::{DialogueEngine, UserTurn};
use crate::response::TurnResponse;
use crate::state::{DialogueState, SessionSnapshot};

type SessionSlot = Arc<Mutex<DialogueState>>;

/// Owns every live session. Turns for one session are serialized by that
/// session's mutex; different sessions proceed in parallel.
pub struct AgentRuntime {
    engine: Arc<DialogueEngine>,
    sessions: RwLock<HashMap<String, SessionSlot>>,
}

impl AgentRuntime {
    pub fn new(engine: DialogueEngine) -> Self {
        Self { engine: Arc::new(engine), sessions: RwLock::new(HashMap::new()) }
    }

    pub fn engine(&self) -> &DialogueEngine {
        &self.engine
    }

    /// Runs one turn. A session that ends the turn idle is dropped, so only
    /// conversations with an open flow hold a slot.
    pub async fn handle_message(&self, session_id: &str, turn: UserTurn) -> TurnResponse {
        loop {
            let slot = self.session(session_id).await;
            let mut state = slot.lock().await;
            // The slot may have been evicted while this turn waited for it.
            if !self.is_registered(session_id, &slot).await {
                continue;
            }

            let response = self.engine.handle_turn(session_id, &mut state, &turn).await;
            if state.is_idle() {
                let mut sessions = self.sessions.write().await;
                if sessions.get(session_id).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
                    sessions.remove(session_id);
                }
            }
            return response;
        }
    }

    /// Drops the session. Returns `false` when it did not exist.
    pub async fn end_session(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            tracing::info!(event_name = "dialogue.session.ended", session_id, "session dropped");
        }
        removed
    }

    pub async fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        let slot = self.sessions.read().await.get(session_id).cloned()?;
        let state = slot.lock().await;
        Some(SessionSnapshot::from(&*state))
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Swaps in a new lexicon for all sessions. The old table stays active on error.
    pub fn reload_lexicon(&self, path: &Path) -> Result<(), LexiconError> {
        self.engine.lexicon().reload_from(path)
    }

    async fn is_registered(&self, session_id: &str, slot: &SessionSlot) -> bool {
        self.sessions.read().await.get(session_id).is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    async fn session(&self, session_id: &str) -> SessionSlot {
        if let Some(slot) = self.sessions.read().await.get(session_id) {
            return Arc::clone(slot);
        }
        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(session_id.to_owned()).or_default())
    }
}
