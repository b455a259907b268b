use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{MessageSession, RejectReason, SendOutcome, DEFAULT_REQUEST_TIMEOUT};
use crate::client::ChatBackend;
use crate::store::ConversationStore;
use crate::types::ConversationId;

/// Manages one [`MessageSession`] per conversation.
///
/// Sessions are independent: a pending request in one conversation never
/// blocks sends to another.
pub struct SessionManager {
    store: Arc<ConversationStore>,
    backend: Arc<dyn ChatBackend>,
    timeout: Duration,
    sessions: Mutex<HashMap<ConversationId, Arc<MessageSession>>>,
}

impl SessionManager {
    pub fn new(store: Arc<ConversationStore>, backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            store,
            backend,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Request timeout applied to sessions created from now on.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Get or create the session for a conversation.
    pub fn session(&self, conversation_id: ConversationId) -> Arc<MessageSession> {
        self.lock()
            .entry(conversation_id)
            .or_insert_with(|| {
                Arc::new(
                    MessageSession::new(
                        conversation_id,
                        Arc::clone(&self.store),
                        Arc::clone(&self.backend),
                    )
                    .with_timeout(self.timeout),
                )
            })
            .clone()
    }

    /// Get an existing session.
    pub fn get(&self, conversation_id: ConversationId) -> Option<Arc<MessageSession>> {
        self.lock().get(&conversation_id).cloned()
    }

    /// Drop a session, e.g. when its chat view closes. The next send to
    /// that conversation starts without a correlation token.
    pub fn remove(&self, conversation_id: ConversationId) -> Option<Arc<MessageSession>> {
        self.lock().remove(&conversation_id)
    }

    /// Drop sessions whose conversation no longer exists.
    pub fn prune(&self) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|id, _| self.store.contains(*id));
        before - sessions.len()
    }

    /// Route a send to the conversation's session. Unknown conversations
    /// are rejected before any session is created for them.
    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        content: impl Into<String>,
    ) -> SendOutcome {
        if !self.store.contains(conversation_id) {
            return SendOutcome::Rejected(RejectReason::UnknownConversation);
        }
        let session = self.session(conversation_id);
        session.send_message(content).await
    }

    /// List conversation ids with a live session.
    pub fn conversation_ids(&self) -> Vec<ConversationId> {
        let mut ids: Vec<_> = self.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConversationId, Arc<MessageSession>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
