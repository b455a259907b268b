//! Per-conversation message sessions.
//!
//! A [`MessageSession`] owns the exchange between one conversation and the
//! remote completion service: it appends the user's message to the store,
//! keeps the session correlation token, and guarantees at most one
//! outstanding request. [`SessionManager`] hands out one session per
//! conversation.

mod manager;

pub use manager::SessionManager;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use strum::Display;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::client::{ChatBackend, ChatRequest, SessionToken};
use crate::store::ConversationStore;
use crate::types::{ConversationId, Message};
use crate::util::timeout::with_timeout;

/// Assistant message appended when an exchange fails.
pub const FALLBACK_REPLY: &str = "I encountered an error. Please try again.";

/// Upper bound on how long a session may stay pending.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(500_000);

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Pending,
}

/// Point-in-time view of a session for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub session_id: Option<SessionToken>,
    /// Description of the last failure, shown apart from the transcript.
    pub error: Option<String>,
}

impl SessionSnapshot {
    pub fn is_pending(&self) -> bool {
        self.state == SessionState::Pending
    }
}

/// Why a send was dropped without doing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The content was empty or whitespace only.
    EmptyContent,
    /// A request for this conversation is already outstanding.
    Busy,
    /// The conversation does not exist (any more).
    UnknownConversation,
}

/// Result of [`MessageSession::send_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Rejected(RejectReason),
    /// The assistant reply was appended.
    Replied { reply: String },
    /// The fallback reply was appended; `error` is the surfaced description.
    Failed { error: String },
}

impl SendOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

#[derive(Debug, Default)]
struct SessionInner {
    session_id: Option<SessionToken>,
    error: Option<String>,
}

/// The chat exchange for one conversation.
///
/// # Example
///
/// ```ignore
/// let session = MessageSession::new(conversation_id, store.clone(), backend.clone());
/// match session.send_message("hi").await {
///     SendOutcome::Replied { reply } => println!("{reply}"),
///     SendOutcome::Failed { error } => eprintln!("{error}"),
///     SendOutcome::Rejected(reason) => eprintln!("dropped: {reason:?}"),
/// }
/// ```
pub struct MessageSession {
    conversation_id: ConversationId,
    store: Arc<ConversationStore>,
    backend: Arc<dyn ChatBackend>,
    timeout: Duration,
    pending: AtomicBool,
    inner: Mutex<SessionInner>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl std::fmt::Debug for MessageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSession")
            .field("conversation_id", &self.conversation_id)
            .field("timeout", &self.timeout)
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl MessageSession {
    pub fn new(
        conversation_id: ConversationId,
        store: Arc<ConversationStore>,
        backend: Arc<dyn ChatBackend>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
        Self {
            conversation_id,
            store,
            backend,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            pending: AtomicBool::new(false),
            inner: Mutex::new(SessionInner::default()),
            snapshot_tx,
        }
    }

    /// Bound on how long a request may stay outstanding.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn session_id(&self) -> Option<SessionToken> {
        self.lock().session_id.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.lock();
        SessionSnapshot {
            state: if self.is_pending() {
                SessionState::Pending
            } else {
                SessionState::Idle
            },
            session_id: inner.session_id.clone(),
            error: inner.error.clone(),
        }
    }

    /// Subscribe to snapshot changes via a [`watch::Receiver`].
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Send `content` to the remote service and record both sides of the
    /// exchange in the conversation.
    ///
    /// Empty content, an unknown conversation, or an already pending
    /// session make this a no-op. The user message is appended before the
    /// request goes out. Failures never propagate: the fallback reply is
    /// appended and the description is kept in [`error`](Self::error).
    pub async fn send_message(&self, content: impl Into<String>) -> SendOutcome {
        let content = content.into();
        if content.trim().is_empty() {
            return SendOutcome::Rejected(RejectReason::EmptyContent);
        }
        if !self.store.contains(self.conversation_id) {
            debug!(conversation_id = %self.conversation_id, "send to unknown conversation dropped");
            return SendOutcome::Rejected(RejectReason::UnknownConversation);
        }
        let Some(_guard) = PendingGuard::acquire(self) else {
            debug!(conversation_id = %self.conversation_id, "send while pending dropped");
            return SendOutcome::Rejected(RejectReason::Busy);
        };

        let session_id = {
            let mut inner = self.lock();
            inner.error = None;
            inner.session_id.clone()
        };
        self.append(Message::user(content.clone()));
        self.broadcast();

        let request = ChatRequest {
            session_id,
            message: content,
        };
        match with_timeout(self.timeout, self.backend.send(&request)).await {
            Ok(reply) => {
                if let Some(token) = reply.session_id {
                    self.lock().session_id = Some(token);
                }
                self.append(Message::assistant(reply.message.clone()));
                debug!(conversation_id = %self.conversation_id, "assistant reply recorded");
                SendOutcome::Replied {
                    reply: reply.message,
                }
            }
            Err(err) => {
                let description = format!("Error: {}", err.description());
                warn!(
                    conversation_id = %self.conversation_id,
                    error = %err,
                    retryable = err.is_retryable(),
                    "chat request failed"
                );
                self.lock().error = Some(description.clone());
                self.append(Message::assistant(FALLBACK_REPLY));
                SendOutcome::Failed { error: description }
            }
        }
    }

    /// Forget the correlation token so the next send starts a new session.
    pub fn reset(&self) {
        {
            let mut inner = self.lock();
            inner.session_id = None;
            inner.error = None;
        }
        self.broadcast();
    }

    fn append(&self, message: Message) {
        if let Err(err) = self.store.append_message(self.conversation_id, message) {
            warn!(conversation_id = %self.conversation_id, error = %err, "message kept in memory only");
        }
    }

    fn broadcast(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds the pending flag for the duration of one exchange. Dropping it,
/// including when the send future is dropped mid-flight, returns the
/// session to idle.
struct PendingGuard<'a> {
    session: &'a MessageSession,
}

impl<'a> PendingGuard<'a> {
    fn acquire(session: &'a MessageSession) -> Option<Self> {
        session
            .pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { session })
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.session.pending.store(false, Ordering::SeqCst);
        self.session.broadcast();
    }
}
