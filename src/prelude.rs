//! Convenience re-exports for common use.

pub use crate::client::{ChatBackend, ChatReply, ChatRequest, HttpChatBackend, SessionToken};
pub use crate::config::ParleyConfig;
pub use crate::error::{ParleyError, Result};
pub use crate::session::{
    MessageSession, RejectReason, SendOutcome, SessionManager, SessionSnapshot, SessionState,
};
pub use crate::storage::{FileStore, FileStoreConfig, KeyValueStore, MemoryStore};
pub use crate::store::{ConversationStore, LoadOutcome, StoreConfig, StoreSnapshot};
pub use crate::types::{Conversation, ConversationId, Message, Role};
