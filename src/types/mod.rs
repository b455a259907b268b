//! Core data types: conversations and messages.

pub mod conversation;
pub mod message;

pub use conversation::{Conversation, ConversationId};
pub use message::{Message, Role};
