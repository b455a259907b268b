//! Parley: conversation persistence and chat session core.
//!
//! Keeps a bounded list of conversations in memory, writes it through a
//! compressed codec to a pluggable key-value store on every change, and
//! drives one request/response exchange per user message against a remote
//! chat-completion service. Rendering is left to whoever subscribes to the
//! store's snapshots.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use parley::prelude::*;
//!
//! # async fn example() -> parley::error::Result<()> {
//! let config = ParleyConfig::from_env()?;
//! let storage = Arc::new(FileStore::new(FileStoreConfig::new(config.data_dir())));
//! let store = Arc::new(ConversationStore::new(storage, config.store_config()));
//! store.load()?;
//!
//! let backend = Arc::new(HttpChatBackend::from_config(&config));
//! let sessions = SessionManager::new(store.clone(), backend);
//! if let Some(id) = store.current_conversation_id() {
//!     sessions.send_message(id, "Hello!").await;
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod prelude;
pub mod session;
pub mod storage;
pub mod store;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
