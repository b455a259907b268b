use std::time::Duration;

use bon::Builder;

pub const DEFAULT_MAX_CONVERSATIONS: usize = 500;
pub const DEFAULT_MAX_MESSAGES: usize = 5000;
pub const CONVERSATIONS_KEY: &str = "conversations";
pub const SIDEBAR_KEY: &str = "sidebarOpen";

/// Limits and storage keys for a [`ConversationStore`](super::ConversationStore).
///
/// ```
/// use std::time::Duration;
/// use parley::store::StoreConfig;
///
/// let config = StoreConfig::builder()
///     .max_conversations(50)
///     .notify_debounce(Duration::from_millis(300))
///     .build();
/// assert_eq!(config.max_messages_per_conversation, 5000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct StoreConfig {
    #[builder(default = DEFAULT_MAX_CONVERSATIONS)]
    pub max_conversations: usize,
    #[builder(default = DEFAULT_MAX_MESSAGES)]
    pub max_messages_per_conversation: usize,
    #[builder(default = CONVERSATIONS_KEY.to_string())]
    pub conversations_key: String,
    #[builder(default = SIDEBAR_KEY.to_string())]
    pub sidebar_key: String,
    /// When set, snapshot notification for message updates waits for this
    /// quiet period. Persistence is never delayed.
    pub notify_debounce: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
