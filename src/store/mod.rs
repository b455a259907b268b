//! Conversation store: the authoritative list behind the sidebar and the
//! active chat view.
//!
//! Every mutation is applied in memory first, then the whole collection is
//! re-encoded through [`codec`](crate::codec) and written to the injected
//! [`KeyValueStore`]. Observers receive [`StoreSnapshot`]s through a
//! [`watch`] channel.

mod config;

pub use config::{
    StoreConfig, CONVERSATIONS_KEY, DEFAULT_MAX_CONVERSATIONS, DEFAULT_MAX_MESSAGES, SIDEBAR_KEY,
};

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::codec;
use crate::error::Result;
use crate::storage::KeyValueStore;
use crate::types::conversation::keep_last;
use crate::types::{Conversation, ConversationId, Message};
use crate::util::clock::{Clock, SystemClock};
use crate::util::debounce::Debouncer;

/// Read-only view handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoreSnapshot {
    pub conversations: Vec<Conversation>,
    pub current_conversation_id: Option<ConversationId>,
    pub is_sidebar_open: bool,
    pub editing_conversation_id: Option<ConversationId>,
}

impl StoreSnapshot {
    /// The selected conversation, if the selected id is live.
    pub fn current_conversation(&self) -> Option<&Conversation> {
        let id = self.current_conversation_id?;
        self.conversations.iter().find(|c| c.id == id)
    }
}

/// How [`ConversationStore::load`] initialized the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Saved conversations were restored.
    Restored { count: usize, dropped: usize },
    /// Nothing usable was saved; a single empty conversation was created.
    Fresh {
        reason: FreshReason,
        conversation_id: ConversationId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshReason {
    Absent,
    Empty,
    Corrupt,
}

#[derive(Debug, Clone, Copy)]
struct Persist {
    conversations: bool,
    sidebar: bool,
}

impl Persist {
    const NOTHING: Self = Self {
        conversations: false,
        sidebar: false,
    };
    const CONVERSATIONS: Self = Self {
        conversations: true,
        sidebar: false,
    };
    const SIDEBAR: Self = Self {
        conversations: false,
        sidebar: true,
    };
    const BOTH: Self = Self {
        conversations: true,
        sidebar: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Notify {
    Now,
    Debounced,
}

#[derive(Debug, Default)]
struct StoreState {
    conversations: Vec<Conversation>,
    current: Option<ConversationId>,
    editing: Option<ConversationId>,
    sidebar_open: bool,
    last_issued: Option<i64>,
}

impl StoreState {
    fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            conversations: self.conversations.clone(),
            current_conversation_id: self.current,
            is_sidebar_open: self.sidebar_open,
            editing_conversation_id: self.editing,
        }
    }

    fn find(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    fn find_mut(&mut self, id: ConversationId) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    /// Next id: the clock reading, bumped past anything already issued.
    ///
    /// Once issued ids reach `i64::MAX` there is nothing left to bump to;
    /// the first id at or after the clock reading that no live record uses
    /// is taken instead.
    fn next_id(&mut self, clock: &dyn Clock) -> ConversationId {
        let now = clock.now_millis();
        let preferred = match self.last_issued {
            Some(last) if now <= last => last.checked_add(1),
            _ => Some(now),
        };
        let id = match preferred {
            Some(id) if self.find(ConversationId(id)).is_none() => id,
            _ => self.unused_id_from(now),
        };
        self.last_issued = Some(self.last_issued.map_or(id, |last| last.max(id)));
        ConversationId(id)
    }

    fn unused_id_from(&self, start: i64) -> i64 {
        (start..=i64::MAX)
            .chain(i64::MIN..start)
            .find(|&id| self.find(ConversationId(id)).is_none())
            .unwrap_or(start)
    }

    fn push_new(&mut self, config: &StoreConfig, clock: &dyn Clock) -> ConversationId {
        let id = self.next_id(clock);
        let title = Conversation::default_title(self.conversations.len());
        self.conversations.push(Conversation::new(id, title));
        keep_last(&mut self.conversations, config.max_conversations);
        self.current = Some(id);
        id
    }
}

fn lock_state(state: &Mutex<StoreState>) -> MutexGuard<'_, StoreState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn publish(state: &Mutex<StoreState>, tx: &watch::Sender<StoreSnapshot>) {
    let state = lock_state(state);
    tx.send_replace(state.snapshot());
}

/// In-memory authoritative conversation collection with write-through
/// persistence.
///
/// All methods take `&self`; share the store as `Arc<ConversationStore>`.
/// No internal lock is held across an await point.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use parley::storage::MemoryStore;
/// use parley::store::{ConversationStore, StoreConfig};
///
/// let store = ConversationStore::new(Arc::new(MemoryStore::new()), StoreConfig::default());
/// store.load()?;
/// let id = store.create_conversation()?;
/// store.rename_conversation(id, "Trip planning")?;
/// assert_eq!(store.snapshot().conversations.len(), 2);
/// # Ok::<(), parley::error::ParleyError>(())
/// ```
pub struct ConversationStore {
    storage: Arc<dyn KeyValueStore>,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<StoreState>>,
    snapshot_tx: Arc<watch::Sender<StoreSnapshot>>,
    debouncer: Option<Debouncer>,
}

impl fmt::Debug for ConversationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationStore")
            .field("config", &self.config)
            .field("state", &*lock_state(&self.state))
            .field("debouncer", &self.debouncer)
            .finish_non_exhaustive()
    }
}

impl ConversationStore {
    /// Create an empty store. Call [`load`](Self::load) to read saved data.
    pub fn new(storage: Arc<dyn KeyValueStore>, config: StoreConfig) -> Self {
        let (snapshot_tx, _) = watch::channel(StoreSnapshot::default());
        let debouncer = config.notify_debounce.map(Debouncer::new);
        Self {
            storage,
            config,
            clock: Arc::new(SystemClock),
            state: Arc::new(Mutex::new(StoreState::default())),
            snapshot_tx: Arc::new(snapshot_tx),
            debouncer,
        }
    }

    /// Replace the clock used for id generation.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Initialize from persistent storage.
    ///
    /// Restored data keeps the newest `max_conversations` records, selects
    /// the last one and opens the sidebar unless a saved sidebar flag says
    /// otherwise. Missing, empty or unreadable data yields one fresh
    /// conversation and leaves the sidebar as saved (closed if unsaved).
    /// Only storage read failures are returned as errors.
    pub fn load(&self) -> Result<LoadOutcome> {
        let saved_sidebar = self
            .storage
            .get(&self.config.sidebar_key)?
            .map(|raw| raw.trim() == "true");
        let blob = self.storage.get(&self.config.conversations_key)?;

        let decoded = match blob.as_deref() {
            None => Err(FreshReason::Absent),
            Some(raw) => match codec::decode(raw) {
                Ok(list) if list.is_empty() => Err(FreshReason::Empty),
                Ok(list) => Ok(list),
                Err(err) => {
                    warn!(error = %err, "discarding unreadable saved conversations");
                    Err(FreshReason::Corrupt)
                }
            },
        };

        if let Some(debouncer) = &self.debouncer {
            debouncer.cancel();
        }

        let clock = Arc::clone(&self.clock);
        let outcome = self.mutate(Notify::Now, move |state, config| {
            let last_issued = state.last_issued;
            *state = StoreState {
                last_issued,
                ..StoreState::default()
            };

            match decoded {
                Ok(mut conversations) => {
                    let loaded = conversations.len();
                    keep_last(&mut conversations, config.max_conversations);
                    let dropped = loaded - conversations.len();

                    let max_id = conversations.iter().map(|c| c.id.0).max();
                    state.last_issued = state.last_issued.max(max_id);
                    state.conversations = conversations;
                    let rekeyed = rekey_duplicates(state, clock.as_ref());

                    state.current = state.conversations.last().map(|c| c.id);
                    state.sidebar_open = saved_sidebar.unwrap_or(true);

                    let persist = if dropped > 0 || rekeyed > 0 {
                        Persist::CONVERSATIONS
                    } else {
                        Persist::NOTHING
                    };
                    let count = state.conversations.len();
                    (LoadOutcome::Restored { count, dropped }, persist)
                }
                Err(reason) => {
                    state.sidebar_open = saved_sidebar.unwrap_or(false);
                    let conversation_id = state.push_new(config, clock.as_ref());
                    let outcome = LoadOutcome::Fresh {
                        reason,
                        conversation_id,
                    };
                    (outcome, Persist::CONVERSATIONS)
                }
            }
        })?;

        debug!(?outcome, "conversation store loaded");
        Ok(outcome)
    }

    /// Append a new empty conversation, select it and open the sidebar.
    pub fn create_conversation(&self) -> Result<ConversationId> {
        let clock = Arc::clone(&self.clock);
        let id = self.mutate(Notify::Now, move |state, config| {
            let id = state.push_new(config, clock.as_ref());
            let persist = if state.sidebar_open {
                Persist::CONVERSATIONS
            } else {
                state.sidebar_open = true;
                Persist::BOTH
            };
            (id, persist)
        })?;
        debug!(conversation_id = %id, "created conversation");
        Ok(id)
    }

    /// Set the current conversation. The id is not validated.
    pub fn select_conversation(&self, id: ConversationId) {
        self.update_view(|state| state.current = Some(id));
    }

    /// Replace a conversation's messages, keeping the newest
    /// `max_messages_per_conversation`. Returns `false` for an unknown id.
    pub fn update_messages(&self, id: ConversationId, messages: Vec<Message>) -> Result<bool> {
        self.mutate(Notify::Debounced, move |state, config| {
            let Some(conversation) = state.find_mut(id) else {
                return (false, Persist::NOTHING);
            };
            let mut messages = messages;
            keep_last(&mut messages, config.max_messages_per_conversation);
            conversation.messages = messages;
            (true, Persist::CONVERSATIONS)
        })
    }

    /// Push one message onto a conversation under the same cap as
    /// [`update_messages`](Self::update_messages).
    pub fn append_message(&self, id: ConversationId, message: Message) -> Result<bool> {
        self.mutate(Notify::Debounced, move |state, config| {
            let Some(conversation) = state.find_mut(id) else {
                return (false, Persist::NOTHING);
            };
            conversation.messages.push(message);
            keep_last(
                &mut conversation.messages,
                config.max_messages_per_conversation,
            );
            (true, Persist::CONVERSATIONS)
        })
    }

    /// Remove a conversation. Returns `false` for an unknown id.
    ///
    /// Deleting the current conversation selects the last remaining one (or
    /// none). Emptying the collection leaves the sidebar open.
    pub fn delete_conversation(&self, id: ConversationId) -> Result<bool> {
        let removed = self.mutate(Notify::Now, move |state, config| {
            let before = state.conversations.len();
            state.conversations.retain(|c| c.id != id);
            if state.conversations.len() == before {
                return (false, Persist::NOTHING);
            }

            if state.current == Some(id) {
                state.current = state.conversations.last().map(|c| c.id);
            }
            if state.editing == Some(id) {
                state.editing = None;
            }
            keep_last(&mut state.conversations, config.max_conversations);

            let persist = if state.conversations.is_empty() && !state.sidebar_open {
                state.sidebar_open = true;
                Persist::BOTH
            } else {
                Persist::CONVERSATIONS
            };
            (true, persist)
        })?;
        if removed {
            debug!(conversation_id = %id, "deleted conversation");
        }
        Ok(removed)
    }

    /// Mark a conversation as having its title edited.
    pub fn begin_rename(&self, id: ConversationId) {
        self.update_view(|state| state.editing = Some(id));
    }

    /// Set a title verbatim and clear the edit marker. Returns `false` for
    /// an unknown id.
    pub fn rename_conversation(&self, id: ConversationId, title: impl Into<String>) -> Result<bool> {
        let title = title.into();
        self.mutate(Notify::Now, move |state, _| {
            state.editing = None;
            match state.find_mut(id) {
                Some(conversation) => {
                    conversation.title = title;
                    (true, Persist::CONVERSATIONS)
                }
                None => (false, Persist::NOTHING),
            }
        })
    }

    /// Flip sidebar visibility and persist it. Returns the new value.
    pub fn toggle_sidebar(&self) -> Result<bool> {
        self.mutate(Notify::Now, |state, _| {
            state.sidebar_open = !state.sidebar_open;
            (state.sidebar_open, Persist::SIDEBAR)
        })
    }

    /// Current authoritative state (never delayed by debouncing).
    pub fn snapshot(&self) -> StoreSnapshot {
        self.lock().snapshot()
    }

    /// Subscribe to snapshot changes via a [`watch::Receiver`].
    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Deliver any debounced notification now. Returns whether one was pending.
    pub fn settle(&self) -> bool {
        self.debouncer
            .as_ref()
            .map(Debouncer::settle)
            .unwrap_or(false)
    }

    pub fn conversation(&self, id: ConversationId) -> Option<Conversation> {
        self.lock().find(id).cloned()
    }

    pub fn contains(&self, id: ConversationId) -> bool {
        self.lock().find(id).is_some()
    }

    pub fn current_conversation_id(&self) -> Option<ConversationId> {
        self.lock().current
    }

    pub fn current_conversation(&self) -> Option<Conversation> {
        let state = self.lock();
        state.current.and_then(|id| state.find(id).cloned())
    }

    /// Messages of a conversation; empty for an unknown id.
    pub fn messages(&self, id: ConversationId) -> Vec<Message> {
        self.lock()
            .find(id)
            .map(|c| c.messages.clone())
            .unwrap_or_default()
    }

    pub fn is_sidebar_open(&self) -> bool {
        self.lock().sidebar_open
    }

    pub fn len(&self) -> usize {
        self.lock().conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().conversations.is_empty()
    }

    // -- Internal helpers --

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        lock_state(&self.state)
    }

    /// Apply `f`, persist what it reports as changed, then notify.
    ///
    /// The in-memory change stands even when persistence fails; the write
    /// error is returned to the caller.
    fn mutate<T>(
        &self,
        notify: Notify,
        f: impl FnOnce(&mut StoreState, &StoreConfig) -> (T, Persist),
    ) -> Result<T> {
        let (value, persisted) = {
            let mut state = self.lock();
            let (value, persist) = f(&mut state, &self.config);
            (value, self.persist(&state, persist))
        };
        self.notify(notify);
        persisted.map(|()| value)
    }

    /// Change view-only state (selection, edit marker). Nothing is persisted.
    fn update_view(&self, f: impl FnOnce(&mut StoreState)) {
        f(&mut self.lock());
        self.notify(Notify::Now);
    }

    fn persist(&self, state: &StoreState, persist: Persist) -> Result<()> {
        if persist.conversations {
            self.write_conversations(&state.conversations)?;
        }
        if persist.sidebar {
            self.write_sidebar(state.sidebar_open)?;
        }
        Ok(())
    }

    fn write_conversations(&self, conversations: &[Conversation]) -> Result<()> {
        let key = self.config.conversations_key.as_str();
        let result = if conversations.is_empty() {
            self.storage.remove(key)
        } else {
            codec::encode(conversations).and_then(|blob| self.storage.set(key, &blob))
        };
        if let Err(err) = &result {
            warn!(error = %err, key, "failed to persist conversations");
        }
        result
    }

    fn write_sidebar(&self, open: bool) -> Result<()> {
        let key = self.config.sidebar_key.as_str();
        let result = self.storage.set(key, if open { "true" } else { "false" });
        if let Err(err) = &result {
            warn!(error = %err, key, "failed to persist sidebar state");
        }
        result
    }

    fn notify(&self, notify: Notify) {
        match (&self.debouncer, notify) {
            (Some(debouncer), Notify::Debounced) => {
                let state = Arc::clone(&self.state);
                let tx = Arc::clone(&self.snapshot_tx);
                debouncer.call(move || publish(&state, &tx));
            }
            (Some(debouncer), Notify::Now) => {
                debouncer.cancel();
                publish(&self.state, &self.snapshot_tx);
            }
            (None, _) => publish(&self.state, &self.snapshot_tx),
        }
    }
}

/// Give fresh ids to records whose id repeats an earlier one.
///
/// Millisecond ids written by older clients can collide; keeping both
/// records under distinct ids preserves the data and the uniqueness
/// invariant. Returns how many records were re-keyed.
fn rekey_duplicates(state: &mut StoreState, clock: &dyn Clock) -> usize {
    let mut seen = HashSet::with_capacity(state.conversations.len());
    let mut rekeyed = 0;
    for index in 0..state.conversations.len() {
        let old = state.conversations[index].id;
        if seen.insert(old) {
            continue;
        }
        let fresh = state.next_id(clock);
        state.conversations[index].id = fresh;
        seen.insert(fresh);
        rekeyed += 1;
        warn!(old_id = %old, new_id = %fresh, "re-keyed duplicate conversation id");
    }
    rekeyed
}
