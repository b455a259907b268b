//! CLI command handlers.

use std::io::Write;
use std::sync::Arc;

use super::Commands;
use crate::client::HttpChatBackend;
use crate::config::ParleyConfig;
use crate::session::{RejectReason, SendOutcome, SessionManager};
use crate::storage::{FileStore, FileStoreConfig, KeyValueStore};
use crate::store::{ConversationStore, StoreSnapshot};
use crate::types::{Conversation, ConversationId, Role};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Storage key holding the conversation the CLI last had selected.
pub const SELECTION_KEY: &str = "currentConversation";

/// Store plus sessions, wired the way the binary uses them.
pub struct App {
    storage: Arc<dyn KeyValueStore>,
    store: Arc<ConversationStore>,
    sessions: SessionManager,
}

impl App {
    /// Open the file-backed store under the configured data dir.
    pub fn open(config: &ParleyConfig) -> crate::error::Result<Self> {
        let storage: Arc<dyn KeyValueStore> =
            Arc::new(FileStore::new(FileStoreConfig::new(config.data_dir())));
        let store = Arc::new(ConversationStore::new(
            Arc::clone(&storage),
            config.store_config(),
        ));
        store.load()?;
        let backend = Arc::new(HttpChatBackend::from_config(config));
        let sessions =
            SessionManager::new(Arc::clone(&store), backend).with_timeout(config.request_timeout());
        Self::from_parts(storage, store, sessions)
    }

    /// Wire an already loaded store and reapply the saved selection.
    pub fn from_parts(
        storage: Arc<dyn KeyValueStore>,
        store: Arc<ConversationStore>,
        sessions: SessionManager,
    ) -> crate::error::Result<Self> {
        let app = Self {
            storage,
            store,
            sessions,
        };
        app.restore_selection()?;
        Ok(app)
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Execute one command, writing human-readable output to `out`.
    pub async fn run(&self, command: Commands, out: &mut impl Write) -> CliResult {
        match command {
            Commands::List => {
                write!(out, "{}", render_list(&self.store.snapshot()))?;
            }
            Commands::New => {
                let id = self.store.create_conversation()?;
                writeln!(out, "Created conversation {id}")?;
            }
            Commands::Select(args) => {
                if self.store.contains(args.id) {
                    self.store.select_conversation(args.id);
                    writeln!(out, "Selected conversation {}", args.id)?;
                } else {
                    writeln!(out, "No conversation {}; nothing selected", args.id)?;
                }
            }
            Commands::Rename(args) => {
                self.store.begin_rename(args.id);
                if self.store.rename_conversation(args.id, args.title)? {
                    writeln!(out, "Renamed conversation {}", args.id)?;
                } else {
                    writeln!(out, "No conversation {}", args.id)?;
                }
            }
            Commands::Delete(args) => {
                if self.store.delete_conversation(args.id)? {
                    self.sessions.remove(args.id);
                    writeln!(out, "Deleted conversation {}", args.id)?;
                } else {
                    writeln!(out, "No conversation {}", args.id)?;
                }
            }
            Commands::Show(args) => match self.resolve(args.id) {
                Some(conversation) => write!(out, "{}", render_transcript(&conversation))?,
                None => writeln!(out, "No conversation selected. Start a new chat!")?,
            },
            Commands::ToggleSidebar => {
                let open = self.store.toggle_sidebar()?;
                writeln!(out, "Sidebar {}", if open { "open" } else { "hidden" })?;
            }
            Commands::Send(args) => {
                let Some(id) = args.conversation.or_else(|| self.store.current_conversation_id())
                else {
                    writeln!(out, "No conversation selected. Start a new chat!")?;
                    return Ok(());
                };
                match self.sessions.send_message(id, args.message).await {
                    SendOutcome::Replied { reply } => writeln!(out, "{reply}")?,
                    SendOutcome::Failed { error } => {
                        writeln!(out, "{}", crate::session::FALLBACK_REPLY)?;
                        eprintln!("{error}");
                    }
                    SendOutcome::Rejected(RejectReason::EmptyContent) => {
                        writeln!(out, "Nothing to send")?
                    }
                    SendOutcome::Rejected(RejectReason::UnknownConversation) => {
                        writeln!(out, "No conversation {id}")?
                    }
                    SendOutcome::Rejected(RejectReason::Busy) => {
                        writeln!(out, "Still waiting for the previous reply")?
                    }
                }
            }
        }
        self.store.settle();
        self.save_selection()?;
        Ok(())
    }

    fn restore_selection(&self) -> crate::error::Result<()> {
        let saved = self
            .storage
            .get(SELECTION_KEY)?
            .and_then(|raw| raw.parse::<ConversationId>().ok());
        if let Some(id) = saved.filter(|id| self.store.contains(*id)) {
            self.store.select_conversation(id);
        }
        Ok(())
    }

    fn save_selection(&self) -> crate::error::Result<()> {
        match self.store.current_conversation_id() {
            Some(id) => self.storage.set(SELECTION_KEY, &id.to_string()),
            None => self.storage.remove(SELECTION_KEY),
        }
    }

    fn resolve(&self, id: Option<ConversationId>) -> Option<Conversation> {
        match id {
            Some(id) => self.store.conversation(id),
            None => self.store.current_conversation(),
        }
    }
}

/// One line per conversation; `*` marks the current one.
pub fn render_list(snapshot: &StoreSnapshot) -> String {
    if !snapshot.is_sidebar_open {
        return "Conversation list hidden (run `parley toggle-sidebar`)\n".to_string();
    }
    if snapshot.conversations.is_empty() {
        return "No conversations. Run `parley new` to start one.\n".to_string();
    }
    snapshot
        .conversations
        .iter()
        .map(|conv| {
            let marker = if Some(conv.id) == snapshot.current_conversation_id {
                '*'
            } else {
                ' '
            };
            format!(
                "{marker} {}  {}  ({} messages)\n",
                conv.id,
                conv.title,
                conv.messages.len()
            )
        })
        .collect()
}

pub fn render_transcript(conversation: &Conversation) -> String {
    let mut out = format!("# {}\n", conversation.title);
    for message in &conversation.messages {
        let speaker = match message.role {
            Role::User => "you",
            Role::Assistant => "assistant",
        };
        out.push_str(&format!("\n[{speaker}]\n{}\n", message.content));
    }
    out
}
