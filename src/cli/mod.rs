//! Terminal front end: a thin presentation adapter over the store.

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::types::ConversationId;

/// Parley chat CLI
#[derive(Parser, Debug)]
#[command(name = "parley", version, about = "Parley: local conversations, remote replies")]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List conversations
    List,
    /// Start a new conversation
    New,
    /// Make a conversation current
    Select(IdArgs),
    /// Rename a conversation
    Rename(RenameArgs),
    /// Delete a conversation
    Delete(IdArgs),
    /// Print a conversation transcript
    Show(ShowArgs),
    /// Show or hide the conversation list
    ToggleSidebar,
    /// Send a message and print the reply
    Send(SendArgs),
}

#[derive(Parser, Debug)]
pub struct IdArgs {
    pub id: ConversationId,
}

#[derive(Parser, Debug)]
pub struct RenameArgs {
    pub id: ConversationId,
    /// New title, used verbatim
    pub title: String,
}

#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Conversation to print (defaults to the current one)
    pub id: Option<ConversationId>,
}

#[derive(Parser, Debug)]
pub struct SendArgs {
    /// Target conversation (defaults to the current one)
    #[arg(long)]
    pub conversation: Option<ConversationId>,

    /// Message text
    pub message: String,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_send_with_conversation() {
        let cli =
            Cli::try_parse_from(["parley", "send", "--conversation", "1000", "hello there"]).unwrap();
        match cli.command {
            Commands::Send(args) => {
                assert_eq!(args.conversation, Some(ConversationId(1000)));
                assert_eq!(args.message, "hello there");
            }
            other => panic!("expected Send, got {other:?}"),
        }
    }

    #[test]
    fn parse_rename_keeps_title_verbatim() {
        let cli = Cli::try_parse_from(["parley", "rename", "42", "  spaced  "]).unwrap();
        match cli.command {
            Commands::Rename(args) => {
                assert_eq!(args.id, ConversationId(42));
                assert_eq!(args.title, "  spaced  ");
            }
            other => panic!("expected Rename, got {other:?}"),
        }
    }

    #[test]
    fn parse_global_config_flag() {
        let cli = Cli::try_parse_from(["parley", "list", "--config", "/tmp/parley.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/parley.toml")));
        assert!(matches!(cli.command, Commands::List));
    }

    #[test]
    fn parse_toggle_sidebar() {
        let cli = Cli::try_parse_from(["parley", "toggle-sidebar"]).unwrap();
        assert!(matches!(cli.command, Commands::ToggleSidebar));
    }

    #[test]
    fn parse_bad_id_is_error() {
        assert!(Cli::try_parse_from(["parley", "delete", "abc"]).is_err());
        assert!(Cli::try_parse_from(["parley"]).is_err());
    }
}
