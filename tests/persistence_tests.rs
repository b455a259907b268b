//! End-to-end persistence through the file-backed store.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use parley::storage::{FileStore, FileStoreConfig, KeyValueStore};
use parley::store::{ConversationStore, LoadOutcome, StoreConfig, CONVERSATIONS_KEY};
use parley::types::Message;

fn open(dir: &TempDir, config: StoreConfig) -> (Arc<FileStore>, ConversationStore) {
    let storage = Arc::new(FileStore::new(FileStoreConfig::new(dir.path().to_path_buf())));
    let store = ConversationStore::new(storage.clone(), config);
    (storage, store)
}

#[test]
fn state_survives_reopen() {
    let dir = TempDir::new().unwrap();

    let before = {
        let (_, store) = open(&dir, StoreConfig::default());
        store.load().unwrap();
        let first = store.current_conversation_id().unwrap();
        store.rename_conversation(first, "Groceries").unwrap();
        store
            .update_messages(
                first,
                vec![Message::user("milk?"), Message::assistant("and eggs")],
            )
            .unwrap();
        let second = store.create_conversation().unwrap();
        store.append_message(second, Message::user("ünïcödé ✓")).unwrap();
        store.toggle_sidebar().unwrap();
        store.snapshot()
    };

    let (_, reopened) = open(&dir, StoreConfig::default());
    let outcome = reopened.load().unwrap();
    assert_eq!(
        outcome,
        LoadOutcome::Restored {
            count: 2,
            dropped: 0
        }
    );

    let after = reopened.snapshot();
    assert_eq!(after.conversations, before.conversations);
    assert_eq!(after.current_conversation_id, before.current_conversation_id);
    assert!(!after.is_sidebar_open);
}

#[test]
fn reopening_with_smaller_cap_rewrites_storage() {
    let dir = TempDir::new().unwrap();
    {
        let (_, store) = open(&dir, StoreConfig::default());
        for _ in 0..4 {
            store.create_conversation().unwrap();
        }
    }

    let (storage, store) = open(&dir, StoreConfig::builder().max_conversations(3).build());
    assert_eq!(
        store.load().unwrap(),
        LoadOutcome::Restored {
            count: 3,
            dropped: 1
        }
    );
    let blob = storage.get(CONVERSATIONS_KEY).unwrap().unwrap();
    assert_eq!(parley::codec::decode(&blob).unwrap().len(), 3);
}

#[test]
fn deleting_everything_removes_blob_file() {
    let dir = TempDir::new().unwrap();
    let (storage, store) = open(&dir, StoreConfig::default());
    store.load().unwrap();
    let id = store.current_conversation_id().unwrap();
    assert!(storage.get(CONVERSATIONS_KEY).unwrap().is_some());

    store.delete_conversation(id).unwrap();
    assert!(storage.get(CONVERSATIONS_KEY).unwrap().is_none());

    let (_, reopened) = open(&dir, StoreConfig::default());
    assert!(matches!(reopened.load().unwrap(), LoadOutcome::Fresh { .. }));
    // The sidebar was opened when the last conversation went away.
    assert!(reopened.is_sidebar_open());
}
