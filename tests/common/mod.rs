//! Shared test helpers and scripted chat backend.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use parley::client::{ChatBackend, ChatReply, ChatRequest, SessionToken};
use parley::error::{ParleyError, Result};
use parley::storage::MemoryStore;
use parley::store::{ConversationStore, StoreConfig};
use parley::util::clock::ManualClock;

/// Clock reading every helper store starts at.
pub const START_MILLIS: i64 = 1_000;

enum Step {
    Reply(ChatReply),
    Fail(ParleyError),
}

/// A chat backend that plays back queued steps and records every request.
#[derive(Default)]
pub struct ScriptedBackend {
    steps: Mutex<VecDeque<(Option<Duration>, Step)>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a reply carrying a session token.
    pub fn queue_reply(&self, session_id: impl Into<SessionToken>, message: &str) {
        self.push(None, Step::Reply(reply(Some(session_id.into()), message)));
    }

    /// Queue a reply without a session token.
    pub fn queue_bare_reply(&self, message: &str) {
        self.push(None, Step::Reply(reply(None, message)));
    }

    /// Queue a reply delivered after `delay`.
    pub fn queue_delayed_reply(&self, delay: Duration, message: &str) {
        self.push(Some(delay), Step::Reply(reply(None, message)));
    }

    pub fn queue_error(&self, error: ParleyError) {
        self.push(None, Step::Fail(error));
    }

    /// Requests seen so far, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn push(&self, delay: Option<Duration>, step: Step) {
        self.steps.lock().unwrap().push_back((delay, step));
    }
}

fn reply(session_id: Option<SessionToken>, message: &str) -> ChatReply {
    ChatReply {
        session_id,
        message: message.to_string(),
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn send(&self, request: &ChatRequest) -> Result<ChatReply> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.steps.lock().unwrap().pop_front();
        let Some((delay, step)) = next else {
            return Ok(reply(None, "Mock reply"));
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match step {
            Step::Reply(reply) => Ok(reply),
            Step::Fail(error) => Err(error),
        }
    }
}

/// A store over fresh in-memory storage with a manual clock at
/// [`START_MILLIS`]. `load` has not been called.
pub fn memory_store(config: StoreConfig) -> (Arc<MemoryStore>, Arc<ConversationStore>) {
    memory_store_over(Arc::new(MemoryStore::new()), config)
}

/// Like [`memory_store`], but over existing storage.
pub fn memory_store_over(
    storage: Arc<MemoryStore>,
    config: StoreConfig,
) -> (Arc<MemoryStore>, Arc<ConversationStore>) {
    let store = ConversationStore::new(storage.clone(), config)
        .with_clock(Arc::new(ManualClock::new(START_MILLIS)));
    (storage, Arc::new(store))
}

/// A loaded store holding one fresh conversation.
pub fn loaded_store() -> (Arc<MemoryStore>, Arc<ConversationStore>) {
    let (storage, store) = memory_store(StoreConfig::default());
    store.load().unwrap();
    (storage, store)
}
