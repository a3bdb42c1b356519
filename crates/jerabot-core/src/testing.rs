//! Fakes shared by unit tests across the crate.

use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    access::AccessPolicy,
    command::CommandContext,
    config::{test_config, Config},
    domain::{BotIdentity, ChatId, UserId},
    errors::Error,
    messaging::{port::Transport, types::InboundUpdate},
    status::StatusStore,
    Result,
};

pub fn tmp(prefix: &str) -> PathBuf {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_nanos();
    let pid = std::process::id();
    PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}"))
}

#[derive(Default)]
pub struct FakeTransport {
    polls: Mutex<VecDeque<Result<Vec<InboundUpdate>>>>,
    sent: Mutex<Vec<(ChatId, String)>>,
    fail_sends: AtomicBool,
    fail_identity: AtomicBool,
}

impl FakeTransport {
    pub fn push_poll(&self, updates: Vec<InboundUpdate>) {
        self.polls.lock().unwrap().push_back(Ok(updates));
    }

    pub fn push_poll_error(&self, msg: &str) {
        self.polls
            .lock()
            .unwrap()
            .push_back(Err(Error::Transport(msg.to_string())));
    }

    pub fn sent(&self) -> Vec<(ChatId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: ChatId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| *c == chat_id)
            .map(|(_, t)| t)
            .collect()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_identity(&self, fail: bool) {
        self.fail_identity.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn poll(&self) -> Result<Vec<InboundUpdate>> {
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn send(&self, chat_id: ChatId, text: &str) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::Transport("send refused".to_string()));
        }
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn self_identity(&self) -> Result<BotIdentity> {
        if self.fail_identity.load(Ordering::SeqCst) {
            return Err(Error::Transport("401 Unauthorized".to_string()));
        }
        Ok(BotIdentity {
            id: UserId(1000),
            username: "jerabot".to_string(),
        })
    }
}

/// A text update from `user` in a chat with the same id (a private chat).
pub fn private_update(update_id: i64, user: i64, text: &str) -> InboundUpdate {
    InboundUpdate {
        update_id,
        chat_id: ChatId(user),
        user_id: UserId(user),
        username: Some(format!("user{user}")),
        is_private: true,
        text: text.to_string(),
    }
}

pub fn group_update(update_id: i64, user: i64, group: i64, text: &str) -> InboundUpdate {
    InboundUpdate {
        update_id,
        chat_id: ChatId(group),
        user_id: UserId(user),
        username: Some(format!("user{user}")),
        is_private: false,
        text: text.to_string(),
    }
}

pub fn context_with(cfg: Config, transport: Arc<FakeTransport>) -> CommandContext {
    let status = StatusStore::load(&cfg.status_file).unwrap();
    CommandContext {
        policy: Arc::new(AccessPolicy::from_config(&cfg)),
        config: Arc::new(cfg),
        status: Arc::new(status),
        transport,
    }
}

/// Context backed by a fresh status file under `/tmp`.
pub fn test_context(prefix: &str) -> CommandContext {
    let mut cfg = test_config();
    cfg.status_file = tmp(prefix).join("status.json");
    context_with(cfg, Arc::new(FakeTransport::default()))
}
