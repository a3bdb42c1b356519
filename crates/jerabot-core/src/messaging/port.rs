use async_trait::async_trait;

use crate::{
    domain::{BotIdentity, ChatId},
    messaging::types::InboundUpdate,
    Result,
};

/// Messaging transport consumed by the runtime.
///
/// Implementations own the wire protocol; the runtime only sees parsed updates
/// and sends plain-text payloads back.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch updates that arrived since the previous call, in delivery order.
    async fn poll(&self) -> Result<Vec<InboundUpdate>>;

    /// Reply in the chat the update came from.
    async fn reply(&self, update: &InboundUpdate, text: &str) -> Result<()> {
        self.send(update.chat_id, text).await
    }

    /// Send to an arbitrary chat (used by background work and log forwarding).
    async fn send(&self, chat_id: ChatId, text: &str) -> Result<()>;

    async fn self_identity(&self) -> Result<BotIdentity>;
}
