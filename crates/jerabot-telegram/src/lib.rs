//! Telegram adapter (teloxide).
//!
//! Implements the `jerabot-core` [`Transport`] over the Telegram Bot API using
//! long polling.

use async_trait::async_trait;
use teloxide::{prelude::*, types::UpdateKind};
use tokio::{sync::Mutex, time::sleep};

use jerabot_core::{
    domain::{BotIdentity, ChatId, UserId},
    errors::Error,
    messaging::{port::Transport, types::InboundUpdate},
    Result,
};

/// Telegram rejects messages longer than this many UTF-16 code units.
pub const MAX_MESSAGE_LEN: usize = 4096;

pub struct TelegramTransport {
    bot: Bot,
    /// Next update id to ask for; everything below it has been seen.
    offset: Mutex<i32>,
}

impl TelegramTransport {
    pub fn new(api_key: &str) -> Self {
        Self::with_bot(Bot::new(api_key))
    }

    pub fn with_bot(bot: Bot) -> Self {
        Self {
            bot,
            offset: Mutex::new(0),
        }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::Transport(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn poll(&self) -> Result<Vec<InboundUpdate>> {
        let mut offset = self.offset.lock().await;

        let updates = self
            .bot
            .get_updates()
            .offset(*offset)
            // Short poll: the dispatcher owns the wait between iterations.
            .timeout(0)
            .await
            .map_err(Self::map_err)?;

        let mut out = Vec::with_capacity(updates.len());
        for update in updates {
            // Acknowledge every update, including the ones we do not route.
            *offset = (*offset).max(update.id + 1);
            if let Some(inbound) = convert(update) {
                out.push(inbound);
            }
        }
        if !out.is_empty() {
            tracing::debug!(count = out.len(), next_offset = *offset, "received updates");
        }
        Ok(out)
    }

    async fn send(&self, chat_id: ChatId, text: &str) -> Result<()> {
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            self.with_retry(|| self.bot.send_message(Self::tg_chat(chat_id), chunk.clone()))
                .await?;
        }
        Ok(())
    }

    async fn self_identity(&self) -> Result<BotIdentity> {
        let me = self.with_retry(|| self.bot.get_me()).await?;
        Ok(BotIdentity {
            id: UserId(me.user.id.0 as i64),
            username: me.username().to_string(),
        })
    }
}

/// Text messages from a user become inbound updates; everything else is skipped.
fn convert(update: Update) -> Option<InboundUpdate> {
    let UpdateKind::Message(msg) = update.kind else {
        return None;
    };
    let from = msg.from()?;
    let text = msg.text()?;

    Some(InboundUpdate {
        update_id: i64::from(update.id),
        chat_id: ChatId(msg.chat.id.0),
        user_id: UserId(from.id.0 as i64),
        username: from.username.clone(),
        is_private: msg.chat.is_private(),
        text: text.to_string(),
    })
}

/// Split `text` into pieces of at most `limit` UTF-16 code units, preferring line breaks.
fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut cur_len = 0usize;

    for line in text.split_inclusive('\n') {
        let line_len = line.encode_utf16().count();
        if cur_len + line_len > limit && !cur.is_empty() {
            out.push(std::mem::take(&mut cur));
            cur_len = 0;
        }
        if line_len <= limit {
            cur.push_str(line);
            cur_len += line_len;
            continue;
        }
        // A single line longer than the limit is cut at character boundaries.
        for ch in line.chars() {
            if cur_len + ch.len_utf16() > limit {
                out.push(std::mem::take(&mut cur));
                cur_len = 0;
            }
            cur.push(ch);
            cur_len += ch.len_utf16();
        }
    }
    if !cur.is_empty() || out.is_empty() {
        out.push(cur);
    }
    out
}
