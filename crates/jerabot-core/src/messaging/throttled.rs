use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{BotIdentity, ChatId},
    messaging::{port::Transport, types::InboundUpdate},
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between any two outbound sends.
    pub global_min_interval: Duration,
    /// Minimum spacing between sends to the same chat.
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40), // ~25/sec
            per_chat_min_interval: Duration::from_millis(1050), // ~0.95/sec
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return how long to wait before using it.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// Transport decorator that spaces out outbound sends.
///
/// Polling and identity lookups pass straight through.
pub struct ThrottledTransport {
    inner: Arc<dyn Transport>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_chat: Mutex<HashMap<i64, IntervalLimiter>>,
}

impl ThrottledTransport {
    pub fn new(inner: Arc<dyn Transport>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    async fn throttle_chat(&self, chat_id: ChatId) {
        let global_wait = { self.global.lock().await.reserve() };
        let chat_wait = {
            let mut map = self.per_chat.lock().await;
            map.entry(chat_id.0)
                .or_insert_with(|| IntervalLimiter::new(self.cfg.per_chat_min_interval))
                .reserve()
        };

        let wait = global_wait.max(chat_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl Transport for ThrottledTransport {
    async fn poll(&self) -> Result<Vec<InboundUpdate>> {
        self.inner.poll().await
    }

    async fn reply(&self, update: &InboundUpdate, text: &str) -> Result<()> {
        self.throttle_chat(update.chat_id).await;
        self.inner.reply(update, text).await
    }

    async fn send(&self, chat_id: ChatId, text: &str) -> Result<()> {
        self.throttle_chat(chat_id).await;
        self.inner.send(chat_id, text).await
    }

    async fn self_identity(&self) -> Result<BotIdentity> {
        self.inner.self_identity().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;

    #[test]
    fn limiter_spaces_reservations() {
        let mut lim = IntervalLimiter::new(Duration::from_secs(10));
        assert!(lim.reserve().is_zero());
        let second = lim.reserve();
        assert!(second > Duration::from_secs(9));
    }

    #[tokio::test]
    async fn sends_to_same_chat_are_spaced() {
        let fake = Arc::new(FakeTransport::default());
        let throttled = ThrottledTransport::new(
            fake.clone(),
            ThrottleConfig {
                global_min_interval: Duration::from_millis(0),
                per_chat_min_interval: Duration::from_millis(50),
            },
        );

        let start = Instant::now();
        throttled.send(ChatId(1), "a").await.unwrap();
        throttled.send(ChatId(1), "b").await.unwrap();
        throttled.send(ChatId(2), "c").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));

        let sent: Vec<String> = fake.sent().into_iter().map(|(_, t)| t).collect();
        assert_eq!(sent, vec!["a", "b", "c"]);
    }
}
