//! `/remind <seconds> <text> [--silent]`: deliver a private reminder later.
//!
//! Pending reminders live in the status memory under `remind.pending`, so they
//! survive restarts. Each one is delivered at most once.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    command::{Command, CommandContext, Invocation, Options},
    domain::{ChatId, UserId},
    messaging::port::Transport,
    status::ScopedMemory,
    Result,
};

const PENDING_KEY: &str = "pending";
const MAX_DELAY_SECS: i64 = 30 * 24 * 60 * 60;
const MAX_PENDING_PER_USER: usize = 20;

pub(super) fn factory(ctx: CommandContext) -> Box<dyn Command> {
    Box::new(Remind {
        memory: ctx.status.scoped("remind"),
        transport: ctx.transport,
    })
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct Reminder {
    chat_id: ChatId,
    user_id: UserId,
    /// Unix timestamp, seconds.
    due_at: i64,
    text: String,
}

struct Remind {
    memory: ScopedMemory,
    transport: Arc<dyn Transport>,
}

impl Remind {
    async fn pending(&self) -> Result<Vec<Reminder>> {
        Ok(self.memory.get_as(PENDING_KEY).await?.unwrap_or_default())
    }

    async fn store(&self, pending: &[Reminder]) -> Result<()> {
        if pending.is_empty() {
            self.memory.remove(PENDING_KEY).await;
            return Ok(());
        }
        self.memory.set_as(PENDING_KEY, &pending).await
    }
}

#[async_trait]
impl Command for Remind {
    fn init_options(&self, options: &mut Options) {
        options.positional(0, "seconds").required();
        options.positional(1, "text").required();
        options.flag("silent", "skip the confirmation");
    }

    async fn handle(&self, inv: &Invocation<'_>) -> Result<()> {
        let delay = match inv.args.get(0).and_then(|s| s.parse::<i64>().ok()) {
            Some(d) if (0..=MAX_DELAY_SECS).contains(&d) => d,
            _ => {
                return inv
                    .reply(&format!(
                        "The delay must be a whole number of seconds between 0 and {MAX_DELAY_SECS}."
                    ))
                    .await;
            }
        };

        let mut pending = self.pending().await?;
        let user = inv.update.user_id;
        if pending.iter().filter(|r| r.user_id == user).count() >= MAX_PENDING_PER_USER {
            return inv
                .reply(&format!("You already have {MAX_PENDING_PER_USER} pending reminders."))
                .await;
        }

        pending.push(Reminder {
            chat_id: inv.update.chat_id,
            user_id: user,
            due_at: Utc::now().timestamp() + delay,
            text: inv.args.rest(1),
        });
        self.store(&pending).await?;

        tracing::debug!(user = %user, delay, "reminder scheduled");
        if inv.args.named("silent").is_some() {
            return Ok(());
        }
        inv.reply(&format!("OK, I'll remind you in {delay}s.")).await
    }

    async fn tick(&self) -> Result<()> {
        let pending = self.pending().await?;
        if pending.is_empty() {
            return Ok(());
        }

        let now = Utc::now().timestamp();
        let (due, later): (Vec<_>, Vec<_>) = pending.into_iter().partition(|r| r.due_at <= now);
        if due.is_empty() {
            return Ok(());
        }

        // Drop due reminders before sending so a failed send is never retried.
        self.store(&later).await?;
        for r in due {
            if let Err(e) = self.transport.send(r.chat_id, &format!("Reminder: {}", r.text)).await {
                tracing::warn!(user = %r.user_id, error = %e, "reminder delivery failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dispatcher::{Dispatcher, Outcome, Rejection},
        registry::CommandRegistry,
        status::StatusStore,
        testing::{context_with, group_update, private_update, tmp, FakeTransport},
    };

    struct Harness {
        dispatcher: Dispatcher,
        transport: Arc<FakeTransport>,
        status: Arc<StatusStore>,
    }

    async fn harness(prefix: &str) -> Harness {
        let mut cfg = crate::config::test_config();
        cfg.status_file = tmp(prefix).join("status.json");
        let transport = Arc::new(FakeTransport::default());
        let ctx = context_with(cfg, transport.clone());
        ctx.status.add_user(UserId(5)).await;

        let spec = crate::commands::builtin("remind").unwrap();
        let registry = CommandRegistry::build(vec![spec], &ctx).unwrap();
        let status = ctx.status.clone();
        Harness {
            dispatcher: Dispatcher::new(ctx.config, ctx.policy, ctx.status, ctx.transport, registry),
            transport,
            status,
        }
    }

    #[tokio::test]
    async fn due_reminder_is_delivered_once() {
        let h = harness("jb-cmd-remind-due").await;

        h.transport.push_poll(vec![private_update(1, 5, "/remind 0 stretch your legs")]);
        assert_eq!(h.dispatcher.run_once().await, vec![Outcome::Handled]);

        // The tick phase of the same iteration delivers it.
        assert_eq!(
            h.transport.sent_to(ChatId(5)),
            vec![
                "OK, I'll remind you in 0s.".to_string(),
                "Reminder: stretch your legs".to_string(),
            ]
        );
        assert_eq!(h.status.get("remind.pending").await, None);

        h.dispatcher.run_once().await;
        assert_eq!(h.transport.sent_to(ChatId(5)).len(), 2);
    }

    #[tokio::test]
    async fn future_reminder_waits_and_survives_reload() {
        let h = harness("jb-cmd-remind-later").await;

        h.transport.push_poll(vec![private_update(1, 5, "/remind 3600 call home")]);
        h.dispatcher.run_once().await;
        assert_eq!(h.transport.sent_to(ChatId(5)).len(), 1);

        let reloaded = Arc::new(StatusStore::load(h.status.path()).unwrap());
        let pending: Vec<Reminder> = reloaded.scoped("remind").get_as(PENDING_KEY).await.unwrap().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].text, "call home");
        assert_eq!(pending[0].chat_id, ChatId(5));
    }

    #[tokio::test]
    async fn idle_ticks_are_idempotent() {
        let h = harness("jb-cmd-remind-idle").await;
        h.status.save().await.unwrap();
        let before = h.status.snapshot().await;

        for _ in 0..2 {
            h.dispatcher.tick_all().await;
            assert!(!h.status.is_dirty().await);
            assert!(h.transport.sent().is_empty());
            assert_eq!(h.status.snapshot().await, before);
        }
    }

    #[tokio::test]
    async fn repeated_ticks_deliver_only_once() {
        let h = harness("jb-cmd-remind-twice").await;

        h.transport.push_poll(vec![private_update(1, 5, "/remind 0 --silent drink water")]);
        h.dispatcher.run_once().await;
        let after_first = h.transport.sent();
        assert_eq!(after_first, vec![(ChatId(5), "Reminder: drink water".to_string())]);

        h.dispatcher.tick_all().await;
        h.dispatcher.tick_all().await;
        assert_eq!(h.transport.sent(), after_first);
        assert!(!h.status.is_dirty().await);
    }

    #[tokio::test]
    async fn rejects_bad_delay_and_group_use() {
        let h = harness("jb-cmd-remind-bad").await;

        assert_eq!(
            h.dispatcher.dispatch(&private_update(1, 5, "/remind soon eat")).await,
            Outcome::Handled
        );
        assert!(h.transport.sent_to(ChatId(5))[0].starts_with("The delay must be"));
        assert_eq!(h.status.get("remind.pending").await, None);

        let out = h.dispatcher.dispatch(&group_update(2, 5, -100, "/remind 5 eat")).await;
        assert_eq!(out, Outcome::Rejected(Rejection::PrivateOnly));
    }
}
