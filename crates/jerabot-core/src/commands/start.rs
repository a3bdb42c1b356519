use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    access::AccessLevel,
    command::{Command, CommandContext, Invocation},
    config::Config,
    Result,
};

pub(super) fn factory(ctx: CommandContext) -> Box<dyn Command> {
    Box::new(Start { config: ctx.config })
}

struct Start {
    config: Arc<Config>,
}

#[async_trait]
impl Command for Start {
    async fn handle(&self, inv: &Invocation<'_>) -> Result<()> {
        let who = inv
            .update
            .username
            .as_deref()
            .map(|u| format!(" @{u}"))
            .unwrap_or_default();

        let mut text = format!(
            "Hi{who}! I'm @{}. Your access level: {}.",
            self.config.username, inv.level
        );
        if inv.level == AccessLevel::Everyone {
            text.push_str(&format!(
                "\nAsk an admin to /grant {} to unlock more commands.",
                inv.update.user_id
            ));
        }
        text.push_str("\nSend /help to see what I can do.");
        inv.reply(&text).await
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        commands::select,
        domain::{ChatId, UserId},
        registry::CommandRegistry,
        testing::{private_update, test_context, FakeTransport},
    };

    use super::*;
    use crate::command::Arguments;

    #[tokio::test]
    async fn greets_and_states_level() {
        let ctx = test_context("jb-cmd-start");
        let registry = CommandRegistry::build(select(&["start".to_string()]).unwrap(), &ctx).unwrap();
        let transport = FakeTransport::default();
        let update = private_update(1, 5, "/start");

        let inv = Invocation {
            update: &update,
            args: Arguments::default(),
            level: AccessLevel::Everyone,
            registry: &registry,
            transport: &transport,
        };
        registry.resolve("start").unwrap().handler.handle(&inv).await.unwrap();

        let sent = transport.sent_to(ChatId(5));
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("Hi @user5! I'm @jerabot. Your access level: everyone."));
        assert!(sent[0].contains(&format!("/grant {}", UserId(5))));
    }

    #[tokio::test]
    async fn known_users_are_not_told_to_ask_for_access() {
        let ctx = test_context("jb-cmd-start-user");
        let registry = CommandRegistry::build(select(&["start".to_string()]).unwrap(), &ctx).unwrap();
        let transport = FakeTransport::default();
        let update = private_update(1, 5, "/start");

        let inv = Invocation {
            update: &update,
            args: Arguments::default(),
            level: AccessLevel::User,
            registry: &registry,
            transport: &transport,
        };
        registry.resolve("start").unwrap().handler.handle(&inv).await.unwrap();

        let sent = transport.sent_to(ChatId(5));
        assert!(sent[0].contains("Your access level: user."));
        assert!(!sent[0].contains("/grant"));
    }
}
