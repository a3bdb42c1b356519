//! `/grant` and `/revoke`: admin management of the known-user set.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    access::AccessPolicy,
    command::{Command, CommandContext, Invocation, Options},
    domain::UserId,
    status::StatusStore,
    Result,
};

pub(super) fn grant_factory(ctx: CommandContext) -> Box<dyn Command> {
    Box::new(Membership {
        grant: true,
        status: ctx.status,
        policy: ctx.policy,
    })
}

pub(super) fn revoke_factory(ctx: CommandContext) -> Box<dyn Command> {
    Box::new(Membership {
        grant: false,
        status: ctx.status,
        policy: ctx.policy,
    })
}

struct Membership {
    grant: bool,
    status: Arc<StatusStore>,
    policy: Arc<AccessPolicy>,
}

#[async_trait]
impl Command for Membership {
    fn init_options(&self, options: &mut Options) {
        options.positional(0, "user_id").required();
    }

    async fn handle(&self, inv: &Invocation<'_>) -> Result<()> {
        let raw = inv.args.get(0).unwrap_or_default();
        let Ok(target) = raw.parse::<UserId>() else {
            return inv.reply(&format!("{raw:?} is not a numeric user id.")).await;
        };

        let text = if self.grant {
            if self.status.add_user(target).await {
                tracing::info!(user = %target, by = %inv.update.user_id, "user granted");
                format!("User {target} can now use the bot.")
            } else {
                format!("User {target} already has access.")
            }
        } else if self.status.remove_user(target).await {
            tracing::info!(user = %target, by = %inv.update.user_id, "user revoked");
            let mut text = format!("User {target} can no longer use the bot.");
            if self.policy.is_admin(target) {
                text.push_str(" They remain an admin through the configuration.");
            }
            text
        } else {
            format!("User {target} was not a known user.")
        };

        // Flushed right away; on failure the dispatcher retries from memory.
        if let Err(e) = self.status.save_if_dirty().await {
            tracing::error!(user = %target, error = %e, "failed to save status after membership change");
        }
        inv.reply(&text).await
    }
}
