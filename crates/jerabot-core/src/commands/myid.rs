use async_trait::async_trait;

use crate::{
    command::{Command, CommandContext, Invocation},
    Result,
};

pub(super) fn factory(_ctx: CommandContext) -> Box<dyn Command> {
    Box::new(MyId)
}

struct MyId;

#[async_trait]
impl Command for MyId {
    async fn handle(&self, inv: &Invocation<'_>) -> Result<()> {
        inv.reply(&format!(
            "Your user id: {}\nThis chat's id: {}",
            inv.update.user_id, inv.update.chat_id
        ))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        access::AccessLevel,
        command::Arguments,
        domain::ChatId,
        registry::CommandRegistry,
        testing::{group_update, FakeTransport},
    };

    #[tokio::test]
    async fn reports_user_and_chat_ids() {
        let registry = CommandRegistry::new();
        let transport = FakeTransport::default();
        let update = group_update(1, 42, -1001, "/myid");
        let inv = Invocation {
            update: &update,
            args: Arguments::default(),
            level: AccessLevel::Everyone,
            registry: &registry,
            transport: &transport,
        };

        MyId.handle(&inv).await.unwrap();
        assert_eq!(
            transport.sent_to(ChatId(-1001)),
            vec!["Your user id: 42\nThis chat's id: -1001".to_string()]
        );
    }
}
