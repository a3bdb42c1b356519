use async_trait::async_trait;

use crate::{
    command::{Command, CommandContext, Invocation},
    Result,
};

pub(super) fn factory(_ctx: CommandContext) -> Box<dyn Command> {
    Box::new(Help)
}

struct Help;

#[async_trait]
impl Command for Help {
    async fn handle(&self, inv: &Invocation<'_>) -> Result<()> {
        let mut lines = vec!["Commands you can use:".to_string()];
        for entry in inv.registry.all() {
            let d = &entry.descriptor;
            if d.hidden || d.access > inv.level {
                continue;
            }
            let mut line = format!("/{} - {}", d.name, d.description);
            if d.pm_only {
                line.push_str(" (private chat only)");
            }
            lines.push(line);
        }
        inv.reply(&lines.join("\n")).await
    }
}
