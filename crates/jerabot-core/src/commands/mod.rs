//! Built-in commands and the registration table the binary selects from.

mod access;
mod help;
mod myid;
mod remind;
mod start;

use crate::{
    access::AccessLevel,
    command::{CommandDescriptor, CommandSpec},
    errors::Error,
    Result,
};

/// Every built-in, in default registration order.
pub const BUILTIN_NAMES: &[&str] = &["start", "help", "myid", "grant", "revoke", "remind"];

/// Registration row for a built-in command, by name.
pub fn builtin(name: &str) -> Option<CommandSpec> {
    let spec = match name {
        "start" => CommandSpec {
            descriptor: CommandDescriptor::new("start", "Say hello and show your access level"),
            factory: start::factory,
        },
        "help" => CommandSpec {
            descriptor: CommandDescriptor::new("help", "List the commands you can use"),
            factory: help::factory,
        },
        "myid" => CommandSpec {
            descriptor: CommandDescriptor::new("myid", "Show your user id and this chat's id"),
            factory: myid::factory,
        },
        "grant" => CommandSpec {
            descriptor: CommandDescriptor::new("grant", "Let a user use the bot")
                .access(AccessLevel::Admin),
            factory: access::grant_factory,
        },
        "revoke" => CommandSpec {
            descriptor: CommandDescriptor::new("revoke", "Remove a user's access")
                .access(AccessLevel::Admin),
            factory: access::revoke_factory,
        },
        "remind" => CommandSpec {
            descriptor: CommandDescriptor::new("remind", "Remind you of something later")
                .access(AccessLevel::User)
                .pm_only(),
            factory: remind::factory,
        },
        _ => return None,
    };
    Some(spec)
}

/// Resolve configured command names into a registration table, keeping order.
///
/// Duplicates are passed through so the registry reports them.
pub fn select(names: &[String]) -> Result<Vec<CommandSpec>> {
    names
        .iter()
        .map(|name| {
            builtin(name).ok_or_else(|| Error::Config(format!("unknown command in JERABOT_COMMANDS: {name}")))
        })
        .collect()
}
