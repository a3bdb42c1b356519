//! The contract every bot command implements, plus the option/argument model
//! used to validate what users type after the command name.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;

use crate::{
    access::{AccessLevel, AccessPolicy},
    config::Config,
    messaging::{port::Transport, types::InboundUpdate},
    registry::CommandRegistry,
    status::StatusStore,
    Result,
};

/// Static description of a command, fixed at registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub name: String,
    pub description: String,
    pub access: AccessLevel,
    /// Left out of `/help` listings.
    pub hidden: bool,
    /// Only accepted in a private chat with the bot.
    pub pm_only: bool,
}

impl CommandDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            access: AccessLevel::Everyone,
            hidden: false,
            pm_only: false,
        }
    }

    pub fn access(mut self, level: AccessLevel) -> Self {
        self.access = level;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn pm_only(mut self) -> Self {
        self.pm_only = true;
        self
    }
}

// ============== Options ==============

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OptionKey {
    Positional(usize),
    Named(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptionSpec {
    pub key: OptionKey,
    pub description: String,
    pub required: bool,
    /// Named option that takes no value; present means `"true"`.
    pub flag: bool,
}

impl OptionSpec {
    pub fn required(&mut self) -> &mut Self {
        self.required = true;
        self
    }
}

/// Options a command declares from [`Command::init_options`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Options {
    specs: Vec<OptionSpec>,
}

impl Options {
    pub fn positional(&mut self, index: usize, description: impl Into<String>) -> &mut OptionSpec {
        self.push(OptionKey::Positional(index), description.into())
    }

    /// `--name value` or `--name=value`.
    pub fn named(&mut self, name: impl Into<String>, description: impl Into<String>) -> &mut OptionSpec {
        self.push(OptionKey::Named(name.into()), description.into())
    }

    /// `--name` on its own.
    pub fn flag(&mut self, name: impl Into<String>, description: impl Into<String>) -> &mut OptionSpec {
        let spec = self.push(OptionKey::Named(name.into()), description.into());
        spec.flag = true;
        spec
    }

    fn push(&mut self, key: OptionKey, description: String) -> &mut OptionSpec {
        self.specs.push(OptionSpec {
            key,
            description,
            required: false,
            flag: false,
        });
        let last = self.specs.len() - 1;
        &mut self.specs[last]
    }

    pub fn specs(&self) -> &[OptionSpec] {
        &self.specs
    }

    /// Names of required options that `args` does not provide.
    pub fn missing(&self, args: &Arguments) -> Vec<String> {
        self.specs
            .iter()
            .filter(|s| s.required)
            .filter_map(|s| match &s.key {
                OptionKey::Positional(i) if args.get(*i).is_none() => Some(s.description.clone()),
                OptionKey::Named(n) if args.named(n).is_none() => Some(format!("--{n}")),
                _ => None,
            })
            .collect()
    }

    fn find_named(&self, name: &str) -> Option<&OptionSpec> {
        self.specs
            .iter()
            .find(|s| matches!(&s.key, OptionKey::Named(n) if n == name))
    }

    /// One-line usage string, e.g. `/remind <seconds> <text> [--silent]`.
    pub fn usage(&self, command: &str) -> String {
        let mut positional: Vec<&OptionSpec> = self
            .specs
            .iter()
            .filter(|s| matches!(s.key, OptionKey::Positional(_)))
            .collect();
        positional.sort_by_key(|s| match s.key {
            OptionKey::Positional(i) => i,
            OptionKey::Named(_) => usize::MAX,
        });

        let mut out = format!("/{command}");
        for s in positional {
            if s.required {
                out.push_str(&format!(" <{}>", s.description));
            } else {
                out.push_str(&format!(" [{}]", s.description));
            }
        }
        for s in &self.specs {
            if let OptionKey::Named(n) = &s.key {
                let item = if s.flag {
                    format!("--{n}")
                } else {
                    format!("--{n} <{}>", s.description)
                };
                if s.required {
                    out.push_str(&format!(" {item}"));
                } else {
                    out.push_str(&format!(" [{item}]"));
                }
            }
        }
        out
    }
}

/// Arguments typed after the command name.
///
/// Declared flags read as `"true"`; declared named options take `--key value`
/// (or `"true"` when no value follows). `--key=value` is always named.
/// Everything else is positional.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Arguments {
    raw: String,
    positional: Vec<String>,
    named: BTreeMap<String, String>,
}

impl Arguments {
    pub fn parse(raw: &str, options: &Options) -> Self {

        let mut positional = Vec::new();
        let mut named = BTreeMap::new();
        let mut words = raw.split_whitespace().peekable();

        while let Some(word) = words.next() {
            let Some(flag) = word.strip_prefix("--").filter(|f| !f.is_empty()) else {
                positional.push(word.to_string());
                continue;
            };

            if let Some((k, v)) = flag.split_once('=') {
                named.insert(k.to_string(), v.to_string());
                continue;
            }
            let Some(spec) = options.find_named(flag) else {
                positional.push(word.to_string());
                continue;
            };

            let value = match words.peek() {
                Some(next) if !spec.flag && !next.starts_with("--") => {
                    words.next().unwrap_or("").to_string()
                }
                _ => "true".to_string(),
            };
            named.insert(flag.to_string(), value);
        }

        Self {
            raw: raw.trim().to_string(),
            positional,
            named,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.positional.get(index).map(String::as_str)
    }

    pub fn named(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }

    /// Positional words from `index` on, joined by single spaces.
    pub fn rest(&self, index: usize) -> String {
        self.positional
            .get(index..)
            .map(|ws| ws.join(" "))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

// ============== Command contract ==============

/// Shared handles given to every command when it is constructed.
#[derive(Clone)]
pub struct CommandContext {
    pub config: Arc<Config>,
    pub policy: Arc<AccessPolicy>,
    pub status: Arc<StatusStore>,
    pub transport: Arc<dyn Transport>,
}

/// Everything a handler gets for one inbound command.
pub struct Invocation<'a> {
    pub update: &'a InboundUpdate,
    pub args: Arguments,
    /// Caller's access level at dispatch time.
    pub level: AccessLevel,
    pub registry: &'a CommandRegistry,
    pub transport: &'a dyn Transport,
}

impl Invocation<'_> {
    pub async fn reply(&self, text: &str) -> Result<()> {
        self.transport.reply(self.update, text).await
    }
}

#[async_trait]
pub trait Command: Send + Sync {
    /// One-time setup, run right after construction and before any dispatch.
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Declare accepted options; called once at registration.
    fn init_options(&self, _options: &mut Options) {}

    /// Run the command. Errors are reported to the user as a generic failure.
    async fn handle(&self, inv: &Invocation<'_>) -> Result<()>;

    /// Background work, called once per loop iteration. Must be a no-op when idle.
    async fn tick(&self) -> Result<()> {
        Ok(())
    }
}

pub type CommandFactory = fn(CommandContext) -> Box<dyn Command>;

/// One row of the registration table: what the command is and how to build it.
#[derive(Clone)]
pub struct CommandSpec {
    pub descriptor: CommandDescriptor,
    pub factory: CommandFactory,
}
