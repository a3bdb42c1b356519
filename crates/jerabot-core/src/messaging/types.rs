use crate::domain::{ChatId, UserId};

/// One inbound text message as delivered by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundUpdate {
    pub update_id: i64,
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
    /// `true` for one-to-one conversations with the bot.
    pub is_private: bool,
    pub text: String,
}

/// `/name@addressee args...` split into its parts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandToken {
    pub name: String,
    pub addressee: Option<String>,
    pub args: String,
}

impl CommandToken {
    /// Parse a command line. Returns `None` for plain text.
    ///
    /// The name is kept as typed; lookups are case-sensitive.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim_start();
        let rest = text.strip_prefix('/')?;

        let mut parts = rest.splitn(2, char::is_whitespace);
        let head = parts.next().unwrap_or("");
        let args = parts.next().unwrap_or("").trim().to_string();

        let (name, addressee) = match head.split_once('@') {
            Some((n, a)) => (n, Some(a.to_string())),
            None => (head, None),
        };
        if name.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            addressee,
            args,
        })
    }

    /// Whether this command is meant for the bot called `username`.
    ///
    /// With `explicit` set, commands sent in group chats must name the bot.
    pub fn is_addressed_to(&self, username: &str, is_private: bool, explicit: bool) -> bool {
        match &self.addressee {
            Some(a) => a.eq_ignore_ascii_case(username),
            None => is_private || !explicit,
        }
    }
}

impl InboundUpdate {
    pub fn command(&self) -> Option<CommandToken> {
        CommandToken::parse(&self.text)
    }
}
