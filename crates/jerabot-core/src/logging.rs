//! Logging setup: a console sink plus an optional sink that forwards
//! INFO-and-above events to the admins' chats through the transport.

use std::{fmt::Write as _, sync::Arc};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{
    field::{Field, Visit},
    Event, Level, Subscriber,
};
use tracing_subscriber::{
    fmt, layer::Context, prelude::*, registry::LookupSpan, EnvFilter, Layer,
};

use crate::{domain::UserId, errors::Error, messaging::port::Transport, Result};

/// Target used by the forwarding machinery; events with it are never forwarded.
pub const FORWARD_TARGET: &str = "jerabot::log_forward";

/// Initialize logging for the bot.
///
/// `RUST_LOG` overrides the default filter (info for everything).
pub fn init(service_name: &str, forward: Option<AdminForwardLayer>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "info,jerabot=info,jerabot_core=info,jerabot_telegram=info,{service_name}=info"
        ))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_ansi(true))
        .with(forward)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install log subscriber: {e}")))?;

    Ok(())
}

/// A log line captured for forwarding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    pub level: Level,
    pub channel: String,
    pub message: String,
}

impl LogRecord {
    pub fn render(&self) -> String {
        format!("[{}] {}: {}", self.level, self.channel, self.message)
    }
}

/// `tracing` layer that copies events at or above `min_level` onto a channel.
pub struct AdminForwardLayer {
    min_level: Level,
    tx: mpsc::UnboundedSender<LogRecord>,
}

impl AdminForwardLayer {
    pub fn new(min_level: Level) -> (Self, mpsc::UnboundedReceiver<LogRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { min_level, tx }, rx)
    }
}

impl<S> Layer<S> for AdminForwardLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        // tracing orders levels by verbosity: ERROR < WARN < INFO < DEBUG.
        if *meta.level() > self.min_level || meta.target().starts_with(FORWARD_TARGET) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let _ = self.tx.send(LogRecord {
            level: *meta.level(),
            channel: meta.target().to_string(),
            message: visitor.finish(),
        });
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            return self.message;
        }
        format!("{} ({})", self.message, self.fields.trim_start())
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// Delivers forwarded log records to every admin chat, best-effort.
pub struct AdminLogForwarder {
    rx: mpsc::UnboundedReceiver<LogRecord>,
    transport: Arc<dyn Transport>,
    admins: Vec<UserId>,
}

impl AdminLogForwarder {
    pub fn new(
        rx: mpsc::UnboundedReceiver<LogRecord>,
        transport: Arc<dyn Transport>,
        admins: Vec<UserId>,
    ) -> Self {
        Self {
            rx,
            transport,
            admins,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            let record = tokio::select! {
                _ = cancel.cancelled() => break,
                rec = self.rx.recv() => match rec {
                    Some(r) => r,
                    None => break,
                },
            };
            self.deliver(&record).await;
        }
    }

    async fn deliver(&self, record: &LogRecord) {
        let text = record.render();
        for admin in &self.admins {
            // Admins talk to the bot privately, so their user id is their chat id.
            let chat = crate::domain::ChatId(admin.0);
            if let Err(e) = self.transport.send(chat, &text).await {
                tracing::debug!(target: FORWARD_TARGET, admin = %admin, error = %e, "log forward failed");
            }
        }
    }
}
