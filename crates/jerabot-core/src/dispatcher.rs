//! The poll loop: fetch updates, route each one to its command, then tick
//! every command, then sleep.
//!
//! Everything runs on one logical thread of control. At most one `handle` or
//! `tick` body executes at any time, so commands may assume exclusive access to
//! the status store while they run.

use std::{any::Any, future::Future, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures_util::FutureExt;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    access::{AccessLevel, AccessPolicy},
    command::{Arguments, Invocation},
    config::Config,
    errors::Error,
    messaging::{port::Transport, types::InboundUpdate},
    registry::CommandRegistry,
    status::StatusStore,
    Result,
};

/// Why an update was turned away before reaching its handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    AccessLevel {
        required: AccessLevel,
        actual: AccessLevel,
    },
    PrivateOnly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Failure {
    /// Required options were missing; a usage line was sent instead.
    Usage,
    Error,
    Timeout,
}

/// Terminal state of one inbound update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Ignored,
    Rejected(Rejection),
    Handled,
    Failed(Failure),
}

pub const GENERIC_FAILURE_REPLY: &str = "Something went wrong. Please try again later.";

pub struct Dispatcher {
    cfg: Arc<Config>,
    policy: Arc<AccessPolicy>,
    status: Arc<StatusStore>,
    transport: Arc<dyn Transport>,
    registry: CommandRegistry,
}

impl Dispatcher {
    pub fn new(
        cfg: Arc<Config>,
        policy: Arc<AccessPolicy>,
        status: Arc<StatusStore>,
        transport: Arc<dyn Transport>,
        registry: CommandRegistry,
    ) -> Self {
        Self {
            cfg,
            policy,
            status,
            transport,
            registry,
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Run until `cancel` fires. The iteration in progress is finished first,
    /// then pending status changes are flushed.
    pub async fn run(&self, cancel: &CancellationToken) {
        tracing::info!(
            commands = self.registry.len(),
            interval_ms = self.cfg.poll_interval.as_millis() as u64,
            "poll loop started"
        );

        while !cancel.is_cancelled() {
            let updates = tokio::select! {
                _ = cancel.cancelled() => break,
                polled = self.transport.poll() => polled,
            };
            self.process(updates).await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.cfg.poll_interval) => {}
            }
        }

        self.persist().await;
        tracing::info!("poll loop stopped");
    }

    /// One full iteration without the trailing sleep.
    pub async fn run_once(&self) -> Vec<Outcome> {
        let updates = self.transport.poll().await;
        self.process(updates).await
    }

    async fn process(&self, updates: Result<Vec<InboundUpdate>>) -> Vec<Outcome> {
        let updates = match updates {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!(error = %e, "poll failed; retrying next iteration");
                Vec::new()
            }
        };

        let mut outcomes = Vec::with_capacity(updates.len());
        for update in &updates {
            outcomes.push(self.dispatch(update).await);
        }

        self.tick_all().await;
        outcomes
    }

    /// Route one update through matching, authorization and its handler.
    pub async fn dispatch(&self, update: &InboundUpdate) -> Outcome {
        let Some(token) = update.command() else {
            return Outcome::Ignored;
        };
        if !token.is_addressed_to(&self.cfg.username, update.is_private, self.cfg.explicit_address)
        {
            return Outcome::Ignored;
        }
        let Some(entry) = self.registry.resolve(&token.name) else {
            tracing::debug!(command = %token.name, "unknown command");
            return Outcome::Ignored;
        };
        let desc = &entry.descriptor;

        if desc.pm_only && !update.is_private {
            self.reply(update, &format!("/{} only works in a private chat with me.", desc.name))
                .await;
            return Outcome::Rejected(Rejection::PrivateOnly);
        }

        let level = self
            .status
            .read(|rec| self.policy.access_level(update.user_id, rec))
            .await;
        if level < desc.access {
            tracing::info!(
                command = %desc.name,
                user = %update.user_id,
                required = %desc.access,
                actual = %level,
                "access denied"
            );
            self.reply(update, &format!("Sorry, you are not allowed to use /{}.", desc.name))
                .await;
            return Outcome::Rejected(Rejection::AccessLevel {
                required: desc.access,
                actual: level,
            });
        }

        let args = Arguments::parse(&token.args, &entry.options);
        let missing = entry.options.missing(&args);
        if !missing.is_empty() {
            self.reply(update, &format!("Usage: {}", entry.options.usage(&desc.name)))
                .await;
            return Outcome::Failed(Failure::Usage);
        }

        let inv = Invocation {
            update,
            args,
            level,
            registry: &self.registry,
            transport: self.transport.as_ref(),
        };

        tracing::debug!(command = %desc.name, user = %update.user_id, "handling command");
        let span = tracing::info_span!("command", name = %desc.name);
        let result = self.guarded(entry.handler.handle(&inv)).instrument(span).await;

        let outcome = match result {
            Ok(()) => Outcome::Handled,
            Err(e) => {
                tracing::error!(command = %desc.name, user = %update.user_id, error = %e, "command failed");
                self.reply(update, GENERIC_FAILURE_REPLY).await;
                match e {
                    Error::HandlerTimeout(_) => Outcome::Failed(Failure::Timeout),
                    _ => Outcome::Failed(Failure::Error),
                }
            }
        };

        self.persist().await;
        outcome
    }

    /// Give every command its background turn, in registration order.
    pub async fn tick_all(&self) {
        for entry in self.registry.all() {
            let span = tracing::debug_span!("tick", name = %entry.descriptor.name);
            if let Err(e) = self.guarded(entry.handler.tick()).instrument(span).await {
                tracing::error!(command = %entry.descriptor.name, error = %e, "tick failed");
            }
        }
        self.persist().await;
    }

    /// Bound a handler or tick body in time and turn a panic into a handler error.
    async fn guarded(&self, fut: impl Future<Output = Result<()>>) -> Result<()> {
        let fut = async move {
            AssertUnwindSafe(fut)
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(Error::Handler(format!("panicked: {}", panic_message(&*panic))))
                })
        };
        match self.cfg.handler_timeout {
            Some(limit) => bounded(limit, fut).await,
            None => fut.await,
        }
    }

    async fn reply(&self, update: &InboundUpdate, text: &str) {
        if let Err(e) = self.transport.reply(update, text).await {
            tracing::warn!(chat = %update.chat_id, error = %e, "reply failed");
        }
    }

    /// Flush status changes; failures are logged and retried on the next call.
    async fn persist(&self) {
        if let Err(e) = self.status.save_if_dirty().await {
            tracing::error!(error = %e, "failed to save status");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

async fn bounded(limit: Duration, fut: impl Future<Output = Result<()>>) -> Result<()> {
    timeout(limit, fut)
        .await
        .unwrap_or(Err(Error::HandlerTimeout(limit)))
}
