//! Composition root: wires configuration, status, access policy, commands and
//! the transport into a running bot.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    access::{AccessLevel, AccessPolicy},
    bootstrap,
    command::{CommandContext, CommandSpec},
    config::Config,
    dispatcher::Dispatcher,
    domain::{BotIdentity, UserId},
    errors::Error,
    messaging::port::Transport,
    registry::CommandRegistry,
    status::StatusStore,
    Result,
};

pub struct Bot {
    cfg: Arc<Config>,
    policy: Arc<AccessPolicy>,
    status: Arc<StatusStore>,
    identity: BotIdentity,
    dispatcher: Dispatcher,
}

impl Bot {
    /// Build a bot ready to run.
    ///
    /// Fails on an unreadable or corrupt status snapshot, a credential the
    /// network rejects, an invalid command table, or a failing bootstrap hook.
    pub async fn new(
        cfg: Arc<Config>,
        transport: Arc<dyn Transport>,
        specs: Vec<CommandSpec>,
    ) -> Result<Self> {
        let status = Arc::new(StatusStore::load(&cfg.status_file)?);
        let policy = Arc::new(AccessPolicy::from_config(&cfg));

        let identity = transport
            .self_identity()
            .await
            .map_err(|e| Error::Config(format!("credential rejected: {e}")))?;
        if !identity.username.eq_ignore_ascii_case(&cfg.username) {
            tracing::warn!(
                configured = %cfg.username,
                actual = %identity.username,
                "configured username differs from the network's"
            );
        }

        let ctx = CommandContext {
            config: cfg.clone(),
            policy: policy.clone(),
            status: status.clone(),
            transport: transport.clone(),
        };
        let registry = CommandRegistry::build(specs, &ctx)?;

        if let Some(hook) = &cfg.bootstrap {
            bootstrap::run_hook(hook, &cfg).await?;
        }

        let users = status.read(|r| r.users().count()).await;
        tracing::info!(
            username = %identity.username,
            id = %identity.id,
            commands = registry.len(),
            users,
            "bot ready"
        );

        let dispatcher = Dispatcher::new(cfg.clone(), policy.clone(), status.clone(), transport, registry);
        Ok(Self {
            cfg,
            policy,
            status,
            identity,
            dispatcher,
        })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn identity(&self) -> &BotIdentity {
        &self.identity
    }

    pub fn status(&self) -> &Arc<StatusStore> {
        &self.status
    }

    pub fn registry(&self) -> &CommandRegistry {
        self.dispatcher.registry()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn access_level(&self, user: UserId) -> AccessLevel {
        self.status
            .read(|rec| self.policy.access_level(user, rec))
            .await
    }

    pub fn is_admin(&self, user: UserId) -> bool {
        self.policy.is_admin(user)
    }

    pub async fn is_known_user(&self, user: UserId) -> bool {
        self.status
            .read(|rec| self.policy.is_known_user(user, rec))
            .await
    }

    /// Run the poll loop until `cancel` fires.
    pub async fn run(&self, cancel: &CancellationToken) {
        self.dispatcher.run(cancel).await;
    }
}
