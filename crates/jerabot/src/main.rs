use std::{path::PathBuf, sync::Arc};

use tokio_util::sync::CancellationToken;

use jerabot_core::{
    bot::Bot,
    commands,
    config::Config,
    logging::{self, AdminForwardLayer, AdminLogForwarder},
    messaging::{
        port::Transport,
        throttled::{ThrottleConfig, ThrottledTransport},
    },
};
use jerabot_telegram::TelegramTransport;

#[tokio::main]
async fn main() -> Result<(), jerabot_core::Error> {
    let env_file = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".env"));
    let cfg = Arc::new(Config::load(&env_file)?);

    let (forward, forward_rx) = if cfg.forward_logs_to_admins && !cfg.admins.is_empty() {
        let (layer, rx) = AdminForwardLayer::new(tracing::Level::INFO);
        (Some(layer), Some(rx))
    } else {
        (None, None)
    };
    logging::init("jerabot", forward)?;

    let transport: Arc<dyn Transport> = Arc::new(ThrottledTransport::new(
        Arc::new(TelegramTransport::new(&cfg.api_key)),
        ThrottleConfig::default(),
    ));

    let specs = commands::select(&cfg.commands)?;
    let bot = Bot::new(cfg.clone(), transport.clone(), specs).await?;

    let cancel = CancellationToken::new();
    if let Some(rx) = forward_rx {
        let forwarder = AdminLogForwarder::new(rx, transport, cfg.admins.clone());
        tokio::spawn(forwarder.run(cancel.clone()));
    }
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    bot.run(&cancel).await;
    cancel.cancel();
    Ok(())
}

async fn shutdown_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM; only Ctrl-C stops the bot");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("shutdown requested");
    cancel.cancel();
}
