use std::{fs, path::Path};

use tokio::process::Command;

use crate::{config::Config, errors::Error, Result};

/// Run the configured bootstrap hook once, after the bot is wired together.
///
/// The hook is an executable; it sees the bot's username and status file path
/// in its environment. Any failure is a configuration error.
pub async fn run_hook(path: &Path, cfg: &Config) -> Result<()> {
    fs::File::open(path).map_err(|e| {
        Error::Config(format!("unreadable bootstrap {}: {e}", path.display()))
    })?;

    let status = Command::new(path)
        .env("JERABOT_USERNAME", &cfg.username)
        .env("JERABOT_STATUS_FILE", &cfg.status_file)
        .status()
        .await
        .map_err(|e| Error::Config(format!("failed to run bootstrap {}: {e}", path.display())))?;

    if !status.success() {
        return Err(Error::Config(format!(
            "bootstrap {} exited with {status}",
            path.display()
        )));
    }

    tracing::info!(hook = %path.display(), "bootstrap finished");
    Ok(())
}
