use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::UserId, errors::Error, Result};

/// Static bot configuration, loaded once at startup and read-only afterwards.
#[derive(Clone, Debug)]
pub struct Config {
    // Identity
    pub username: String,
    pub api_key: String,
    /// In group chats, only react to commands addressed as `/cmd@username`.
    pub explicit_address: bool,

    // Access lists
    pub admins: Vec<UserId>,
    pub developers: Vec<UserId>,

    // Commands to register, by built-in name (registration order).
    pub commands: Vec<String>,
    pub bootstrap: Option<PathBuf>,

    // Persistence
    pub status_file: PathBuf,

    // Loop timing
    pub poll_interval: Duration,
    /// `None` disables the per-handler bound.
    pub handler_timeout: Option<Duration>,

    // Logging
    pub forward_logs_to_admins: bool,
}

impl Config {
    /// Load from the process environment, after applying `env_file` if present.
    ///
    /// Values already set in the environment win over the env file.
    pub fn load(env_file: &Path) -> Result<Self> {
        load_env_file_if_present(env_file)?;
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let username = get("JERABOT_USERNAME")
            .and_then(non_empty)
            .map(|s| s.trim().trim_start_matches('@').to_string())
            .ok_or_else(|| {
                Error::Config("JERABOT_USERNAME environment variable is required".to_string())
            })?;
        let api_key = get("JERABOT_API_KEY").and_then(non_empty).ok_or_else(|| {
            Error::Config("JERABOT_API_KEY environment variable is required".to_string())
        })?;

        let admins = parse_csv_ids("JERABOT_ADMINS", get("JERABOT_ADMINS"))?;
        let developers = parse_csv_ids("JERABOT_DEVELOPERS", get("JERABOT_DEVELOPERS"))?;

        let commands = match get("JERABOT_COMMANDS").and_then(non_empty) {
            Some(raw) => parse_csv(&raw),
            None => crate::commands::BUILTIN_NAMES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };

        let bootstrap = get("JERABOT_BOOTSTRAP").and_then(non_empty).map(PathBuf::from);
        let status_file = PathBuf::from(
            get("JERABOT_STATUS_FILE")
                .and_then(non_empty)
                .unwrap_or_else(|| "status.json".to_string()),
        );

        let explicit_address = parse_bool(get("JERABOT_EXPLICIT_ADDRESS")).unwrap_or(false);
        let poll_interval =
            Duration::from_millis(parse_u64(get("JERABOT_POLL_INTERVAL_MS")).unwrap_or(1000));
        let handler_timeout = match parse_u64(get("JERABOT_HANDLER_TIMEOUT_MS")).unwrap_or(60_000) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        let forward_logs_to_admins = parse_bool(get("JERABOT_LOG_FORWARD")).unwrap_or(true);

        Ok(Self {
            username,
            api_key,
            explicit_address,
            admins,
            developers,
            commands,
            bootstrap,
            status_file,
            poll_interval,
            handler_timeout,
            forward_logs_to_admins,
        })
    }
}

fn load_env_file_if_present(path: &Path) -> Result<()> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(()),
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Config(format!(
            "failed to read env file {}: {e}",
            path.display()
        ))),
    }
}

fn parse_bool(v: Option<String>) -> Option<bool> {
    v.map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn parse_u64(v: Option<String>) -> Option<u64> {
    v.and_then(|s| s.trim().parse::<u64>().ok())
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn parse_csv_ids(key: &str, v: Option<String>) -> Result<Vec<UserId>> {
    let mut out = Vec::new();
    for part in parse_csv(&v.unwrap_or_default()) {
        let id = part
            .parse::<UserId>()
            .map_err(|e| Error::Config(format!("{key}: invalid user id {part:?}: {e}")))?;
        if !out.contains(&id) {
            out.push(id);
        }
    }
    Ok(out)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        username: "jerabot".to_string(),
        api_key: "x".to_string(),
        explicit_address: false,
        admins: vec![],
        developers: vec![],
        commands: vec![],
        bootstrap: None,
        status_file: "/tmp/jerabot-status.json".into(),
        poll_interval: Duration::from_millis(10),
        handler_timeout: Some(Duration::from_secs(5)),
        forward_logs_to_admins: false,
    }
}
