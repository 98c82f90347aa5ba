//! Runtime configuration read from the environment (and `.env`).

use std::path::PathBuf;

use crate::error::{BackupError, Result};

pub const DEFAULT_BACKUP_PATH: &str = "backups";
pub const DEFAULT_MAX_LIST: usize = 25;

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    /// Directory holding `<id>.json` backups
    pub backup_path: PathBuf,
    /// Most backups shown by `/backup list`
    pub max_list: usize,
}

impl BotConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let token = get("DISCORD_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| BackupError::Config {
                message: "missing DISCORD_TOKEN environment variable".to_string(),
            })?;

        let max_list = match get("BACKUP_MAX_LIST") {
            Some(value) => value.parse::<usize>().ok().filter(|n| *n > 0).ok_or_else(|| {
                BackupError::Config {
                    message: format!("BACKUP_MAX_LIST must be a positive number, got '{}'", value),
                }
            })?,
            None => DEFAULT_MAX_LIST,
        };

        Ok(Self {
            token,
            backup_path: get("BACKUP_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_PATH)),
            max_list,
        })
    }
}
