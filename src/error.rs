use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    // Precondition errors
    #[error("Guild not found: {id}")]
    GuildNotFound { id: String },

    #[error("Backup not found: {id}")]
    BackupNotFound { id: String },

    #[error("Invalid backup: {message}")]
    InvalidBackup { message: String },

    #[error("Backup id '{id}' is already used by another server")]
    BackupIdTaken { id: String },

    #[error("An import is already running for guild {guild_id}")]
    ImportInProgress { guild_id: String },

    // Export errors
    #[error("Unsupported channel type {kind} for channel '{name}'")]
    UnsupportedChannel { name: String, kind: String },

    #[error("Unknown backup section '{name}' (expected bans, roles, channels or emojis)")]
    UnknownSection { name: String },

    // Storage errors
    #[error("Failed to read backup '{path}': {source}")]
    StorageRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write backup '{path}': {source}")]
    StorageWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse backup '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    // Remote errors, passed through untouched
    #[error(transparent)]
    Discord(#[from] serenity::Error),

    #[error("Failed to download asset '{url}': {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Startup errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        BackupError::Internal {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

use poise::serenity_prelude as serenity;
