use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use poise::serenity_prelude::GuildId;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{BackupError, Result};
use crate::snapshot::Snapshot;

pub type SharedBackupManager = Arc<BackupManager>;

/// Summary of a stored backup
#[derive(Debug, Clone, PartialEq)]
pub struct BackupInfo {
    pub id: String,
    pub name: String,
    pub guild_id: String,
    pub created_timestamp: i64,
    /// File size in bytes
    pub size: u64,
    pub roles: usize,
    pub channels: usize,
    pub emojis: usize,
    pub bans: usize,
}

impl BackupInfo {
    fn from_snapshot(snapshot: &Snapshot, size: u64) -> Self {
        Self {
            id: snapshot.id.clone(),
            name: snapshot.name.clone(),
            guild_id: snapshot.guild_id.clone(),
            created_timestamp: snapshot.created_timestamp,
            size,
            roles: snapshot.roles.len(),
            channels: snapshot.channel_count(),
            emojis: snapshot.emojis.len(),
            bans: snapshot.bans.len(),
        }
    }

    /// Format the backup details as a human-readable string
    pub fn format(&self) -> String {
        let created = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(self.created_timestamp)
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "unknown".to_string());

        format!(
            "**Backup:** `{}`\n**Server:** {} (`{}`)\n**Created:** {}\n**Size:** {:.1} KiB\n\
             **Contents:** {} roles, {} channels, {} emojis, {} bans",
            self.id,
            self.name,
            self.guild_id,
            created,
            self.size as f64 / 1024.0,
            self.roles,
            self.channels,
            self.emojis,
            self.bans
        )
    }
}

/// Stores snapshots as `<owner guild>/<id>.json` files and tracks running imports.
///
/// Ids are unique across owners, so any server can load a backup by id. Listing,
/// details and removal only see the calling server's own backups.
pub struct BackupManager {
    storage_dir: PathBuf,
    // guild -> backup being imported
    imports: DashMap<GuildId, String>,
}

/// Marks an import as running until dropped
pub struct ImportGuard<'a> {
    imports: &'a DashMap<GuildId, String>,
    guild_id: GuildId,
}

impl Drop for ImportGuard<'_> {
    fn drop(&mut self) {
        self.imports.remove(&self.guild_id);
        debug!("Import lock released for guild {}", self.guild_id);
    }
}

impl BackupManager {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            imports: DashMap::new(),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Create the storage directory if it is missing
    pub async fn ensure_storage(&self) -> Result<()> {
        create_dir(&self.storage_dir).await
    }

    /// Reject ids that cannot be used as file names
    pub fn validate_id(id: &str) -> Result<()> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(BackupError::InvalidBackup {
                message: format!("'{}' is not a valid backup id", id),
            });
        }
        Ok(())
    }

    fn owner_dir(&self, owner: GuildId) -> PathBuf {
        self.storage_dir.join(owner.to_string())
    }

    fn path_for(&self, owner: GuildId, id: &str) -> Result<PathBuf> {
        Self::validate_id(id)?;
        Ok(self.owner_dir(owner).join(format!("{}.json", id)))
    }

    /// Parse and validate a snapshot from raw JSON
    pub fn parse(bytes: &[u8], source: &str) -> Result<Snapshot> {
        let snapshot: Snapshot = serde_json::from_slice(bytes).map_err(|e| BackupError::Parse {
            path: source.to_string(),
            source: e,
        })?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// The server a stored backup belongs to, if it exists
    pub async fn owner_of(&self, id: &str) -> Result<Option<GuildId>> {
        Ok(self.locate(id).await?.map(|(owner, _)| owner))
    }

    async fn locate(&self, id: &str) -> Result<Option<(GuildId, PathBuf)>> {
        Self::validate_id(id)?;
        let file_name = format!("{}.json", id);

        let Some(mut owners) = read_dir(&self.storage_dir).await? else {
            return Ok(None);
        };
        while let Some(entry) = next_entry(&mut owners, &self.storage_dir).await? {
            let Some(owner) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u64>().ok())
                .filter(|owner| *owner != 0)
            else {
                continue;
            };

            let path = entry.path().join(&file_name);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(Some((GuildId::new(owner), path)));
            }
        }
        Ok(None)
    }

    /// Write a snapshot atomically under `owner`, replacing the owner's backup
    /// with the same id
    pub async fn save(&self, owner: GuildId, snapshot: &Snapshot) -> Result<PathBuf> {
        let path = self.path_for(owner, &snapshot.id)?;
        if let Some(existing) = self.owner_of(&snapshot.id).await? {
            if existing != owner {
                return Err(BackupError::BackupIdTaken {
                    id: snapshot.id.clone(),
                });
            }
        }
        create_dir(&self.owner_dir(owner)).await?;

        let content = serde_json::to_string_pretty(snapshot)?;
        let temp_path = path.with_extension("json.tmp");
        let write_error = |e| BackupError::StorageWrite {
            path: path.display().to_string(),
            source: e,
        };

        tokio::fs::write(&temp_path, &content)
            .await
            .map_err(write_error)?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(write_error)?;

        info!("Saved backup {} for guild {} to {}", snapshot.id, owner, path.display());
        Ok(path)
    }

    /// Load a backup by id, whichever server stored it
    pub async fn fetch(&self, id: &str) -> Result<Snapshot> {
        let Some((_, path)) = self.locate(id).await? else {
            return Err(BackupError::BackupNotFound { id: id.to_string() });
        };
        let bytes = read_backup(&path, id).await?;
        Self::parse(&bytes, &path.display().to_string())
    }

    pub async fn info(&self, owner: GuildId, id: &str) -> Result<BackupInfo> {
        let path = self.path_for(owner, id)?;
        read_info(&path, id).await
    }

    /// The owner's readable backups, newest first. Unreadable files are skipped.
    pub async fn list(&self, owner: GuildId) -> Result<Vec<BackupInfo>> {
        let dir = self.owner_dir(owner);
        let Some(mut entries) = read_dir(&dir).await? else {
            return Ok(Vec::new());
        };

        let mut backups = Vec::new();
        while let Some(entry) = next_entry(&mut entries, &dir).await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match read_info(&path, id).await {
                Ok(info) => backups.push(info),
                Err(e) => warn!("Skipping unreadable backup {}: {}", path.display(), e),
            }
        }

        backups.sort_by(|a, b| b.created_timestamp.cmp(&a.created_timestamp));
        Ok(backups)
    }

    /// Delete one of the owner's backups. Other servers' backups are not found.
    pub async fn remove(&self, owner: GuildId, id: &str) -> Result<()> {
        let path = self.path_for(owner, id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Removed backup {} for guild {}", id, owner);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BackupError::BackupNotFound {
                id: id.to_string(),
            }),
            Err(e) => Err(BackupError::StorageWrite {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }

    /// Claim a guild for an import. Fails if another import holds it.
    pub fn begin_import(&self, guild_id: GuildId, backup_id: &str) -> Result<ImportGuard<'_>> {
        match self.imports.entry(guild_id) {
            Entry::Occupied(running) => {
                warn!(
                    "Refusing import into guild {}: backup {} is still loading",
                    guild_id,
                    running.get()
                );
                Err(BackupError::ImportInProgress {
                    guild_id: guild_id.to_string(),
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(backup_id.to_string());
                Ok(ImportGuard {
                    imports: &self.imports,
                    guild_id,
                })
            }
        }
    }

    pub fn import_running(&self, guild_id: GuildId) -> bool {
        self.imports.contains_key(&guild_id)
    }
}

async fn create_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| BackupError::StorageWrite {
            path: dir.display().to_string(),
            source: e,
        })
}

/// `None` when the directory does not exist yet
async fn read_dir(dir: &Path) -> Result<Option<tokio::fs::ReadDir>> {
    match tokio::fs::read_dir(dir).await {
        Ok(entries) => Ok(Some(entries)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(BackupError::StorageRead {
            path: dir.display().to_string(),
            source: e,
        }),
    }
}

async fn next_entry(
    entries: &mut tokio::fs::ReadDir,
    dir: &Path,
) -> Result<Option<tokio::fs::DirEntry>> {
    entries.next_entry().await.map_err(|e| BackupError::StorageRead {
        path: dir.display().to_string(),
        source: e,
    })
}

async fn read_backup(path: &Path, id: &str) -> Result<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BackupError::BackupNotFound {
            id: id.to_string(),
        }),
        Err(e) => Err(BackupError::StorageRead {
            path: path.display().to_string(),
            source: e,
        }),
    }
}

async fn read_info(path: &Path, id: &str) -> Result<BackupInfo> {
    let bytes = read_backup(path, id).await?;
    let snapshot = BackupManager::parse(&bytes, &path.display().to_string())?;
    Ok(BackupInfo::from_snapshot(&snapshot, bytes.len() as u64))
}

pub fn create_shared_backup_manager(manager: BackupManager) -> SharedBackupManager {
    Arc::new(manager)
}
