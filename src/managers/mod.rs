pub mod backup_manager;

pub use backup_manager::{create_shared_backup_manager, BackupManager, SharedBackupManager};
