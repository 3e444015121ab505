/// Error types for backup and restore operations

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupError {
    /// Restore was asked for a container that has no metadata file
    #[error("no backup found for container '{0}'")]
    NoBackup(String),

    /// Docker daemon error (inspect/create/stop/start/run)
    #[error("docker engine error: {0}")]
    Engine(#[from] bollard::errors::Error),

    /// Backup directory I/O failure
    #[error("backup storage error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata file could not be serialized or parsed
    #[error("metadata error: {0}")]
    Json(#[from] serde_json::Error),

    /// The helper container ran but exited non-zero
    #[error("archive helper exited with status {code}")]
    Helper { code: i64 },

    /// Inspect response lacked a field the backup record needs
    #[error("container inspect response missing {0}")]
    MissingField(&'static str),
}

pub type Result<T> = std::result::Result<T, BackupError>;
