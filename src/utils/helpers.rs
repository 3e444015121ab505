/// Helper utilities for the volback CLI

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::time::SystemTime;

use crate::utils::AppConfig;

/// Resolve the backup root directory.
///
/// Precedence: explicit --directory flag, then the VOLBACK_DIR environment
/// variable, then the saved configuration, then ~/.volback.
pub fn resolve_backup_root(flag: Option<PathBuf>) -> Result<PathBuf> {
    // 1. Explicit flag wins
    if let Some(dir) = flag {
        return Ok(dir);
    }

    // 2. Environment variable
    if let Ok(dir) = std::env::var("VOLBACK_DIR") {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    // 3. Saved configuration
    if let Ok(config) = AppConfig::load() {
        if let Some(root) = config.backup_root {
            return Ok(PathBuf::from(root));
        }
    }

    // 4. Default under the home directory
    let home = dirs::home_dir().context("Failed to determine home directory")?;
    Ok(home.join(".volback"))
}

/// Format a filesystem timestamp for table output
pub fn format_timestamp(time: SystemTime) -> String {
    let datetime: DateTime<Local> = time.into();
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Format bytes to human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let bytes = bytes as f64;
    if bytes >= GB {
        format!("{:.2} GB", bytes / GB)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes / MB)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes / KB)
    } else {
        format!("{} B", bytes)
    }
}
