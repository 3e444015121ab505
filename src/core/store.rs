/// Backup storage layout
///
/// One directory tree per backup root:
///   {root}/containers/{name}.json   container metadata, one file per name
///   {root}/volumes/mount{N}.tar     volume archives, N is the 1-based
///                                   position of the mount at backup time

use regex::Regex;
use std::fs;
use std::path::PathBuf;

use crate::core::engine::InspectRecord;
use crate::core::error::{BackupError, Result};

#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn containers_dir(&self) -> PathBuf {
        self.root.join("containers")
    }

    pub fn volumes_dir(&self) -> PathBuf {
        self.root.join("volumes")
    }

    pub fn metadata_path(&self, name: &str) -> PathBuf {
        self.containers_dir().join(format!("{}.json", name))
    }

    pub fn archive_name(index: usize) -> String {
        format!("mount{}.tar", index)
    }

    /// Persist a container's inspect record as pretty JSON.
    ///
    /// Writes to a temp file and renames over the target, so a concurrent
    /// reader sees either the previous document or the new one, never a
    /// partial write. Re-backup replaces the file wholesale.
    pub fn write_metadata(&self, record: &InspectRecord) -> Result<()> {
        fs::create_dir_all(self.containers_dir())?;

        let path = self.metadata_path(&record.name);
        let tmp = path.with_extension("json.tmp");

        fs::write(&tmp, serde_json::to_string_pretty(record)?)?;
        fs::rename(&tmp, &path)?;

        Ok(())
    }

    /// Read back a stored inspect record; a missing file is the caller's
    /// precondition failure, not a plain I/O error.
    pub fn read_metadata(&self, name: &str) -> Result<InspectRecord> {
        let path = self.metadata_path(name);
        if !path.exists() {
            return Err(BackupError::NoBackup(name.to_string()));
        }

        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Names of containers with a stored metadata file, sorted.
    pub fn list_metadata(&self) -> Result<Vec<String>> {
        let dir = self.containers_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Filenames present in the volume archive area, sorted.
    pub fn list_archives(&self) -> Result<Vec<String>> {
        let dir = self.volumes_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&dir)? {
            if let Some(name) = entry?.file_name().to_str() {
                files.push(name.to_string());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Create the volume archive directory if needed and return its path.
    pub fn ensure_volumes_dir(&self) -> Result<PathBuf> {
        let dir = self.volumes_dir();
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// Parse the 1-based mount index out of an archive filename.
///
/// Returns None for anything that is not `mount{N}.tar` with N within the
/// current mount count; restore skips such files. The mapping is positional:
/// if a container's mounts were reordered since backup, the archives still
/// match by position and will land on the wrong mount.
pub fn archive_index(filename: &str, mount_count: usize) -> Option<usize> {
    let pattern = Regex::new(r"^mount([0-9]+)\.tar$").ok()?;
    let index: usize = pattern.captures(filename)?.get(1)?.as_str().parse().ok()?;

    if index >= 1 && index <= mount_count {
        Some(index)
    } else {
        None
    }
}
