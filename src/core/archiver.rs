/// Volume archiving via short-lived helper containers
///
/// tar never runs on the host: each archive or restore operation launches a
/// throwaway container that shares the target container's volumes
/// (volumes-from) and bind-mounts the host archive directory at a fixed
/// in-container path. The helper auto-removes itself on exit.

use std::sync::Arc;

use crate::core::engine::{ContainerEngine, HelperHostConfig, MountEntry};
use crate::core::error::{BackupError, Result};
use crate::core::store::BackupStore;

/// Image the helper container runs; only needs a tar binary.
pub const HELPER_IMAGE: &str = "ubuntu";

/// Where the host archive directory appears inside the helper.
pub const ARCHIVE_MOUNT_POINT: &str = "/__volume_backup_mount__";

pub struct VolumeArchiver {
    engine: Arc<dyn ContainerEngine>,
    store: BackupStore,
}

impl VolumeArchiver {
    pub fn new(engine: Arc<dyn ContainerEngine>, store: BackupStore) -> Self {
        Self { engine, store }
    }

    /// Pack the mount's destination directory into `mount{index}.tar`,
    /// replacing any archive already stored at that index.
    pub async fn archive(&self, container: &str, index: usize, mount: &MountEntry) -> Result<()> {
        self.store.ensure_volumes_dir()?;

        let cmd = vec![
            "tar".to_string(),
            "cvf".to_string(),
            Self::archive_path(index),
            mount.destination.clone(),
        ];

        self.run(container, cmd).await
    }

    /// Unpack `mount{index}.tar` into the mount's destination directory,
    /// stripping the one leading path component the archive step recorded.
    pub async fn restore(&self, container: &str, index: usize, mount: &MountEntry) -> Result<()> {
        let cmd = vec![
            "tar".to_string(),
            "xvf".to_string(),
            Self::archive_path(index),
            "--strip".to_string(),
            "1".to_string(),
            "--directory".to_string(),
            mount.destination.clone(),
        ];

        self.run(container, cmd).await
    }

    fn archive_path(index: usize) -> String {
        format!("{}/{}", ARCHIVE_MOUNT_POINT, BackupStore::archive_name(index))
    }

    fn host_config(&self, container: &str) -> HelperHostConfig {
        HelperHostConfig {
            binds: vec![format!(
                "{}:{}",
                self.store.volumes_dir().display(),
                ARCHIVE_MOUNT_POINT
            )],
            volumes_from: vec![container.to_string()],
        }
    }

    async fn run(&self, container: &str, cmd: Vec<String>) -> Result<()> {
        let status = self
            .engine
            .run_helper(HELPER_IMAGE, cmd, self.host_config(container))
            .await?;

        if status != 0 {
            return Err(BackupError::Helper { code: status });
        }
        Ok(())
    }
}
