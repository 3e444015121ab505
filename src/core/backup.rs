/// Backup and restore orchestration
///
/// A backup captures a container's inspect record and then archives each
/// volume mount with the container stopped. A restore recreates the
/// container from the stored record and unpacks whichever archives still
/// match its mounts, then always leaves the container running.
///
/// Every engine call is awaited in order; once stop has been issued the
/// pipeline is committed to reaching start or surfacing the failure with the
/// container left stopped. Concurrent calls against the same container name
/// interleave stop/start and must be serialized by the caller.

use std::sync::Arc;

use crate::core::archiver::VolumeArchiver;
use crate::core::engine::{ContainerEngine, CreateSpec, InspectRecord, MountEntry};
use crate::core::error::Result;
use crate::core::store::{archive_index, BackupStore};

/// Selects which of {configuration, volumes} an operation acts on. Both
/// flags false means both steps run. The flags are mutually exclusive in
/// intent; the CLI rejects combining them, the library does not check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopePolicy {
    pub only_containers: bool,
    pub only_volumes: bool,
}

impl ScopePolicy {
    fn config_step(&self) -> bool {
        !self.only_volumes
    }

    fn volume_step(&self) -> bool {
        !self.only_containers
    }
}

pub struct BackupManager {
    engine: Arc<dyn ContainerEngine>,
    store: BackupStore,
    archiver: VolumeArchiver,
}

impl BackupManager {
    pub fn new(engine: Arc<dyn ContainerEngine>, store: BackupStore) -> Self {
        let archiver = VolumeArchiver::new(engine.clone(), store.clone());
        Self {
            engine,
            store,
            archiver,
        }
    }

    /// Back up one container and return the name its backup was stored
    /// under.
    ///
    /// With no volume mounts there is nothing the stop/start bracket would
    /// keep consistent, so the container is left untouched and only the
    /// metadata step runs.
    pub async fn backup_container(&self, id: &str, scope: ScopePolicy) -> Result<String> {
        let record = self.engine.inspect(id).await?;

        if scope.config_step() {
            self.store.write_metadata(&record)?;
        }

        if scope.volume_step() && !record.mounts.is_empty() {
            // A failure between stop and start surfaces to the caller and
            // leaves the container stopped; operator intervention territory.
            self.engine.stop(&record.name).await?;
            for (position, mount) in record.mounts.iter().enumerate() {
                self.archiver
                    .archive(&record.name, position + 1, mount)
                    .await?;
            }
            self.engine.start(&record.name).await?;
        }

        Ok(record.name)
    }

    /// Back up every container the engine knows about, running and stopped.
    /// One container failing does not abort the sweep; each outcome is
    /// reported against the id the engine listed.
    pub async fn backup_all(&self, scope: ScopePolicy) -> Result<Vec<(String, Result<String>)>> {
        let ids = self.engine.list_containers().await?;

        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            let result = self.backup_container(&id, scope).await;
            outcomes.push((id, result));
        }

        Ok(outcomes)
    }

    /// Recreate a container from its stored metadata and repopulate its
    /// volumes from the stored archives.
    ///
    /// The stop before unpacking only happens when the record says the
    /// container was running and at least one archive matches. The final
    /// start is unconditional: a restore invocation always hands back a
    /// running container, even when the record was captured stopped.
    pub async fn restore_container(&self, name: &str, scope: ScopePolicy) -> Result<()> {
        let record = self.store.read_metadata(name)?;

        if scope.config_step() {
            self.engine.create(&Self::create_spec(name, &record)).await?;
        }

        if scope.volume_step() {
            let targets = self.matched_archives(&record)?;

            if !targets.is_empty() && record.running {
                self.engine.stop(name).await?;
            }
            for (index, mount) in &targets {
                self.archiver.restore(name, *index, mount).await?;
            }
        }

        self.engine.start(name).await?;
        Ok(())
    }

    fn create_spec(name: &str, record: &InspectRecord) -> CreateSpec {
        CreateSpec {
            name: name.to_string(),
            image: record.image.clone(),
            network_mode: record.network_mode.clone(),
            binds: record
                .mounts
                .iter()
                .map(|m| format!("{}:{}", m.source, m.destination))
                .collect(),
            volumes: record.mounts.iter().map(|m| m.destination.clone()).collect(),
        }
    }

    /// Pair stored archive files with the record's mounts by position.
    /// Filenames that fit no current mount index are skipped.
    fn matched_archives(&self, record: &InspectRecord) -> Result<Vec<(usize, MountEntry)>> {
        let mut matched = Vec::new();
        for file in self.store.list_archives()? {
            if let Some(index) = archive_index(&file, record.mounts.len()) {
                matched.push((index, record.mounts[index - 1].clone()));
            }
        }
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::MockContainerEngine;
    use crate::core::error::BackupError;
    use mockall::Sequence;
    use tempfile::TempDir;

    fn mount(source: &str, destination: &str) -> MountEntry {
        MountEntry {
            source: source.to_string(),
            destination: destination.to_string(),
        }
    }

    fn record(name: &str, running: bool, mounts: Vec<MountEntry>) -> InspectRecord {
        InspectRecord {
            name: name.to_string(),
            image: "mock/image".to_string(),
            network_mode: "mockMode".to_string(),
            running,
            mounts,
        }
    }

    fn manager(engine: MockContainerEngine, dir: &TempDir) -> BackupManager {
        BackupManager::new(Arc::new(engine), BackupStore::new(dir.path()))
    }

    fn store_archives(dir: &TempDir, files: &[&str]) {
        let volumes = dir.path().join("volumes");
        std::fs::create_dir_all(&volumes).unwrap();
        for file in files {
            std::fs::write(volumes.join(file), "tar").unwrap();
        }
    }

    #[tokio::test]
    async fn test_backup_with_no_mounts_skips_stop_and_archive() {
        let dir = TempDir::new().unwrap();
        let rec = record("banana", true, vec![]);

        let mut engine = MockContainerEngine::new();
        engine
            .expect_inspect()
            .withf(|id| id == "3")
            .times(1)
            .returning(move |_| Ok(rec.clone()));
        engine.expect_stop().times(0);
        engine.expect_start().times(0);
        engine.expect_run_helper().times(0);

        let manager = manager(engine, &dir);
        let name = manager
            .backup_container("3", ScopePolicy::default())
            .await
            .unwrap();

        assert_eq!(name, "banana");
        assert!(dir.path().join("containers/banana.json").exists());
    }

    #[tokio::test]
    async fn test_backup_archives_each_mount_in_order() {
        let dir = TempDir::new().unwrap();
        let rec = record(
            "banana",
            true,
            vec![mount("vol1", "dest1"), mount("vol2", "dest2")],
        );

        let mut seq = Sequence::new();
        let mut engine = MockContainerEngine::new();
        engine
            .expect_inspect()
            .withf(|id| id == "3")
            .times(1)
            .returning(move |_| Ok(rec.clone()));
        engine
            .expect_stop()
            .withf(|name| name == "banana")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        engine
            .expect_run_helper()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|image, cmd, host| {
                image == "ubuntu"
                    && cmd == &["tar", "cvf", "/__volume_backup_mount__/mount1.tar", "dest1"]
                    && host.volumes_from == vec!["banana".to_string()]
            })
            .returning(|_, _, _| Ok(0));
        engine
            .expect_run_helper()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|_, cmd, host| {
                cmd == &["tar", "cvf", "/__volume_backup_mount__/mount2.tar", "dest2"]
                    && host.volumes_from == vec!["banana".to_string()]
            })
            .returning(|_, _, _| Ok(0));
        engine
            .expect_start()
            .withf(|name| name == "banana")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let manager = manager(engine, &dir);
        manager
            .backup_container("3", ScopePolicy::default())
            .await
            .unwrap();

        assert!(dir.path().join("containers/banana.json").exists());
    }

    #[tokio::test]
    async fn test_backup_volumes_only_writes_no_metadata() {
        let dir = TempDir::new().unwrap();
        let rec = record(
            "banana",
            true,
            vec![mount("vol1", "dest1"), mount("vol2", "dest2")],
        );

        let mut engine = MockContainerEngine::new();
        engine.expect_inspect().returning(move |_| Ok(rec.clone()));
        engine.expect_stop().times(1).returning(|_| Ok(()));
        engine.expect_start().times(1).returning(|_| Ok(()));
        engine
            .expect_run_helper()
            .times(2)
            .returning(|_, _, _| Ok(0));

        let manager = manager(engine, &dir);
        let scope = ScopePolicy {
            only_volumes: true,
            ..Default::default()
        };
        manager.backup_container("3", scope).await.unwrap();

        assert!(!dir.path().join("containers/banana.json").exists());
    }

    #[tokio::test]
    async fn test_backup_containers_only_skips_volume_step() {
        let dir = TempDir::new().unwrap();
        let rec = record(
            "banana",
            true,
            vec![mount("vol1", "dest1"), mount("vol2", "dest2")],
        );

        let mut engine = MockContainerEngine::new();
        engine.expect_inspect().returning(move |_| Ok(rec.clone()));
        engine.expect_stop().times(0);
        engine.expect_start().times(0);
        engine.expect_run_helper().times(0);

        let manager = manager(engine, &dir);
        let scope = ScopePolicy {
            only_containers: true,
            ..Default::default()
        };
        manager.backup_container("3", scope).await.unwrap();

        assert!(dir.path().join("containers/banana.json").exists());
    }

    #[tokio::test]
    async fn test_backup_failure_after_stop_leaves_container_stopped() {
        let dir = TempDir::new().unwrap();
        let rec = record("banana", true, vec![mount("vol1", "dest1")]);

        let mut engine = MockContainerEngine::new();
        engine.expect_inspect().returning(move |_| Ok(rec.clone()));
        engine.expect_stop().times(1).returning(|_| Ok(()));
        engine
            .expect_run_helper()
            .times(1)
            .returning(|_, _, _| Ok(2));
        // no start: the pipeline aborts on the failed archive step
        engine.expect_start().times(0);

        let manager = manager(engine, &dir);
        let err = manager
            .backup_container("3", ScopePolicy::default())
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::Helper { code: 2 }));
    }

    #[tokio::test]
    async fn test_backup_all_reports_per_container_outcomes() {
        let dir = TempDir::new().unwrap();

        let mut engine = MockContainerEngine::new();
        engine
            .expect_list_containers()
            .times(1)
            .returning(|| Ok(vec!["1".to_string(), "2".to_string()]));
        engine.expect_inspect().times(2).returning(|id| {
            if id == "1" {
                Ok(record("apple", false, vec![]))
            } else {
                Err(BackupError::MissingField("image"))
            }
        });

        let manager = manager(engine, &dir);
        let outcomes = manager.backup_all(ScopePolicy::default()).await.unwrap();

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].0, "1");
        assert_eq!(outcomes[0].1.as_deref().unwrap(), "apple");
        assert!(outcomes[1].1.is_err());
        assert!(dir.path().join("containers/apple.json").exists());
    }

    #[tokio::test]
    async fn test_restore_builds_create_request_from_metadata() {
        let dir = TempDir::new().unwrap();
        let rec = record(
            "orange",
            true,
            vec![mount("mount1", "dest1"), mount("mount2", "dest2")],
        );

        let store = BackupStore::new(dir.path());
        store.write_metadata(&rec).unwrap();

        let mut engine = MockContainerEngine::new();
        engine
            .expect_create()
            .times(1)
            .withf(|spec| {
                spec.name == "orange"
                    && spec.image == "mock/image"
                    && spec.network_mode == "mockMode"
                    && spec.binds == ["mount1:dest1", "mount2:dest2"]
                    && spec.volumes == ["dest1", "dest2"]
            })
            .returning(|_| Ok("cid".to_string()));
        // no archives stored, so the volume step is a no-op but the final
        // start still runs
        engine.expect_stop().times(0);
        engine.expect_run_helper().times(0);
        engine
            .expect_start()
            .withf(|name| name == "orange")
            .times(1)
            .returning(|_| Ok(()));

        let manager = manager(engine, &dir);
        manager
            .restore_container("orange", ScopePolicy::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_restore_unpacks_matching_archives_with_stop_start() {
        let dir = TempDir::new().unwrap();
        let rec = record(
            "orange",
            true,
            vec![mount("mount1", "dest1"), mount("mount2", "dest2")],
        );

        let store = BackupStore::new(dir.path());
        store.write_metadata(&rec).unwrap();
        store_archives(&dir, &["mount1.tar", "mount2.tar"]);

        let mut seq = Sequence::new();
        let mut engine = MockContainerEngine::new();
        engine
            .expect_create()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("cid".to_string()));
        engine
            .expect_stop()
            .withf(|name| name == "orange")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        engine
            .expect_run_helper()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|_, cmd, _| {
                cmd == &[
                    "tar",
                    "xvf",
                    "/__volume_backup_mount__/mount1.tar",
                    "--strip",
                    "1",
                    "--directory",
                    "dest1",
                ]
            })
            .returning(|_, _, _| Ok(0));
        engine
            .expect_run_helper()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|_, cmd, host| {
                cmd == &[
                    "tar",
                    "xvf",
                    "/__volume_backup_mount__/mount2.tar",
                    "--strip",
                    "1",
                    "--directory",
                    "dest2",
                ] && host.volumes_from == vec!["orange".to_string()]
            })
            .returning(|_, _, _| Ok(0));
        engine
            .expect_start()
            .withf(|name| name == "orange")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let manager = manager(engine, &dir);
        manager
            .restore_container("orange", ScopePolicy::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_restore_ignores_unmatched_archives() {
        let dir = TempDir::new().unwrap();
        let rec = record(
            "orange",
            true,
            vec![mount("mount1", "dest1"), mount("mount2", "dest2")],
        );

        let store = BackupStore::new(dir.path());
        store.write_metadata(&rec).unwrap();
        store_archives(&dir, &["banana.tar", "mango.tar", "mount9.tar"]);

        let mut engine = MockContainerEngine::new();
        engine.expect_create().times(0);
        engine.expect_stop().times(0);
        engine.expect_run_helper().times(0);
        engine.expect_start().times(1).returning(|_| Ok(()));

        let manager = manager(engine, &dir);
        let scope = ScopePolicy {
            only_volumes: true,
            ..Default::default()
        };
        manager.restore_container("orange", scope).await.unwrap();
    }

    #[tokio::test]
    async fn test_restore_volumes_only_never_creates() {
        let dir = TempDir::new().unwrap();
        let rec = record(
            "orange",
            true,
            vec![mount("mount1", "dest1"), mount("mount2", "dest2")],
        );

        let store = BackupStore::new(dir.path());
        store.write_metadata(&rec).unwrap();
        store_archives(&dir, &["mount1.tar", "mount2.tar"]);

        let mut engine = MockContainerEngine::new();
        engine.expect_create().times(0);
        engine.expect_stop().times(1).returning(|_| Ok(()));
        engine
            .expect_run_helper()
            .times(2)
            .returning(|_, _, _| Ok(0));
        engine.expect_start().times(1).returning(|_| Ok(()));

        let manager = manager(engine, &dir);
        let scope = ScopePolicy {
            only_volumes: true,
            ..Default::default()
        };
        manager.restore_container("orange", scope).await.unwrap();
    }

    #[tokio::test]
    async fn test_restore_containers_only_never_unpacks() {
        let dir = TempDir::new().unwrap();
        let rec = record("orange", true, vec![mount("mount1", "dest1")]);

        let store = BackupStore::new(dir.path());
        store.write_metadata(&rec).unwrap();
        store_archives(&dir, &["mount1.tar"]);

        let mut engine = MockContainerEngine::new();
        engine
            .expect_create()
            .times(1)
            .returning(|_| Ok("cid".to_string()));
        engine.expect_stop().times(0);
        engine.expect_run_helper().times(0);
        engine.expect_start().times(1).returning(|_| Ok(()));

        let manager = manager(engine, &dir);
        let scope = ScopePolicy {
            only_containers: true,
            ..Default::default()
        };
        manager.restore_container("orange", scope).await.unwrap();
    }

    #[tokio::test]
    async fn test_restore_stopped_record_still_starts() {
        let dir = TempDir::new().unwrap();
        let rec = record(
            "orange",
            false,
            vec![mount("mount1", "dest1"), mount("mount2", "dest2")],
        );

        let store = BackupStore::new(dir.path());
        store.write_metadata(&rec).unwrap();
        store_archives(&dir, &["mount1.tar", "mount2.tar"]);

        let mut engine = MockContainerEngine::new();
        engine
            .expect_create()
            .times(1)
            .returning(|_| Ok("cid".to_string()));
        // record was captured stopped, so no stop even though archives match
        engine.expect_stop().times(0);
        engine
            .expect_run_helper()
            .times(2)
            .returning(|_, _, _| Ok(0));
        engine.expect_start().times(1).returning(|_| Ok(()));

        let manager = manager(engine, &dir);
        manager
            .restore_container("orange", ScopePolicy::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_restore_without_metadata_fails() {
        let dir = TempDir::new().unwrap();
        let engine = MockContainerEngine::new();

        let manager = manager(engine, &dir);
        let err = manager
            .restore_container("ghost", ScopePolicy::default())
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::NoBackup(name) if name == "ghost"));
    }
}
