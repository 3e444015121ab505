/// Docker Engine gateway
///
/// Wraps the bollard client behind the ContainerEngine trait so the
/// orchestration logic can be exercised against a mock engine in tests.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, StartContainerOptions,
    StopContainerOptions, WaitContainerOptions,
};
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::error::{BackupError, Result};

/// One volume mount of a container: host source and in-container destination.
///
/// The position of an entry in `InspectRecord::mounts` is what names its
/// archive file, so the order captured here must not be rearranged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountEntry {
    pub source: String,
    pub destination: String,
}

/// Configuration snapshot taken at backup time; everything restore needs to
/// recreate the container. Persisted verbatim as the metadata file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectRecord {
    pub name: String,
    pub image: String,
    pub network_mode: String,
    pub running: bool,
    pub mounts: Vec<MountEntry>,
}

/// Creation request assembled from a saved InspectRecord.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSpec {
    pub name: String,
    pub image: String,
    pub network_mode: String,
    /// `source:destination` bind strings, in mount order
    pub binds: Vec<String>,
    /// destination paths declared as volumes on the new container
    pub volumes: Vec<String>,
}

/// Host-side wiring for a helper container run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperHostConfig {
    pub binds: Vec<String>,
    pub volumes_from: Vec<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Ids of all containers known to the engine, running or not
    async fn list_containers(&self) -> Result<Vec<String>>;

    /// Capture a container's configuration snapshot
    async fn inspect(&self, id: &str) -> Result<InspectRecord>;

    /// Create a container and return its id
    async fn create(&self, spec: &CreateSpec) -> Result<String>;

    async fn stop(&self, name: &str) -> Result<()>;

    async fn start(&self, name: &str) -> Result<()>;

    /// Run a throwaway container to completion and return its exit status.
    /// The container is removed by the engine once it exits.
    async fn run_helper(
        &self,
        image: &str,
        cmd: Vec<String>,
        host: HelperHostConfig,
    ) -> Result<i64>;
}

/// Production engine backed by the local Docker daemon.
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    pub fn new() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn list_containers(&self) -> Result<Vec<String>> {
        let options = Some(ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        });

        let containers = self.docker.list_containers(options).await?;
        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }

    async fn inspect(&self, id: &str) -> Result<InspectRecord> {
        let inspect = self.docker.inspect_container(id, None).await?;

        // Docker reports names with a leading slash
        let name = inspect
            .name
            .as_deref()
            .map(|n| n.trim_start_matches('/').to_string())
            .ok_or(BackupError::MissingField("name"))?;

        let image = inspect
            .config
            .as_ref()
            .and_then(|c| c.image.clone())
            .ok_or(BackupError::MissingField("image"))?;

        let network_mode = inspect
            .host_config
            .as_ref()
            .and_then(|hc| hc.network_mode.clone())
            .unwrap_or_else(|| "default".to_string());

        let running = inspect
            .state
            .as_ref()
            .and_then(|s| s.running)
            .unwrap_or(false);

        let mounts = inspect
            .mounts
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| match (m.source, m.destination) {
                (Some(source), Some(destination)) => Some(MountEntry { source, destination }),
                _ => None,
            })
            .collect();

        Ok(InspectRecord {
            name,
            image,
            network_mode,
            running,
            mounts,
        })
    }

    async fn create(&self, spec: &CreateSpec) -> Result<String> {
        let volumes: HashMap<String, HashMap<(), ()>> = spec
            .volumes
            .iter()
            .map(|dest| (dest.clone(), HashMap::new()))
            .collect();

        let host_config = HostConfig {
            binds: Some(spec.binds.clone()),
            network_mode: Some(spec.network_mode.clone()),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            volumes: Some(volumes),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        let response = self.docker.create_container(Some(options), config).await?;
        Ok(response.id)
    }

    async fn stop(&self, name: &str) -> Result<()> {
        self.docker
            .stop_container(name, None::<StopContainerOptions>)
            .await?;
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn run_helper(
        &self,
        image: &str,
        cmd: Vec<String>,
        host: HelperHostConfig,
    ) -> Result<i64> {
        let host_config = HostConfig {
            auto_remove: Some(true),
            binds: Some(host.binds),
            volumes_from: Some(host.volumes_from),
            ..Default::default()
        };

        let config = Config {
            image: Some(image.to_string()),
            cmd: Some(cmd),
            host_config: Some(host_config),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await?;

        // Subscribe to the wait stream before starting so a fast-exiting
        // helper is not missed, then block until it finishes
        let mut wait = self
            .docker
            .wait_container(&created.id, None::<WaitContainerOptions<String>>);

        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await?;

        match wait.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit as a wait error carrying the code
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(e.into()),
            None => Ok(0),
        }
    }
}
