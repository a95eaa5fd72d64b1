//! Container runtime access.
//!
//! [`ContainerRuntime`] is the seam between the reconciler and the daemon:
//! [`DockerRuntime`] talks to Docker through bollard, tests supply their own.

use portdump_core::{PortdumpError, Result, RuntimeConfig};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// One published port as the daemon reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedBinding {
    /// `"<port>/<proto>"`, e.g. `"80/tcp"`.
    pub container_port: String,
    pub host_ip: Option<String>,
    pub host_port: Option<String>,
}

/// What the reconciler needs from one running container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSnapshot {
    pub name: String,
    pub bindings: Vec<ObservedBinding>,
    /// Raw `KEY=VALUE` entries.
    pub env: Vec<String>,
}

pub trait ContainerRuntime: Send + Sync {
    /// Every running container with its bindings and environment.
    fn running_containers(&self) -> impl Future<Output = Result<Vec<ContainerSnapshot>>> + Send;
}

pub struct DockerRuntime {
    docker: Arc<bollard::Docker>,
}

impl DockerRuntime {
    /// Connect to the configured socket, or the platform default.
    pub fn connect(config: &RuntimeConfig) -> Result<Self> {
        let docker = match config.docker_socket.as_deref() {
            Some(socket) => bollard::Docker::connect_with_socket(socket, config.timeout_secs, bollard::API_DEFAULT_VERSION)
                .map_err(|e| PortdumpError::RuntimeUnavailable(format!("connect to {socket}: {e}")))?,
            None => bollard::Docker::connect_with_local_defaults()
                .map_err(|e| PortdumpError::RuntimeUnavailable(format!("connect to docker: {e}")))?,
        };
        Ok(DockerRuntime { docker: Arc::new(docker) })
    }

    async fn snapshot(&self, id: &str) -> Result<Option<ContainerSnapshot>> {
        let details = match self.docker.inspect_container(id, None).await {
            Ok(d) => d,
            // exited between list and inspect
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => {
                warn!(container = id, "container disappeared before inspection");
                return Ok(None);
            }
            Err(e) => return Err(PortdumpError::RuntimeUnavailable(format!("inspect {id}: {e}"))),
        };

        let name = details
            .name
            .map(|n| n.trim_start_matches('/').to_owned())
            .unwrap_or_else(|| id.to_owned());
        let env = details.config.and_then(|c| c.env).unwrap_or_default();
        let mut bindings = Vec::new();
        let ports = details.network_settings.and_then(|n| n.ports).unwrap_or_default();
        for (container_port, published) in ports {
            for binding in published.unwrap_or_default() {
                bindings.push(ObservedBinding {
                    container_port: container_port.clone(),
                    host_ip: binding.host_ip,
                    host_port: binding.host_port,
                });
            }
        }
        // the port map is unordered
        bindings.sort_by(|a, b| {
            (&a.container_port, &a.host_ip, &a.host_port).cmp(&(&b.container_port, &b.host_ip, &b.host_port))
        });
        Ok(Some(ContainerSnapshot { name, bindings, env }))
    }
}

impl ContainerRuntime for DockerRuntime {
    async fn running_containers(&self) -> Result<Vec<ContainerSnapshot>> {
        use bollard::container::ListContainersOptions;

        let options = ListContainersOptions::<String> { all: false, ..Default::default() };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| PortdumpError::RuntimeUnavailable(format!("list containers: {e}")))?;
        debug!(count = containers.len(), "running containers listed");

        let mut snapshots = Vec::with_capacity(containers.len());
        for container in containers {
            let Some(id) = container.id else { continue };
            if let Some(snapshot) = self.snapshot(&id).await? {
                snapshots.push(snapshot);
            }
        }
        Ok(snapshots)
    }
}
