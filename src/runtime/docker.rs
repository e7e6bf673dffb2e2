// Docker implementation of the container runtime via bollard

mod stats;

use super::{
    ContainerRuntime, CreateSpec, EPHEMERAL_PORT_RANGE, LogStream, MemoryStream, UNKNOWN_EXIT_CODE,
};
use crate::error::BenchError;
use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{
    ContainerCreateBody, ContainerWaitResponse, HostConfig, NetworkCreateRequest,
};
use bollard::query_parameters::{
    CreateContainerOptions, InspectContainerOptions, ListNetworksOptions, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, StatsOptions, WaitContainerOptions,
};
use futures_util::StreamExt;
use std::collections::HashMap;

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect() -> Result<Self, BenchError> {
        let docker = Docker::connect_with_unix_defaults().map_err(classify)?;
        Ok(Self { docker })
    }

    /// Fails with `RuntimeUnavailable` when the daemon does not answer.
    pub async fn ping(&self) -> Result<(), BenchError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| BenchError::RuntimeUnavailable(e.to_string()))
    }
}

/// Maps bollard errors onto the harness taxonomy: transport failures mean the daemon is gone.
fn classify(e: bollard::errors::Error) -> BenchError {
    match e {
        bollard::errors::Error::IOError { .. }
        | bollard::errors::Error::HyperLegacyError { .. }
        | bollard::errors::Error::HyperResponseError { .. }
        | bollard::errors::Error::RequestTimeoutError
        | bollard::errors::Error::SocketNotFoundError(_) => {
            BenchError::RuntimeUnavailable(e.to_string())
        }
        other => BenchError::Runtime(other.to_string()),
    }
}

fn is_not_found(e: &bollard::errors::Error) -> bool {
    matches!(
        e,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// Exit status from the first item of a wait stream.
fn wait_status(
    id: &str,
    item: Option<Result<ContainerWaitResponse, bollard::errors::Error>>,
) -> Result<i64, BenchError> {
    match item {
        Some(Ok(response)) => Ok(response.status_code),
        // bollard reports a non-zero exit as an error carrying the code
        Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
        Some(Err(e)) if is_not_found(&e) => {
            tracing::warn!(container = %id, "container already removed, exit status lost");
            Ok(UNKNOWN_EXIT_CODE)
        }
        Some(Err(e)) => Err(classify(e)),
        None => Err(BenchError::Runtime(format!(
            "wait stream for container {} ended without a status",
            id
        ))),
    }
}

fn create_body(spec: &CreateSpec) -> ContainerCreateBody {
    let mut sysctls = HashMap::new();
    sysctls.insert(
        "net.ipv4.ip_local_port_range".to_string(),
        EPHEMERAL_PORT_RANGE.to_string(),
    );
    ContainerCreateBody {
        image: Some(spec.image.clone()),
        cmd: spec.cmd.clone(),
        host_config: Some(HostConfig {
            memory: spec.memory_limit_bytes,
            network_mode: Some(spec.network.clone()),
            sysctls: Some(sysctls),
            auto_remove: Some(spec.auto_remove),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_networks(&self, name: &str) -> Result<Vec<String>, BenchError> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![name.to_string()]);
        let options = ListNetworksOptions {
            filters: Some(filters),
        };
        let networks = self
            .docker
            .list_networks(Some(options))
            .await
            .map_err(classify)?;
        Ok(networks.into_iter().filter_map(|n| n.name).collect())
    }

    async fn create_network(&self, name: &str) -> Result<(), BenchError> {
        let request = NetworkCreateRequest {
            name: name.to_string(),
            ..Default::default()
        };
        self.docker.create_network(request).await.map_err(classify)?;
        Ok(())
    }

    async fn create_container(&self, spec: &CreateSpec) -> Result<String, BenchError> {
        let response = self
            .docker
            .create_container(None::<CreateContainerOptions>, create_body(spec))
            .await
            .map_err(classify)?;
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), BenchError> {
        self.docker
            .start_container(id, None::<StartContainerOptions>)
            .await
            .map_err(classify)
    }

    async fn network_address(
        &self,
        id: &str,
        network: &str,
    ) -> Result<Option<String>, BenchError> {
        let inspect = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(classify)?;
        Ok(inspect
            .network_settings
            .and_then(|s| s.networks)
            .and_then(|mut n| n.remove(network))
            .and_then(|endpoint| endpoint.ip_address)
            .filter(|ip| !ip.is_empty()))
    }

    fn logs(&self, id: &str) -> LogStream {
        let options = LogsOptions {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        };
        self.docker
            .logs(id, Some(options))
            .map(|chunk| chunk.map(|out| out.into_bytes()).map_err(classify))
            .boxed()
    }

    fn memory_usage(&self, id: &str) -> MemoryStream {
        let options = StatsOptions {
            stream: true,
            ..Default::default()
        };
        self.docker
            .stats(id, Some(options))
            .filter_map(|sample| async move {
                match sample {
                    Ok(s) => stats::memory_usage(&s).map(Ok),
                    Err(e) => Some(Err(classify(e))),
                }
            })
            .boxed()
    }

    async fn wait(&self, id: &str) -> Result<i64, BenchError> {
        // auto-removed containers: "not-running" races the removal
        let options = WaitContainerOptions {
            condition: "removed".to_string(),
        };
        let mut stream = self.docker.wait_container(id, Some(options));
        wait_status(id, stream.next().await)
    }

    async fn remove_container(&self, id: &str) -> Result<(), BenchError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            // auto-remove may have beaten us to it
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(BenchError::RemovalFailure {
                container: id.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}
