use std::collections::HashMap;

use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
};
use sandbox::{NetworkPolicy, Sandbox, SandboxConfig, SandboxError, SandboxFactory};
use tracing::{info, warn};

use crate::config::DockerConfig;
use crate::prerequisites;
use crate::sandbox::{DockerSandbox, is_benign_conflict};

/// Label attached to every container this factory creates. Its value is the sandbox id.
pub const SANDBOX_LABEL: &str = "codexec.sandbox";

pub struct DockerFactory {
    config: DockerConfig,
    docker: Docker,
    started: bool,
}

impl DockerFactory {
    /// Create a new factory from the local Docker defaults (socket or `DOCKER_HOST`).
    /// No request is made until `startup()`.
    pub fn new(config: DockerConfig) -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| SandboxError::BackendNotAvailable(format!("docker client: {e}")))?;
        Ok(Self {
            config,
            docker,
            started: false,
        })
    }

    /// Force-remove containers left behind by a previous crashed process.
    async fn sweep_stale(&self) {
        let filters = HashMap::from([("label".to_string(), vec![SANDBOX_LABEL.to_string()])]);
        let options = ListContainersOptions {
            all: true,
            filters: Some(filters),
            ..Default::default()
        };
        let stale = match self.docker.list_containers(Some(options)).await {
            Ok(containers) => containers,
            Err(e) => {
                warn!(error = %e, "failed to list stale sandboxes");
                return;
            }
        };
        for container in stale {
            if let Some(id) = container.id {
                warn!(container_id = %id, "removing stale sandbox");
                self.remove(&id).await;
            }
        }
    }

    /// Force-remove a container by id or name, ignoring "already gone".
    async fn remove(&self, container: &str) {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        match self.docker.remove_container(container, Some(options)).await {
            Ok(()) => {}
            Err(e) if is_benign_conflict(&e) => {}
            Err(e) => warn!(container, error = %e, "failed to remove container"),
        }
    }
}

/// Container definition with every resource ceiling applied at creation.
fn container_body(docker_config: &DockerConfig, config: &SandboxConfig) -> ContainerCreateBody {
    let isolated = config.network == NetworkPolicy::Isolated;
    let memory = config.resources.memory_bytes();

    ContainerCreateBody {
        image: Some(config.image.clone()),
        cmd: Some(config.command.clone()),
        env: Some(config.env.clone()),
        labels: Some(HashMap::from([(
            SANDBOX_LABEL.to_string(),
            config.id.to_string(),
        )])),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        tty: Some(false),
        network_disabled: Some(isolated),
        host_config: Some(HostConfig {
            memory: Some(memory),
            // Equal to `memory` so the sandbox cannot spill into swap.
            memory_swap: Some(memory),
            nano_cpus: config.resources.nano_cpus(),
            pids_limit: docker_config.pids_limit,
            network_mode: isolated.then(|| "none".to_string()),
            // Removal is explicit so logs survive until collected.
            auto_remove: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl SandboxFactory for DockerFactory {
    fn name(&self) -> &str {
        "docker"
    }

    async fn startup(&mut self) -> sandbox::Result<()> {
        if self.started {
            return Err(SandboxError::CreationFailed(
                "factory already started".into(),
            ));
        }

        prerequisites::check_prerequisites(&self.docker).await?;
        if self.config.sweep_stale {
            self.sweep_stale().await;
        }

        self.started = true;
        info!(pull_images = self.config.pull_images, "factory started");
        Ok(())
    }

    async fn create(&self, config: SandboxConfig) -> sandbox::Result<Box<dyn Sandbox>> {
        let id = config.id.to_string();
        let name = format!("{}{id}", self.config.name_prefix);

        if self.config.pull_images {
            prerequisites::ensure_image(&self.docker, &config.image).await?;
        }

        let options = CreateContainerOptions {
            name: Some(name.clone()),
            ..Default::default()
        };
        let body = container_body(&self.config, &config);

        let created = match self.docker.create_container(Some(options), body).await {
            Ok(created) => created,
            Err(e) => {
                // The daemon may have created the container before the request failed.
                self.remove(&name).await;
                return Err(SandboxError::CreationFailed(format!(
                    "create container: {e}"
                )));
            }
        };

        for warning in &created.warnings {
            warn!(id = %id, "{warning}");
        }
        info!(id = %id, container_id = %created.id, image = %config.image, "sandbox created");

        Ok(Box::new(DockerSandbox::new(
            self.docker.clone(),
            id,
            created.id,
            self.config.max_output_bytes,
        )))
    }

    async fn destroy(&self, sandbox: Box<dyn Sandbox>) {
        let mut sandbox = match (sandbox as Box<dyn std::any::Any>).downcast::<DockerSandbox>() {
            Ok(s) => *s,
            Err(_) => {
                warn!("destroy called with non-docker sandbox, ignoring");
                return;
            }
        };

        if let Err(e) = sandbox.kill().await {
            warn!(id = %sandbox.id, error = %e, "kill before remove failed");
        }
        self.remove(&sandbox.container_id).await;

        info!(id = %sandbox.id, "sandbox destroyed");
    }

    async fn shutdown(&mut self) {
        if self.started && self.config.sweep_stale {
            self.sweep_stale().await;
        }
        self.started = false;
        info!("factory shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandbox::ResourceLimits;

    fn sandbox_config(cpu_count: Option<f64>) -> SandboxConfig {
        SandboxConfig {
            id: uuid::Uuid::nil(),
            image: "python:3.9".into(),
            command: vec!["python".into(), "-c".into(), "print(1)".into()],
            env: vec!["CODE=print(1)".into()],
            resources: ResourceLimits {
                memory_mb: 250,
                cpu_count,
            },
            network: NetworkPolicy::Isolated,
        }
    }

    #[test]
    fn container_body_applies_limits_at_creation() {
        let body = container_body(&DockerConfig::default(), &sandbox_config(Some(1.5)));
        let host = body.host_config.unwrap();

        assert_eq!(body.image.as_deref(), Some("python:3.9"));
        assert_eq!(body.network_disabled, Some(true));
        assert_eq!(host.memory, Some(250 * 1024 * 1024));
        assert_eq!(host.memory_swap, host.memory);
        assert_eq!(host.nano_cpus, Some(1_500_000_000));
        assert_eq!(host.network_mode.as_deref(), Some("none"));
        assert_eq!(host.auto_remove, Some(false));
        assert_eq!(host.pids_limit, Some(crate::config::DEFAULT_PIDS_LIMIT));
    }

    #[test]
    fn container_body_is_labelled_with_sandbox_id() {
        let body = container_body(&DockerConfig::default(), &sandbox_config(None));
        let labels = body.labels.unwrap();
        assert_eq!(
            labels.get(SANDBOX_LABEL).map(String::as_str),
            Some("00000000-0000-0000-0000-000000000000")
        );
        assert_eq!(body.host_config.unwrap().nano_cpus, None);
    }
}
