//! Tests against a live Docker daemon. Run with `cargo test -- --ignored`.

use std::time::Duration;

use bollard::Docker;
use bollard::query_parameters::InspectContainerOptions;
use sandbox::{NetworkPolicy, ResourceLimits, SandboxConfig, SandboxFactory};
use sandbox_docker::{DockerConfig, DockerFactory};

fn python_config(code: &str) -> SandboxConfig {
    SandboxConfig {
        id: uuid::Uuid::new_v4(),
        image: "python:3.9".into(),
        command: vec![
            "sh".into(),
            "-c".into(),
            r#"printf '%s' "$CODE" > /tmp/main.py && exec python /tmp/main.py"#.into(),
        ],
        env: vec![format!("CODE={code}")],
        resources: ResourceLimits {
            memory_mb: 250,
            cpu_count: None,
        },
        network: NetworkPolicy::Isolated,
    }
}

async fn started_factory() -> DockerFactory {
    // Leave containers owned by a running service on the same daemon alone.
    let mut factory = DockerFactory::new(DockerConfig {
        sweep_stale: false,
        ..DockerConfig::default()
    })
    .unwrap();
    factory.startup().await.unwrap();
    factory
}

async fn container_exists(container_id: &str) -> bool {
    let docker = Docker::connect_with_local_defaults().unwrap();
    docker
        .inspect_container(container_id, None::<InspectContainerOptions>)
        .await
        .is_ok()
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn python_prints_and_exits_zero() {
    let factory = started_factory().await;
    let mut sandbox = factory.create(python_config("print(1+1)")).await.unwrap();
    sandbox.start().await.unwrap();

    let code = sandbox.wait().await.unwrap();
    let output = sandbox.logs().await.unwrap();
    factory.destroy(sandbox).await;

    assert_eq!(code, 0);
    assert!(output.contains('2'), "output: {output:?}");
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn non_zero_exit_is_reported_not_an_error() {
    let factory = started_factory().await;
    let mut sandbox = factory
        .create(python_config("import sys; sys.exit(3)"))
        .await
        .unwrap();
    sandbox.start().await.unwrap();

    let code = sandbox.wait().await.unwrap();
    factory.destroy(sandbox).await;

    assert_eq!(code, 3);
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn killed_sandbox_is_removed() {
    let factory = started_factory().await;
    let mut sandbox = factory
        .create(python_config("import time; time.sleep(30)"))
        .await
        .unwrap();
    sandbox.start().await.unwrap();

    let waited = tokio::time::timeout(Duration::from_secs(2), sandbox.wait()).await;
    assert!(waited.is_err(), "sleeping sandbox should not exit early");

    sandbox.kill().await.unwrap();
    let docker_sandbox = (sandbox as Box<dyn std::any::Any>)
        .downcast::<sandbox_docker::DockerSandbox>()
        .unwrap();
    let container_id = docker_sandbox.container_id().to_string();
    factory.destroy(docker_sandbox).await;

    assert!(!container_exists(&container_id).await);
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn network_is_disabled() {
    let factory = started_factory().await;
    let code = "import socket\ntry:\n    socket.create_connection(('1.1.1.1', 53), timeout=1)\n    print('online')\nexcept OSError:\n    print('offline')";
    let mut sandbox = factory.create(python_config(code)).await.unwrap();
    sandbox.start().await.unwrap();

    sandbox.wait().await.unwrap();
    let output = sandbox.logs().await.unwrap();
    factory.destroy(sandbox).await;

    assert!(output.contains("offline"), "output: {output:?}");
}
