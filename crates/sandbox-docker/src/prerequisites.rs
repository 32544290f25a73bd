use bollard::Docker;
use bollard::query_parameters::CreateImageOptions;
use futures_util::StreamExt;
use sandbox::SandboxError;
use tracing::{info, warn};

/// Verify the Docker daemon is reachable and report its version.
pub async fn check_prerequisites(docker: &Docker) -> Result<(), SandboxError> {
    docker
        .ping()
        .await
        .map_err(|e| SandboxError::BackendNotAvailable(format!("docker ping: {e}")))?;

    match docker.version().await {
        Ok(version) => info!(
            version = version.version.as_deref().unwrap_or("unknown"),
            api_version = version.api_version.as_deref().unwrap_or("unknown"),
            "docker daemon reachable"
        ),
        Err(e) => warn!(error = %e, "docker version query failed"),
    }
    Ok(())
}

/// Make sure `image` exists locally, pulling it if needed.
pub async fn ensure_image(docker: &Docker, image: &str) -> Result<(), SandboxError> {
    if docker.inspect_image(image).await.is_ok() {
        return Ok(());
    }

    info!(image, "pulling image");
    let options = CreateImageOptions {
        from_image: Some(image.to_string()),
        ..Default::default()
    };
    let mut stream = docker.create_image(Some(options), None, None);
    while let Some(progress) = stream.next().await {
        if let Err(e) = progress {
            return Err(SandboxError::CreationFailed(format!("pull {image}: {e}")));
        }
    }
    info!(image, "image pulled");
    Ok(())
}
