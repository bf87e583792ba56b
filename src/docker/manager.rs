// Docker Manager - container operations behind the management commands

use bollard::container::{
    InspectContainerOptions, LogOutput, LogsOptions, RestartContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::ContainerStateStatusEnum;
use bollard::Docker;
use futures_util::stream::StreamExt;
use serde::Serialize;
use thiserror::Error;

/// Seconds a server gets to shut down before it is killed.
const STOP_TIMEOUT_SECS: i64 = 30;

#[derive(Error, Debug)]
pub enum DockerError {
    #[error("Docker connection error: {0}")]
    ConnectionError(#[from] bollard::errors::Error),

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Image pull failed: {0}")]
    ImagePullFailed(String),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Running,
    Starting,
    Stopping,
    Stopped,
    Missing,
    Error,
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ServerStatus::Running => "running",
            ServerStatus::Starting => "starting",
            ServerStatus::Stopping => "stopping",
            ServerStatus::Stopped => "stopped",
            ServerStatus::Missing => "missing",
            ServerStatus::Error => "error",
        };
        write!(f, "{}", label)
    }
}

impl From<Option<ContainerStateStatusEnum>> for ServerStatus {
    fn from(status: Option<ContainerStateStatusEnum>) -> Self {
        match status {
            Some(ContainerStateStatusEnum::RUNNING) => ServerStatus::Running,
            Some(ContainerStateStatusEnum::CREATED) => ServerStatus::Stopped,
            Some(ContainerStateStatusEnum::RESTARTING) => ServerStatus::Starting,
            Some(ContainerStateStatusEnum::PAUSED) => ServerStatus::Stopped,
            Some(ContainerStateStatusEnum::REMOVING) => ServerStatus::Stopping,
            Some(ContainerStateStatusEnum::EXITED) => ServerStatus::Stopped,
            Some(ContainerStateStatusEnum::DEAD) => ServerStatus::Error,
            None | Some(ContainerStateStatusEnum::EMPTY) => ServerStatus::Stopped,
        }
    }
}

pub struct DockerManager {
    docker: Docker,
}

impl DockerManager {
    pub async fn new() -> Result<Self, DockerError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    /// Ping Docker to check if it's running
    pub async fn ping(&self) -> Result<(), DockerError> {
        self.docker.ping().await?;
        Ok(())
    }

    pub async fn pull_image(&self, image: &str) -> Result<(), DockerError> {
        tracing::info!("Pulling image: {}", image);
        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        tracing::debug!("Pulling {}: {}", image, status);
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to pull image {}: {}", image, e);
                    return Err(DockerError::ImagePullFailed(e.to_string()));
                }
            }
        }

        tracing::info!("Successfully pulled image: {}", image);
        Ok(())
    }

    pub async fn start_container(&self, name: &str) -> Result<(), DockerError> {
        tracing::info!("Starting container: {}", name);
        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| not_found(name, e))?;
        Ok(())
    }

    pub async fn stop_container(&self, name: &str) -> Result<(), DockerError> {
        tracing::info!("Stopping container: {}", name);
        let options = Some(StopContainerOptions { t: STOP_TIMEOUT_SECS });
        self.docker
            .stop_container(name, options)
            .await
            .map_err(|e| not_found(name, e))?;
        Ok(())
    }

    pub async fn restart_container(&self, name: &str) -> Result<(), DockerError> {
        tracing::info!("Restarting container: {}", name);
        let options = Some(RestartContainerOptions {
            t: STOP_TIMEOUT_SECS as isize,
        });
        self.docker
            .restart_container(name, options)
            .await
            .map_err(|e| not_found(name, e))?;
        Ok(())
    }

    /// Get container status by inspecting it directly
    pub async fn get_container_status(&self, name: &str) -> Result<ServerStatus, DockerError> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(info) => {
                let status = info.state.and_then(|s| s.status);
                tracing::debug!("Container {} status: {:?}", name, status);
                Ok(ServerStatus::from(status))
            }
            Err(e) if is_not_found(&e) => Ok(ServerStatus::Missing),
            Err(e) => Err(e.into()),
        }
    }

    /// Last `lines` log lines of a container.
    pub async fn get_logs(&self, name: &str, lines: u32) -> Result<Vec<String>, DockerError> {
        let options = Some(LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: lines.to_string(),
            timestamps: false,
            ..Default::default()
        });

        let mut stream = self.docker.logs(name, options);
        let mut logs = Vec::new();

        while let Some(result) = stream.next().await {
            match result {
                Ok(output) => {
                    for l in log_text(output).lines() {
                        if !l.trim().is_empty() {
                            logs.push(l.to_string());
                        }
                    }
                }
                Err(e) if is_not_found(&e) => {
                    return Err(DockerError::ContainerNotFound(name.to_string()));
                }
                Err(e) => {
                    tracing::warn!("Error reading log: {}", e);
                }
            }
        }

        Ok(logs)
    }

    /// Stream log lines until the container stops or the stream ends.
    pub async fn follow_logs<F>(&self, name: &str, tail: u32, mut on_line: F) -> Result<(), DockerError>
    where
        F: FnMut(String),
    {
        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            timestamps: false,
            tail: tail.to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.logs(name, Some(options));
        while let Some(result) = stream.next().await {
            match result {
                Ok(output) => {
                    for line in log_text(output).lines() {
                        if !line.is_empty() {
                            on_line(line.to_string());
                        }
                    }
                }
                Err(e) if is_not_found(&e) => {
                    return Err(DockerError::ContainerNotFound(name.to_string()));
                }
                Err(e) => {
                    tracing::warn!("Log stream error: {}", e);
                    break;
                }
            }
        }
        Ok(())
    }
}

fn log_text(output: LogOutput) -> String {
    match output {
        LogOutput::StdOut { message }
        | LogOutput::StdErr { message }
        | LogOutput::Console { message }
        | LogOutput::StdIn { message } => String::from_utf8_lossy(&message).to_string(),
    }
}

fn is_not_found(e: &bollard::errors::Error) -> bool {
    matches!(
        e,
        bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }
    )
}

fn not_found(name: &str, e: bollard::errors::Error) -> DockerError {
    if is_not_found(&e) {
        DockerError::ContainerNotFound(name.to_string())
    } else {
        DockerError::ConnectionError(e)
    }
}
