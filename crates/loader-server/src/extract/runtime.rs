//! Container runtime interface
//!
//! Narrow surface over the container engine: ping, pull, run-with-bind. The
//! production implementation shells out to the docker CLI; tests inject
//! fakes.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

/// How many trailing characters of container stderr are kept for the
/// operator log.
const STDERR_TAIL_CHARS: usize = 2048;

/// One container run request.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub bind_source: PathBuf,
    pub bind_target: String,
    pub timeout: Duration,
}

/// Outcome of a completed container run.
#[derive(Debug, Clone)]
pub struct ContainerExit {
    pub status_code: i64,
    pub stderr_tail: String,
}

impl ContainerExit {
    pub fn success(&self) -> bool {
        self.status_code == 0
    }
}

/// Runtime failures. These never reach the original intake caller; they are
/// absorbed into the compendium's `failed` status.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("container runtime is not reachable: {0}")]
    Unreachable(String),

    #[error("failed to pull image {image}: {cause}")]
    Pull { image: String, cause: String },

    #[error("failed to launch container: {0}")]
    Launch(#[source] std::io::Error),

    #[error("container exceeded runtime limit of {0:?}")]
    Timeout(Duration),
}

/// Container runtime operations used by the extraction orchestrator.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + 'static {
    async fn ping(&self) -> Result<(), RuntimeError>;

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError>;

    async fn run(&self, spec: &ContainerSpec) -> Result<ContainerExit, RuntimeError>;
}

/// Docker CLI-backed runtime.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

pub(crate) fn bind_arg(spec: &ContainerSpec) -> String {
    format!("{}:{}", spec.bind_source.display(), spec.bind_target)
}

fn tail(text: String) -> String {
    if text.len() <= STDERR_TAIL_CHARS {
        return text;
    }
    let start = text.len() - STDERR_TAIL_CHARS;
    // Stay on a char boundary.
    let start = (start..text.len())
        .find(|i| text.is_char_boundary(*i))
        .unwrap_or(text.len());
    text[start..].to_string()
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn ping(&self) -> Result<(), RuntimeError> {
        let output = Command::new(&self.binary)
            .args(["version", "--format", "{{.Server.Version}}"])
            .output()
            .await
            .map_err(|e| RuntimeError::Unreachable(e.to_string()))?;

        if !output.status.success() {
            return Err(RuntimeError::Unreachable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        debug!(
            version = %String::from_utf8_lossy(&output.stdout).trim(),
            "container runtime reachable"
        );
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        let output = Command::new(&self.binary)
            .args(["pull", image])
            .output()
            .await
            .map_err(|e| RuntimeError::Pull {
                image: image.to_string(),
                cause: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(RuntimeError::Pull {
                image: image.to_string(),
                cause: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<ContainerExit, RuntimeError> {
        let bind = bind_arg(spec);
        let mut child = Command::new(&self.binary)
            .args(["run", "--rm", "-v", &bind, &spec.image])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(RuntimeError::Launch)?;

        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut buf).await;
            }
            buf
        });

        match tokio::time::timeout(spec.timeout, child.wait()).await {
            Ok(Ok(status)) => {
                let stderr_tail = tail(stderr_task.await.unwrap_or_default());
                Ok(ContainerExit {
                    status_code: i64::from(status.code().unwrap_or(-1)),
                    stderr_tail,
                })
            },
            Ok(Err(e)) => Err(RuntimeError::Launch(e)),
            Err(_) => {
                let _ = child.kill().await;
                Err(RuntimeError::Timeout(spec.timeout))
            },
        }
    }
}
