//! Extraction orchestrator
//!
//! Owns the `loading -> {success, failed}` state machine per compendium. One
//! background task per compendium; tasks are independent, and each id is only
//! ever mutated by its own task. Container diagnostics stay in the operator
//! log and are never returned to the intake caller.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ExtractionConfig;
use crate::db::{CompendiumStatus, StatusStore};

use super::runtime::{ContainerRuntime, ContainerSpec};

/// Dispatch surface used by the intake path.
///
/// Trait object so request handlers stay independent of the concrete runtime
/// and store types.
pub trait Dispatch: Send + Sync {
    fn dispatch_extraction(&self, compendium_id: String, staged_dir: PathBuf);
}

/// Launches one extraction container per staged compendium and records the
/// terminal outcome.
pub struct ExtractionOrchestrator<R, S> {
    runtime: Arc<R>,
    store: Arc<S>,
    config: ExtractionConfig,
}

impl<R, S> ExtractionOrchestrator<R, S>
where
    R: ContainerRuntime,
    S: StatusStore,
{
    pub fn new(runtime: Arc<R>, store: Arc<S>, config: ExtractionConfig) -> Self {
        Self {
            runtime,
            store,
            config,
        }
    }

    /// Startup duty: check the runtime and ensure the extraction image is
    /// present. Returns `false` when extraction is degraded; intake stays
    /// open either way, individual extractions will fail until the runtime
    /// recovers.
    pub async fn prepare(&self) -> bool {
        if let Err(e) = self.runtime.ping().await {
            warn!(error = %e, "container runtime not reachable, extraction degraded");
            return false;
        }

        if let Err(e) = self.runtime.pull_image(&self.config.image).await {
            warn!(
                error = %e,
                image = %self.config.image,
                "could not pull extraction image, extraction degraded"
            );
            return false;
        }

        info!(image = %self.config.image, "extraction image ready");
        true
    }

    /// Launch the extraction container for one staged compendium.
    ///
    /// Called exactly once per compendium id, which is what guarantees that
    /// no two container runs for the same id are active concurrently.
    pub fn dispatch(&self, compendium_id: String, staged_dir: PathBuf) -> JoinHandle<()> {
        let runtime = Arc::clone(&self.runtime);
        let store = Arc::clone(&self.store);
        let config = self.config.clone();

        tokio::spawn(async move {
            let spec = ContainerSpec {
                image: config.image.clone(),
                bind_source: staged_dir,
                bind_target: config.bind_target.clone(),
                timeout: Duration::from_secs(config.runtime_timeout_secs),
            };

            info!(compendium_id = %compendium_id, image = %spec.image, "starting metadata extraction");

            let status = match runtime.run(&spec).await {
                Ok(exit) if exit.success() => {
                    info!(compendium_id = %compendium_id, "metadata extraction finished");
                    CompendiumStatus::Success
                },
                Ok(exit) => {
                    error!(
                        compendium_id = %compendium_id,
                        status_code = exit.status_code,
                        stderr = %exit.stderr_tail,
                        "metadata extraction container exited with failure"
                    );
                    CompendiumStatus::Failed
                },
                Err(e) => {
                    error!(
                        compendium_id = %compendium_id,
                        error = %e,
                        "metadata extraction container did not complete"
                    );
                    CompendiumStatus::Failed
                },
            };

            match store.mark_finished(&compendium_id, status).await {
                Ok(true) => {},
                Ok(false) => {
                    debug!(compendium_id = %compendium_id, "compendium already in a terminal state");
                },
                Err(e) => {
                    error!(
                        compendium_id = %compendium_id,
                        error = %e,
                        "failed to record extraction outcome"
                    );
                },
            }
        })
    }
}

impl<R, S> Dispatch for ExtractionOrchestrator<R, S>
where
    R: ContainerRuntime,
    S: StatusStore,
{
    fn dispatch_extraction(&self, compendium_id: String, staged_dir: PathBuf) {
        let _ = self.dispatch(compendium_id, staged_dir);
    }
}
