//! Metadata extraction
//!
//! One container run per staged compendium, dispatched in the background and
//! reported back through the store's idempotent terminal update. The
//! container runtime is behind a trait so the orchestrator tests run against
//! fakes.

pub mod orchestrator;
pub mod runtime;

pub use orchestrator::{Dispatch, ExtractionOrchestrator};
pub use runtime::{ContainerExit, ContainerRuntime, ContainerSpec, DockerCli, RuntimeError};
