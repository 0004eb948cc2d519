//! Feature modules implementing the loader API
//!
//! One vertical slice per feature, each with its own commands, queries, and
//! routes:
//!
//! - **compendium**: intake of new compendia (the resolve → acquire → stage →
//!   dispatch pipeline) and status lookup by id
//!
//! Commands and queries implement the mediator pattern using the `mediator`
//! crate, keeping the handlers callable without the HTTP layer.

pub mod compendium;

use axum::Router;
use std::sync::Arc;

use crate::config::Config;
use crate::db::CompendiumStore;
use crate::extract::Dispatch;
use crate::notify::Notifier;
use crate::staging::Acquirer;
use crate::zenodo::ZenodoClient;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    /// Compendium record persistence
    pub store: CompendiumStore,
    /// Zenodo records API client
    pub zenodo: ZenodoClient,
    /// Content acquisition into the staging area
    pub acquirer: Acquirer,
    /// Background extraction dispatch
    pub dispatcher: Arc<dyn Dispatch>,
    /// Optional fire-and-forget notification side-channel
    pub notifier: Option<Notifier>,
    /// Process configuration
    pub config: Arc<Config>,
}

/// Creates the main API router with all feature routes mounted
pub fn router(state: FeatureState) -> Router<()> {
    Router::new().nest(
        "/compendium",
        compendium::compendium_routes().with_state(state),
    )
}
