//! Compendium feature slice
//!
//! Intake (`POST /compendium`) runs the full pipeline synchronously up to
//! record creation and returns the fresh id; extraction continues in the
//! background. Status lookup (`GET /compendium/:id`) exposes the record's
//! `loading`/`success`/`failed` state.

pub mod commands;
pub mod queries;
pub mod routes;

pub use routes::compendium_routes;
