//! Loader Server Library
//!
//! HTTP service that loads research compendia from heterogeneous sources.
//!
//! # Overview
//!
//! The loader accepts a compendium reference (a direct file upload, a Zenodo
//! share URL, a DOI, or a bare record id) and runs one fixed pipeline:
//!
//! 1. **Normalize** the request fields into a typed [`zenodo::ExternalReference`]
//! 2. **Resolve** remote references against the Zenodo records API
//! 3. **Acquire** the content into the local staging area
//! 4. **Create** a durable compendium record (the caller gets its id here)
//! 5. **Dispatch** an extraction container in the background and track its
//!    outcome on the record (`loading` → `success` | `failed`)
//!
//! Validation and resolution failures are returned synchronously and create
//! no record; once a record exists, container-side failures are absorbed into
//! its status and never re-surface to the original caller.
//!
//! # Framework Stack
//!
//! - **Axum**: HTTP transport
//! - **SQLx**: PostgreSQL persistence for compendium records
//! - **Reqwest**: Zenodo API access and content download
//! - **Tokio**: async runtime; one background task per extraction run

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod features;
pub mod middleware;
pub mod notify;
pub mod staging;
pub mod startup;
pub mod zenodo;

// Re-export commonly used types
pub use error::{ApiError, ApiResult};
