//! Loader Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling, logging, and file utilities for the loader
//! workspace.
//!
//! # Overview
//!
//! This crate provides common functionality used across all loader workspace
//! members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Logging**: Centralized `tracing` subscriber initialization
//! - **Checksums**: File integrity helpers for staged content

pub mod checksum;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{LoaderError, Result};
