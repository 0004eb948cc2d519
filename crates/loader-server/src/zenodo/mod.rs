//! Zenodo source handling
//!
//! Two stages, strictly ordered:
//!
//! - [`reference`]: pure validation of intake fields into a typed
//!   [`ExternalReference`]. No network access; every rejection carries the
//!   exact caller-facing message.
//! - [`client`]: resolution of a numeric record id against the Zenodo records
//!   API, including target-file selection.

pub mod client;
pub mod reference;

pub use client::{ResolveError, ResolvedSource, ZenodoClient, ZenodoFile, ZenodoRecord};
pub use reference::{
    normalize, remote_record_id, ExternalReference, IntakeFields, ReferenceError, UploadedFile,
};
