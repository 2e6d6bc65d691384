//! # jobline-id
//!
//! Identifier types shared by the jobline scheduler and its host binaries.
//!
//! ## Kinds of identifier
//!
//! - **Generated IDs** (`JobId`, `RunId`) are ULID-based and carry a type
//!   prefix: `{prefix}_{ulid}`, e.g. `job_01HV4Z2WQXKJNM8GPQY6VBKC3D`.
//!   They sort by creation time and cannot be mixed up across types.
//! - **Pipeline IDs** are caller-chosen names (`"default"`, `"etl"`,
//!   `"model.train"`). They are validated once at the boundary so the
//!   scheduler can key its registry on them without further checks.

mod error;
mod macros;
mod pipeline;
mod types;

pub use error::IdError;
pub use pipeline::PipelineId;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
