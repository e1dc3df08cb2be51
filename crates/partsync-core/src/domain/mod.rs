//! Domain types and pure algorithms
//!
//! This module contains the core domain of partsync:
//! - The part model and its remote path encoding
//! - Set algebra over part lists
//! - Coverage validation for restore sources
//! - Well-known marker names
//! - Backup metadata
//! - Domain-specific error types

pub mod diff;
pub mod errors;
pub mod metadata;
pub mod names;
pub mod part;
pub mod validate;

// Re-export commonly used types
pub use diff::{difference, group_by_path, intersect, parts_size, sort_parts};
pub use errors::{CoverageError, DomainError};
pub use metadata::BackupMetadata;
pub use part::{split_into_parts, to_canonical_path, validate_part_path, Part, MAX_PART_SIZE};
pub use validate::validate_coverage;
