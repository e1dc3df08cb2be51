//! Domain error types
//!
//! This module defines error types specific to domain operations:
//! malformed part paths and remote names, bad storage URIs, and the
//! coverage violations detected when validating a backup before restore.

use thiserror::Error;

use super::part::Part;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid logical file path for a part
    #[error("Invalid part path: {0}")]
    InvalidPartPath(String),

    /// An object name that does not follow the part naming scheme
    #[error("Invalid remote path: {0}")]
    InvalidRemotePath(String),

    /// A storage URI that cannot be mapped to a backend
    #[error("Invalid storage URI: {0}")]
    InvalidStorageUri(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// A violation of the contiguous, non-overlapping layout a backup must have
///
/// Returned by [`validate_coverage`](super::validate::validate_coverage).
/// Each variant names the parts involved so the corrupted object can be
/// located on the backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoverageError {
    /// The first part of a file does not start at offset 0
    #[error("there is a gap in {gap} bytes from file start to {part}")]
    GapFromFileStart {
        /// Number of missing bytes
        gap: u64,
        /// First part found for the file
        part: Part,
    },

    /// Two consecutive parts leave bytes uncovered
    #[error("there is a gap in {gap} bytes between {prev} and {next}")]
    GapBetweenParts {
        /// Number of missing bytes
        gap: u64,
        /// Part preceding the gap
        prev: Part,
        /// Part following the gap
        next: Part,
    },

    /// Two consecutive parts cover the same bytes
    #[error("there is an overlap in {overlap} bytes between {prev} and {next}")]
    OverlapBetweenParts {
        /// Number of bytes covered twice
        overlap: u64,
        /// Earlier part
        prev: Part,
        /// Later part
        next: Part,
    },

    /// The stored object size differs from the size encoded in its name
    #[error("invalid size for {part}; got {actual} bytes; want {expected} bytes")]
    WrongPartSize {
        /// The broken part
        part: Part,
        /// Size observed on the backend
        actual: u64,
        /// Size encoded in the part name
        expected: u64,
    },

    /// The parts of a file do not add up to its declared size
    #[error("invalid size for {path:?}; parts cover {covered} bytes; want {file_size} bytes")]
    WrongFileSize {
        /// Logical file path
        path: String,
        /// Bytes covered by the parts
        covered: u64,
        /// Declared file size
        file_size: u64,
    },

    /// Parts of the same file disagree on the file size
    #[error("parts of {path:?} disagree on file size: {first} vs {other}")]
    InconsistentFileSize {
        /// Logical file path
        path: String,
        /// File size declared by the first part
        first: u64,
        /// Conflicting file size declared by a later part
        other: u64,
    },
}
