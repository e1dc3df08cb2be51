//! The part model
//!
//! A [`Part`] is a contiguous byte range of one logical file and the atomic
//! unit of diffing and transfer. Parts are never persisted on their own: a
//! backend stores one object per part and the object's name encodes the part,
//! so listing a backend is enough to rebuild its part list.
//!
//! ## Remote path encoding
//!
//! ```text
//! <prefix>/<path>/<fileSize:016X>_<offset:016X>_<size:016X>
//! ```
//!
//! `actual_size` is not part of the name; backends fill it from the object
//! size they observe when listing.

use std::fmt::{self, Display, Formatter};
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Upper bound for the size of a single part (1 GiB).
pub const MAX_PART_SIZE: u64 = 1024 * 1024 * 1024;

/// Number of hex digits per numeric field in an encoded part name.
const HEX_FIELD_WIDTH: usize = 16;

/// A contiguous byte range of one logical file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Part {
    /// Logical file path in canonical `/`-separated form
    pub path: String,
    /// Total size of the logical file
    pub file_size: u64,
    /// Start offset of this part within the file
    pub offset: u64,
    /// Intended size of this part
    pub size: u64,
    /// Size actually observed on the backend when listing
    pub actual_size: u64,
}

impl Part {
    /// Creates a part whose observed size equals its intended size.
    pub fn new(path: impl Into<String>, file_size: u64, offset: u64, size: u64) -> Self {
        Self {
            path: path.into(),
            file_size,
            offset,
            size,
            actual_size: size,
        }
    }

    /// Returns a copy of this part with the given observed size.
    #[must_use]
    pub fn with_actual_size(mut self, actual_size: u64) -> Self {
        self.actual_size = actual_size;
        self
    }

    /// Identity key used by the diff engine.
    ///
    /// Covers the full `(path, file_size, offset, size, actual_size)` tuple,
    /// so a change to the file size or to any chunk size changes the key.
    pub fn key(&self) -> String {
        format!(
            "{}{:016X}{:016X}{:016X}{:016X}",
            self.path, self.file_size, self.offset, self.size, self.actual_size
        )
    }

    /// Offset just past the last byte of this part.
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// A part is broken when the backend holds a different number of bytes
    /// than its name promises.
    pub fn is_broken(&self) -> bool {
        self.actual_size != self.size
    }

    /// Returns true if this part is the last one of its file.
    pub fn is_last(&self) -> bool {
        self.end() == self.file_size
    }

    /// Encodes this part as an object name below `prefix`.
    ///
    /// An empty prefix yields a name relative to the backend root.
    pub fn remote_path(&self, prefix: &str) -> String {
        let name = format!(
            "{}/{:016X}_{:016X}_{:016X}",
            self.path, self.file_size, self.offset, self.size
        );
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        }
    }

    /// Parses an object name relative to the backend root.
    ///
    /// The returned part has `actual_size == size`; callers overwrite it with
    /// the observed object size.
    pub fn parse_remote_path(remote_path: &str) -> Result<Self, DomainError> {
        let invalid = || DomainError::InvalidRemotePath(remote_path.to_string());

        let (path, name) = remote_path.rsplit_once('/').ok_or_else(invalid)?;
        validate_part_path(path).map_err(|_| invalid())?;

        let mut fields = name.split('_');
        let file_size = parse_hex_field(fields.next()).ok_or_else(invalid)?;
        let offset = parse_hex_field(fields.next()).ok_or_else(invalid)?;
        let size = parse_hex_field(fields.next()).ok_or_else(invalid)?;
        if fields.next().is_some() {
            return Err(invalid());
        }

        let end = offset.checked_add(size).ok_or_else(invalid)?;
        if end > file_size {
            return Err(invalid());
        }

        Ok(Self::new(path, file_size, offset, size))
    }
}

impl Display for Part {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "part{{path: {:?}, file_size: {}, offset: {}, size: {}}}",
            self.path, self.file_size, self.offset, self.size
        )
    }
}

fn parse_hex_field(field: Option<&str>) -> Option<u64> {
    let field = field?;
    if field.len() != HEX_FIELD_WIDTH
        || !field
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
    {
        return None;
    }
    u64::from_str_radix(field, 16).ok()
}

/// Checks that `path` is a canonical relative part path.
///
/// Rejects empty paths, empty segments, absolute paths and `.`/`..` segments.
pub fn validate_part_path(path: &str) -> Result<(), DomainError> {
    if path.is_empty() || path.starts_with('/') {
        return Err(DomainError::InvalidPartPath(path.to_string()));
    }
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(DomainError::InvalidPartPath(path.to_string()));
        }
    }
    Ok(())
}

/// Converts a path relative to a snapshot root into canonical form.
pub fn to_canonical_path(relative: &Path) -> Result<String, DomainError> {
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => {
                let segment = segment.to_str().ok_or_else(|| {
                    DomainError::InvalidPartPath(relative.to_string_lossy().into_owned())
                })?;
                segments.push(segment.to_string());
            }
            _ => {
                return Err(DomainError::InvalidPartPath(
                    relative.to_string_lossy().into_owned(),
                ))
            }
        }
    }
    let path = segments.join("/");
    validate_part_path(&path)?;
    Ok(path)
}

/// Splits a file of `file_size` bytes into parts of at most `max_part_size`.
///
/// A zero-byte file yields exactly one empty part at offset 0.
pub fn split_into_parts(path: &str, file_size: u64, max_part_size: u64) -> Vec<Part> {
    if file_size == 0 {
        return vec![Part::new(path, 0, 0, 0)];
    }
    let max_part_size = max_part_size.max(1);
    let mut parts = Vec::with_capacity(file_size.div_ceil(max_part_size) as usize);
    let mut offset = 0;
    while offset < file_size {
        let size = (file_size - offset).min(max_part_size);
        parts.push(Part::new(path, file_size, offset, size));
        offset += size;
    }
    parts
}
