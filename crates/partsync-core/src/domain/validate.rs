//! Coverage validation for restore sources
//!
//! A backup is restorable only if, for every file it contains, the parts
//! sorted by offset tile `[0, file_size)` exactly and every stored object
//! holds the number of bytes its name promises.

use super::diff::sort_parts;
use super::errors::CoverageError;
use super::part::Part;

/// Checks that `parts` form a contiguous, non-overlapping partition of every
/// file they mention.
///
/// Returns the first violation found when walking the parts in
/// `(path, offset)` order.
pub fn validate_coverage(parts: &[Part]) -> Result<(), CoverageError> {
    let mut sorted = parts.to_vec();
    sort_parts(&mut sorted);

    let mut prev: Option<&Part> = None;
    for part in &sorted {
        if part.is_broken() {
            return Err(CoverageError::WrongPartSize {
                part: part.clone(),
                actual: part.actual_size,
                expected: part.size,
            });
        }

        match prev {
            Some(p) if p.path == part.path => {
                if part.file_size != p.file_size {
                    return Err(CoverageError::InconsistentFileSize {
                        path: part.path.clone(),
                        first: p.file_size,
                        other: part.file_size,
                    });
                }
                let expected = p.end();
                if part.offset > expected {
                    return Err(CoverageError::GapBetweenParts {
                        gap: part.offset - expected,
                        prev: p.clone(),
                        next: part.clone(),
                    });
                }
                if part.offset < expected {
                    return Err(CoverageError::OverlapBetweenParts {
                        overlap: expected - part.offset,
                        prev: p.clone(),
                        next: part.clone(),
                    });
                }
            }
            _ => {
                if let Some(p) = prev {
                    check_file_end(p)?;
                }
                if part.offset != 0 {
                    return Err(CoverageError::GapFromFileStart {
                        gap: part.offset,
                        part: part.clone(),
                    });
                }
            }
        }
        prev = Some(part);
    }

    if let Some(p) = prev {
        check_file_end(p)?;
    }
    Ok(())
}

fn check_file_end(last: &Part) -> Result<(), CoverageError> {
    if last.end() != last.file_size {
        return Err(CoverageError::WrongFileSize {
            path: last.path.clone(),
            covered: last.end(),
            file_size: last.file_size,
        });
    }
    Ok(())
}
