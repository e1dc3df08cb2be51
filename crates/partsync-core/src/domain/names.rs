//! Well-known object and file names

/// Suffix of every object that is never a part.
pub const IGNORE_SUFFIX: &str = ".ignore";

/// Written to a destination only after a run fully succeeds.
pub const BACKUP_COMPLETE_FILENAME: &str = "backup_complete.ignore";

/// Small JSON record describing the backup, copied verbatim by remote copy.
pub const BACKUP_METADATA_FILENAME: &str = "backup_metadata.ignore";

/// Advisory lock file in the root of a local snapshot.
pub const LOCK_FILENAME: &str = "flock.lock";

/// Present in a local snapshot while a restore into it has not finished.
pub const RESTORE_IN_PROGRESS_FILENAME: &str = "restore-in-progress";

/// Returns true if `path` names an object that listings must skip.
pub fn is_ignored_path(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.ends_with(IGNORE_SUFFIX) || name == LOCK_FILENAME || name == RESTORE_IN_PROGRESS_FILENAME
}
