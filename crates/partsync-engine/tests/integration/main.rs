//! Integration tests for partsync-engine
//!
//! Drives the backup, remote copy and restore orchestrators against the
//! in-memory and `fs://` remotes and temporary snapshot directories.


mod test_backup;
mod test_restore;
mod test_round_trip;
