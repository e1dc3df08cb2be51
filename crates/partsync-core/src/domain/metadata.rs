//! Backup metadata record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Auxiliary record stored next to the parts of a finished backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    /// When the backup run started
    pub created_at: DateTime<Utc>,
    /// When the last part was transferred
    pub completed_at: DateTime<Utc>,
}

impl BackupMetadata {
    /// Creates a record for a run that started at `created_at` and ends now.
    pub fn completed_now(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            completed_at: Utc::now(),
        }
    }

    /// Serializes the record as JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parses a record from JSON bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}
