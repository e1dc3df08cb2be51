//! Origin that holds nothing
//!
//! Used when a backup has no origin: every part is then uploaded.

use std::fmt;

use partsync_core::domain::Part;
use partsync_core::ports::{BackendLocation, IOriginFs};

/// [`IOriginFs`] with no parts
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyOrigin;

impl fmt::Display for EmptyOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("empty://")
    }
}

#[async_trait::async_trait]
impl IOriginFs for EmptyOrigin {
    fn location(&self) -> BackendLocation {
        BackendLocation::Empty
    }

    async fn list_parts(&self) -> anyhow::Result<Vec<Part>> {
        Ok(Vec::new())
    }
}
