//! In-memory remote backend
//!
//! A [`MemoryStore`] is a flat, process-local object store. Any number of
//! [`MemoryRemote`] views can share one store under different prefixes,
//! which makes server-side copies between them possible.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::anyhow;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, instrument};

use partsync_core::domain::names::IGNORE_SUFFIX;
use partsync_core::domain::Part;
use partsync_core::ports::{BackendLocation, IOriginFs, IRemoteFs};

use crate::FsError;

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// MemoryStore
// ============================================================================

/// Shared map from object name to bytes
#[derive(Debug)]
pub struct MemoryStore {
    id: u64,
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            objects: Mutex::new(BTreeMap::new()),
        })
    }

    /// Identity used to recognise copies within the same store
    pub fn id(&self) -> u64 {
        self.id
    }

    fn objects(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        // every update is a single insert or remove, so a poisoned map is still whole
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores `data` under `name`, replacing any previous object
    pub fn put(&self, name: impl Into<String>, data: Vec<u8>) {
        self.objects().insert(name.into(), data);
    }

    /// Returns a copy of the object `name`
    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.objects().get(name).cloned()
    }

    /// Returns every object name in the store, sorted
    pub fn names(&self) -> Vec<String> {
        self.objects().keys().cloned().collect()
    }
}

// ============================================================================
// MemoryRemote
// ============================================================================

/// [`IRemoteFs`] view of a [`MemoryStore`] below a prefix
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    store: Arc<MemoryStore>,
    dir: String,
}

impl MemoryRemote {
    #[must_use]
    pub fn new(store: Arc<MemoryStore>, dir: impl Into<String>) -> Self {
        let dir = dir.into().trim_matches('/').to_string();
        Self { store, dir }
    }

    /// Returns the underlying store
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    fn object_name(&self, part: &Part) -> String {
        part.remote_path(&self.dir)
    }

    fn file_name(&self, name: &str) -> String {
        if self.dir.is_empty() {
            name.to_string()
        } else {
            format!("{}/{name}", self.dir)
        }
    }

    fn prefix(&self) -> String {
        if self.dir.is_empty() {
            String::new()
        } else {
            format!("{}/", self.dir)
        }
    }
}

impl fmt::Display for MemoryRemote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "memory://{}/{}", self.store.id, self.dir)
    }
}

fn size_mismatch(part: &Part, got: u64) -> anyhow::Error {
    FsError::SizeMismatch {
        what: part.to_string(),
        got,
        want: part.size,
    }
    .into()
}

#[async_trait::async_trait]
impl IOriginFs for MemoryRemote {
    fn location(&self) -> BackendLocation {
        BackendLocation::Memory {
            store_id: self.store.id,
            dir: self.dir.clone(),
        }
    }

    #[instrument(skip(self), fields(remote = %self))]
    async fn list_parts(&self) -> anyhow::Result<Vec<Part>> {
        let prefix = self.prefix();
        let objects = self.store.objects();
        let mut parts = Vec::new();
        for (name, data) in objects.range(prefix.clone()..) {
            let Some(relative) = name.strip_prefix(&prefix) else {
                break;
            };
            if relative.ends_with(IGNORE_SUFFIX) {
                continue;
            }
            match Part::parse_remote_path(relative) {
                Ok(part) => parts.push(part.with_actual_size(data.len() as u64)),
                Err(e) => info!(object = %name, error = %e, "skipping object"),
            }
        }
        debug!(parts = parts.len(), "listed memory parts");
        Ok(parts)
    }
}

#[async_trait::async_trait]
impl IRemoteFs for MemoryRemote {
    fn as_origin(&self) -> &dyn IOriginFs {
        self
    }

    async fn delete_part(&self, part: &Part) -> anyhow::Result<()> {
        self.store.objects().remove(&self.object_name(part));
        Ok(())
    }

    async fn remove_empty_dirs(&self) -> anyhow::Result<()> {
        Ok(())
    }

    #[instrument(skip(self, src), fields(src = %src, part = %part))]
    async fn copy_part(&self, src: &dyn IOriginFs, part: &Part) -> anyhow::Result<()> {
        let src_dir = match src.location() {
            BackendLocation::Memory { store_id, dir } if store_id == self.store.id => dir,
            BackendLocation::Memory { .. } => {
                return Err(anyhow!(
                    "server-side copy between different memory stores is not supported"
                ))
            }
            other => {
                return Err(FsError::CrossBackendCopy {
                    src: other.kind(),
                    dst: "memory",
                }
                .into())
            }
        };
        let from = part.remote_path(&src_dir);
        let mut objects = self.store.objects();
        let data = objects
            .get(&from)
            .cloned()
            .ok_or_else(|| anyhow!("object {from} not found"))?;
        if data.len() as u64 != part.size {
            return Err(size_mismatch(part, data.len() as u64));
        }
        objects.insert(self.object_name(part), data);
        Ok(())
    }

    async fn download_part(
        &self,
        part: &Part,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> anyhow::Result<()> {
        let name = self.object_name(part);
        let data = self
            .store
            .get(&name)
            .ok_or_else(|| anyhow!("object {name} not found"))?;
        if data.len() as u64 != part.size {
            return Err(size_mismatch(part, data.len() as u64));
        }
        sink.write_all(&data).await?;
        Ok(())
    }

    async fn upload_part(
        &self,
        part: &Part,
        source: &mut (dyn AsyncRead + Send + Unpin),
    ) -> anyhow::Result<()> {
        let mut data = Vec::new();
        source.read_to_end(&mut data).await?;
        if data.len() as u64 != part.size {
            return Err(size_mismatch(part, data.len() as u64));
        }
        self.store.put(self.object_name(part), data);
        Ok(())
    }

    async fn delete_file(&self, name: &str) -> anyhow::Result<()> {
        self.store.objects().remove(&self.file_name(name));
        Ok(())
    }

    async fn create_file(&self, name: &str, data: &[u8]) -> anyhow::Result<()> {
        self.store.put(self.file_name(name), data.to_vec());
        Ok(())
    }

    async fn has_file(&self, name: &str) -> anyhow::Result<bool> {
        Ok(self.store.objects().contains_key(&self.file_name(name)))
    }

    async fn read_file(&self, name: &str) -> anyhow::Result<Vec<u8>> {
        let name = self.file_name(name);
        self.store
            .get(&name)
            .ok_or_else(|| anyhow!("file {name} not found"))
    }
}
