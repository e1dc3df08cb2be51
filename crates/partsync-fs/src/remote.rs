//! `fs://` remote backend
//!
//! Stores every part as one object file below a directory, named by
//! [`Part::remote_path`]. Auxiliary files (markers, metadata) live directly
//! in the directory.
//!
//! Server-side copy between two `fs://` backends uses a hard link and falls
//! back to a plain file copy when linking is not possible (for example
//! across mount points).

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, instrument};

use partsync_core::domain::names::IGNORE_SUFFIX;
use partsync_core::domain::{to_canonical_path, Part};
use partsync_core::ports::{BackendLocation, IOriginFs, IRemoteFs};

use crate::local::{remove_empty_dirs_below, remove_file_if_exists, walk_files};
use crate::FsError;

// ============================================================================
// FsRemote struct
// ============================================================================

/// Remote backend kept in a local (or locally mounted) directory
#[derive(Debug, Clone)]
pub struct FsRemote {
    dir: PathBuf,
}

impl FsRemote {
    /// Creates a backend rooted at `dir`; the directory need not exist yet.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the backend directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn object_path(&self, part: &Part) -> PathBuf {
        self.dir.join(part.remote_path(""))
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl fmt::Display for FsRemote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fs://{}", self.dir.display())
    }
}

async fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    Ok(())
}

async fn check_object_size(path: &Path, part: &Part) -> anyhow::Result<()> {
    let got = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("cannot stat {}", path.display()))?
        .len();
    if got != part.size {
        return Err(FsError::SizeMismatch {
            what: part.to_string(),
            got,
            want: part.size,
        }
        .into());
    }
    Ok(())
}

// ============================================================================
// IOriginFs implementation
// ============================================================================

#[async_trait::async_trait]
impl IOriginFs for FsRemote {
    fn location(&self) -> BackendLocation {
        BackendLocation::Filesystem {
            dir: self.dir.clone(),
        }
    }

    #[instrument(skip(self), fields(remote = %self))]
    async fn list_parts(&self) -> anyhow::Result<Vec<Part>> {
        let dir = self.dir.clone();
        let files = tokio::task::spawn_blocking(move || walk_files(&dir)).await??;

        let mut parts = Vec::with_capacity(files.len());
        for (relative, size) in files {
            let name = match to_canonical_path(&relative) {
                Ok(name) => name,
                Err(e) => {
                    info!(object = %relative.display(), error = %e, "skipping object");
                    continue;
                }
            };
            if name.ends_with(IGNORE_SUFFIX) {
                continue;
            }
            match Part::parse_remote_path(&name) {
                Ok(part) => parts.push(part.with_actual_size(size)),
                Err(e) => info!(object = %name, error = %e, "skipping object"),
            }
        }
        debug!(parts = parts.len(), "listed remote parts");
        Ok(parts)
    }
}

// ============================================================================
// IRemoteFs implementation
// ============================================================================

#[async_trait::async_trait]
impl IRemoteFs for FsRemote {
    fn as_origin(&self) -> &dyn IOriginFs {
        self
    }

    #[instrument(skip(self), fields(part = %part))]
    async fn delete_part(&self, part: &Part) -> anyhow::Result<()> {
        let path = self.object_path(part);
        remove_file_if_exists(&path)
            .await
            .with_context(|| format!("cannot delete {}", path.display()))?;
        Ok(())
    }

    #[instrument(skip(self), fields(remote = %self))]
    async fn remove_empty_dirs(&self) -> anyhow::Result<()> {
        let dir = self.dir.clone();
        let removed = tokio::task::spawn_blocking(move || remove_empty_dirs_below(&dir)).await??;
        debug!(removed, "removed empty directories");
        Ok(())
    }

    #[instrument(skip(self, src), fields(src = %src, part = %part))]
    async fn copy_part(&self, src: &dyn IOriginFs, part: &Part) -> anyhow::Result<()> {
        let src_dir = match src.location() {
            BackendLocation::Filesystem { dir } => dir,
            other => {
                return Err(FsError::CrossBackendCopy {
                    src: other.kind(),
                    dst: "fs",
                }
                .into())
            }
        };
        let from = src_dir.join(part.remote_path(""));
        let to = self.object_path(part);
        if from == to {
            return check_object_size(&to, part).await;
        }
        ensure_parent(&to).await?;
        remove_file_if_exists(&to).await?;

        if let Err(e) = tokio::fs::hard_link(&from, &to).await {
            debug!(error = %e, "hard link failed, copying instead");
            tokio::fs::copy(&from, &to).await.with_context(|| {
                format!("cannot copy {} to {}", from.display(), to.display())
            })?;
        }
        check_object_size(&to, part).await
    }

    #[instrument(skip(self, sink), fields(part = %part))]
    async fn download_part(
        &self,
        part: &Part,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> anyhow::Result<()> {
        let path = self.object_path(part);
        let file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("cannot open {}", path.display()))?;
        // one byte more than expected is enough to notice an oversized object
        let mut limited = file.take(part.size + 1);
        let got = tokio::io::copy(&mut limited, sink).await?;
        if got != part.size {
            return Err(FsError::SizeMismatch {
                what: part.to_string(),
                got,
                want: part.size,
            }
            .into());
        }
        Ok(())
    }

    #[instrument(skip(self, source), fields(part = %part))]
    async fn upload_part(
        &self,
        part: &Part,
        source: &mut (dyn AsyncRead + Send + Unpin),
    ) -> anyhow::Result<()> {
        let path = self.object_path(part);
        ensure_parent(&path).await?;
        let mut file = tokio::fs::File::create(&path)
            .await
            .with_context(|| format!("cannot create {}", path.display()))?;
        let result = async {
            let got = tokio::io::copy(source, &mut file).await?;
            file.flush().await?;
            anyhow::Ok(got)
        }
        .await;

        let got = match result {
            Ok(got) => got,
            Err(e) => {
                drop(file);
                remove_file_if_exists(&path).await?;
                return Err(e);
            }
        };
        if got != part.size {
            drop(file);
            remove_file_if_exists(&path).await?;
            return Err(FsError::SizeMismatch {
                what: part.to_string(),
                got,
                want: part.size,
            }
            .into());
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_file(&self, name: &str) -> anyhow::Result<()> {
        let path = self.file_path(name);
        remove_file_if_exists(&path)
            .await
            .with_context(|| format!("cannot delete {}", path.display()))?;
        Ok(())
    }

    #[instrument(skip(self, data), fields(bytes = data.len()))]
    async fn create_file(&self, name: &str, data: &[u8]) -> anyhow::Result<()> {
        let path = self.file_path(name);
        ensure_parent(&path).await?;
        tokio::fs::write(&path, data)
            .await
            .with_context(|| format!("cannot write {}", path.display()))?;
        Ok(())
    }

    async fn has_file(&self, name: &str) -> anyhow::Result<bool> {
        let path = self.file_path(name);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("cannot stat {}", path.display())),
        }
    }

    async fn read_file(&self, name: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.file_path(name);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))
    }
}

// ============================================================================
// Unit tests
// ============================================================================
