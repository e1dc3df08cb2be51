//! Local snapshot adapter (secondary/driven adapter)
//!
//! Implements [`ISnapshotFs`] over a directory on the local filesystem using
//! `tokio::fs` for file I/O and `walkdir` for listing.
//!
//! ## Design Decisions
//!
//! - **Chunking**: Every regular file is listed as consecutive parts of at
//!   most `max_part_size` bytes; a zero-byte file is one empty part.
//! - **Positional writes**: Part writers open without truncation and seek to
//!   the part's offset, so parts of one file can be written one after the
//!   other and an interrupted file keeps its prefix.
//! - **Lock**: `fs2` exclusive advisory lock on `flock.lock` in the root,
//!   non-blocking; released and removed when the [`DirLock`] drops.
//! - **Bandwidth**: Readers and writers are wrapped in the limiter when one
//!   is configured.

use std::fmt;
use std::future::Future;
use std::io::{self, ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use anyhow::Context as _;
use fs2::FileExt;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite};
use tracing::{debug, info, instrument};

use partsync_core::config::Config;
use partsync_core::domain::names::{is_ignored_path, LOCK_FILENAME};
use partsync_core::domain::{split_into_parts, to_canonical_path, Part, MAX_PART_SIZE};
use partsync_core::ports::{DirLock, ISnapshotFs, PartReader, PartWriter};

use crate::bandwidth::{BandwidthLimiter, LimitedReader, LimitedWriter};
use crate::FsError;

// ============================================================================
// LocalSnapshot struct
// ============================================================================

/// Adapter that bridges the [`ISnapshotFs`] port to a local directory
#[derive(Debug, Clone)]
pub struct LocalSnapshot {
    root: PathBuf,
    limiter: Option<Arc<BandwidthLimiter>>,
    max_part_size: u64,
}

impl LocalSnapshot {
    /// Creates an adapter for `root` without bandwidth limiting.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            limiter: None,
            max_part_size: MAX_PART_SIZE,
        }
    }

    /// Creates an adapter for `root` limited by `bandwidth.max_bytes_per_second`.
    #[must_use]
    pub fn from_config(root: impl Into<PathBuf>, config: &Config) -> Self {
        let snapshot = Self::new(root);
        match config.bandwidth.max_bytes_per_second {
            Some(limit) => snapshot.with_limiter(Arc::new(BandwidthLimiter::new(limit))),
            None => snapshot,
        }
    }

    /// Routes every part reader and writer through `limiter`.
    #[must_use]
    pub fn with_limiter(mut self, limiter: Arc<BandwidthLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Overrides the part size used when listing; mainly useful in tests.
    #[must_use]
    pub fn with_max_part_size(mut self, max_part_size: u64) -> Self {
        self.max_part_size = max_part_size.max(1);
        self
    }

    fn path_of(&self, part_path: &str) -> PathBuf {
        self.root.join(part_path)
    }
}

impl fmt::Display for LocalSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root.display())
    }
}

// ============================================================================
// Directory helpers shared with the fs:// remote
// ============================================================================

/// Lists every regular file below `root` as `(path relative to root, size)`.
///
/// A missing root yields an empty list. Callers decide how to treat paths
/// with no canonical form.
pub(crate) fn walk_files(root: &Path) -> anyhow::Result<Vec<(PathBuf, u64)>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("cannot walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {}", entry.path().display(), root.display()))?
            .to_path_buf();
        let size = entry
            .metadata()
            .with_context(|| format!("cannot stat {}", entry.path().display()))?
            .len();
        files.push((relative, size));
    }
    Ok(files)
}

/// Removes every empty directory below `root`, deepest first.
///
/// The root itself is never removed.
pub(crate) fn remove_empty_dirs_below(root: &Path) -> anyhow::Result<usize> {
    if !root.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in walkdir::WalkDir::new(root).min_depth(1).contents_first(true) {
        let entry = entry.with_context(|| format!("cannot walk {}", root.display()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let is_empty = std::fs::read_dir(entry.path())?.next().is_none();
        if is_empty {
            std::fs::remove_dir(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Removes `path`, treating a missing file as success.
pub(crate) async fn remove_file_if_exists(path: &Path) -> io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

// ============================================================================
// PartFileWriter
// ============================================================================

/// Writer for one part of a local file
///
/// Shutdown fails unless exactly `part.size` bytes were written and trims
/// the file to `part.file_size` once the file's last part is in place.
struct PartFileWriter {
    file: Option<File>,
    part: Part,
    written: u64,
    finishing: Option<Pin<Box<dyn Future<Output = io::Result<()>> + Send>>>,
}

fn writer_closed() -> io::Error {
    io::Error::new(ErrorKind::BrokenPipe, "part writer is already shut down")
}

impl AsyncWrite for PartFileWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let Some(file) = this.file.as_mut() else {
            return Poll::Ready(Err(writer_closed()));
        };
        match Pin::new(file).poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                this.written += n as u64;
                Poll::Ready(Ok(n))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().file.as_mut() {
            Some(file) => Pin::new(file).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.finishing.is_none() {
            let Some(file) = this.file.as_mut() else {
                return Poll::Ready(Ok(()));
            };
            match Pin::new(&mut *file).poll_flush(cx) {
                Poll::Ready(Ok(())) => {}
                Poll::Ready(Err(err)) => return Poll::Ready(Err(err)),
                Poll::Pending => return Poll::Pending,
            }
            if this.written != this.part.size {
                let err = FsError::SizeMismatch {
                    what: this.part.to_string(),
                    got: this.written,
                    want: this.part.size,
                };
                return Poll::Ready(Err(io::Error::new(ErrorKind::InvalidData, err)));
            }
            let Some(file) = this.file.take() else {
                return Poll::Ready(Err(writer_closed()));
            };
            let trim_to = this.part.is_last().then_some(this.part.file_size);
            this.finishing = Some(Box::pin(async move {
                if let Some(len) = trim_to {
                    file.set_len(len).await?;
                }
                Ok(())
            }));
        }
        match this.finishing.as_mut() {
            Some(finishing) => finishing.as_mut().poll(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}

// ============================================================================
// ISnapshotFs implementation
// ============================================================================

#[async_trait::async_trait]
impl ISnapshotFs for LocalSnapshot {
    fn root(&self) -> &Path {
        &self.root
    }

    // list_parts - walk the root and chunk every regular file
    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn list_parts(&self) -> anyhow::Result<Vec<Part>> {
        let root = self.root.clone();
        let max_part_size = self.max_part_size;
        let parts = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<Part>> {
            if !root.is_dir() {
                return Err(FsError::MissingRoot(root).into());
            }
            let mut parts = Vec::new();
            for (relative, size) in walk_files(&root)? {
                let path = to_canonical_path(&relative)?;
                if is_ignored_path(&path) {
                    continue;
                }
                parts.extend(split_into_parts(&path, size, max_part_size));
            }
            Ok(parts)
        })
        .await??;
        debug!(parts = parts.len(), "listed local parts");
        Ok(parts)
    }

    // open_part_reader - seek to the offset, read exactly `size` bytes
    #[instrument(skip(self), fields(part = %part))]
    async fn open_part_reader(&self, part: &Part) -> anyhow::Result<PartReader> {
        let path = self.path_of(&part.path);
        let mut file = File::open(&path)
            .await
            .with_context(|| format!("cannot open {}", path.display()))?;
        file.seek(SeekFrom::Start(part.offset)).await?;
        let reader = file.take(part.size);
        Ok(match &self.limiter {
            Some(limiter) => Box::new(LimitedReader::new(reader, limiter.clone())),
            None => Box::new(reader),
        })
    }

    // open_part_writer - create parents, keep existing bytes, seek to the offset
    #[instrument(skip(self), fields(part = %part))]
    async fn open_part_writer(&self, part: &Part) -> anyhow::Result<PartWriter> {
        let path = self.path_of(&part.path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await
            .with_context(|| format!("cannot open {} for writing", path.display()))?;
        file.seek(SeekFrom::Start(part.offset)).await?;

        let writer = PartFileWriter {
            file: Some(file),
            part: part.clone(),
            written: 0,
            finishing: None,
        };
        Ok(match &self.limiter {
            Some(limiter) => Box::new(LimitedWriter::new(writer, limiter.clone())),
            None => Box::new(writer),
        })
    }

    // delete_path - remove one file, report its size
    #[instrument(skip(self))]
    async fn delete_path(&self, path: &str) -> anyhow::Result<u64> {
        let full = self.path_of(path);
        let size = match tokio::fs::metadata(&full).await {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        remove_file_if_exists(&full)
            .await
            .with_context(|| format!("cannot delete {}", full.display()))?;
        debug!(bytes = size, "deleted local file");
        Ok(size)
    }

    // remove_empty_dirs - prune directories left empty by deletions
    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn remove_empty_dirs(&self) -> anyhow::Result<()> {
        let root = self.root.clone();
        let removed = tokio::task::spawn_blocking(move || remove_empty_dirs_below(&root)).await??;
        debug!(removed, "removed empty directories");
        Ok(())
    }

    // lock - exclusive, non-blocking advisory lock on flock.lock
    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn lock(&self) -> anyhow::Result<DirLock> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<DirLock> {
            std::fs::create_dir_all(&root)
                .with_context(|| format!("cannot create {}", root.display()))?;
            let lock_path = root.join(LOCK_FILENAME);
            let file = std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&lock_path)
                .with_context(|| format!("cannot open {}", lock_path.display()))?;
            if let Err(e) = file.try_lock_exclusive() {
                if e.kind() == fs2::lock_contended_error().kind() {
                    return Err(FsError::Locked(root).into());
                }
                return Err(FsError::Io(e).into());
            }
            info!(path = %lock_path.display(), "acquired snapshot lock");
            Ok(DirLock::new(move || {
                // unlink while still holding the lock so no one can lock the stale inode
                let _ = std::fs::remove_file(&lock_path);
                let _ = FileExt::unlock(&file);
                drop(file);
                debug!(path = %lock_path.display(), "released snapshot lock");
            }))
        })
        .await?
    }

    // create_marker - empty file in the root
    #[instrument(skip(self))]
    async fn create_marker(&self, name: &str) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(name);
        tokio::fs::write(&path, b"")
            .await
            .with_context(|| format!("cannot create {}", path.display()))?;
        Ok(())
    }

    // remove_marker - idempotent
    #[instrument(skip(self))]
    async fn remove_marker(&self, name: &str) -> anyhow::Result<()> {
        let path = self.root.join(name);
        remove_file_if_exists(&path)
            .await
            .with_context(|| format!("cannot remove {}", path.display()))?;
        Ok(())
    }
}

// ============================================================================
// Unit tests
// ============================================================================
