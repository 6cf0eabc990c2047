//! Scoped scratch files: the staged upload and the generated workbook.
//!
//! Every request gets a fresh UUID and both of its files are named after it
//! (`<id>.pdf`, `<id>.xlsx`), so concurrent requests never touch each
//! other's paths. Files are created with create-new semantics: a collision is
//! an error, never a silent overwrite.
//!
//! Ownership is expressed with guards. [`ScratchInput`] and
//! [`OutputArtifact`] delete their file when dropped, on success, on error,
//! and on panic unwinding alike. The [`ArtifactStore`] additionally tracks every
//! live file so [`ArtifactStore::sweep`] can remove leftovers at shutdown.
//! Deleting a file that is already gone is not an error.

use crate::error::Pdf2XlsxError;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-request identifier; names every scratch file the request owns.
pub type RequestId = Uuid;

/// Owner of the scratch directory and registry of live scoped files.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct ArtifactStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    root: PathBuf,
    live: Mutex<HashSet<PathBuf>>,
    // Kept alive so an ephemeral root is removed with the last store handle.
    _ephemeral: Option<TempDir>,
}

impl std::fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&*self.inner, f)
    }
}

impl std::fmt::Debug for StoreInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStore")
            .field("root", &self.root)
            .field("live", &self.live.lock().len())
            .finish()
    }
}

impl ArtifactStore {
    /// Use `root` as the scratch directory, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, Pdf2XlsxError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| Pdf2XlsxError::Scratch {
            path: root.clone(),
            source,
        })?;
        Ok(Self::from_parts(root, None))
    }

    /// Scratch directory under the system temp dir, removed when the last
    /// handle to this store is dropped.
    pub fn ephemeral() -> Result<Self, Pdf2XlsxError> {
        let dir = tempfile::Builder::new()
            .prefix("pdf2xlsx-")
            .tempdir()
            .map_err(|source| Pdf2XlsxError::Scratch {
                path: std::env::temp_dir(),
                source,
            })?;
        Ok(Self::from_parts(dir.path().to_path_buf(), Some(dir)))
    }

    fn from_parts(root: PathBuf, ephemeral: Option<TempDir>) -> Self {
        debug!("Scratch directory: {}", root.display());
        Self {
            inner: Arc::new(StoreInner {
                root,
                live: Mutex::new(HashSet::new()),
                _ephemeral: ephemeral,
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Number of scoped files currently alive.
    pub fn live_count(&self) -> usize {
        self.inner.live.lock().len()
    }

    /// Persist an uploaded document to `<id>.pdf` for the PDF engine to read.
    ///
    /// The guard is created on the blocking thread as soon as the file
    /// exists, so a caller that stops waiting still leaves the file
    /// registered, and the abandoned guard removes it.
    pub async fn stage_input(
        &self,
        id: RequestId,
        bytes: Vec<u8>,
    ) -> Result<ScratchInput, Pdf2XlsxError> {
        let path = self.inner.root.join(format!("{id}.pdf"));
        let store = Arc::clone(&self.inner);

        let write_path = path.clone();
        let file = tokio::task::spawn_blocking(move || write_new(store, write_path, &bytes))
            .await
            .map_err(|e| Pdf2XlsxError::Internal(format!("Staging task panicked: {e}")))?
            .map_err(|source| Pdf2XlsxError::Scratch {
                path: path.clone(),
                source,
            })?;

        debug!("Staged input at {}", path.display());
        Ok(ScratchInput { file })
    }

    /// Reserve `<id>.xlsx` for the workbook. The file itself is created by
    /// whoever writes the workbook; the guard removes it either way.
    pub fn reserve_output(&self, id: RequestId) -> OutputArtifact {
        let path = self.inner.root.join(format!("{id}.xlsx"));
        OutputArtifact {
            file: ScopedFile::register(Arc::clone(&self.inner), path),
        }
    }

    /// Remove every file still registered. Returns how many were removed.
    ///
    /// Intended for graceful shutdown, when requests may have been abandoned
    /// mid-flight. Guards that are dropped afterwards find their file gone
    /// and do nothing.
    pub fn sweep(&self) -> usize {
        let paths: Vec<PathBuf> = self.inner.live.lock().drain().collect();
        let mut removed = 0;
        for path in &paths {
            if remove_quietly(path) {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("Swept {} leftover scratch file(s)", removed);
        }
        removed
    }
}

/// Create `path` exclusively, register it, then write `bytes` to it.
///
/// Registration happens only once the create succeeded: a collision must not
/// hand out a guard that would delete a file some other request owns. A
/// partially written file is removed by the guard before the error returns.
fn write_new(store: Arc<StoreInner>, path: PathBuf, bytes: &[u8]) -> io::Result<ScopedFile> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)?;
    let guard = ScopedFile::register(store, path);
    if let Err(e) = file.write_all(bytes).and_then(|()| file.sync_all()) {
        drop(file);
        drop(guard);
        return Err(e);
    }
    Ok(guard)
}

/// Delete `path`, treating "already gone" as success. Returns `true` if a
/// file was actually removed.
fn remove_quietly(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Failed to remove scratch file {}: {}", path.display(), e);
            false
        }
    }
}

/// A registered path that is deleted and unregistered on drop.
#[derive(Debug)]
struct ScopedFile {
    store: Arc<StoreInner>,
    path: PathBuf,
}

impl ScopedFile {
    fn register(store: Arc<StoreInner>, path: PathBuf) -> Self {
        store.live.lock().insert(path.clone());
        Self { store, path }
    }
}

impl Drop for ScopedFile {
    fn drop(&mut self) {
        remove_quietly(&self.path);
        self.store.live.lock().remove(&self.path);
    }
}

/// The uploaded document on disk, alive only for the extraction stage.
#[derive(Debug)]
pub struct ScratchInput {
    file: ScopedFile,
}

impl ScratchInput {
    pub fn path(&self) -> &Path {
        &self.file.path
    }
}

/// The generated workbook on disk, removed when this guard is dropped.
#[derive(Debug)]
pub struct OutputArtifact {
    file: ScopedFile,
}

impl OutputArtifact {
    pub fn path(&self) -> &Path {
        &self.file.path
    }

    /// Read the whole workbook into memory.
    pub async fn read(&self) -> Result<Vec<u8>, Pdf2XlsxError> {
        tokio::fs::read(self.path())
            .await
            .map_err(|source| Pdf2XlsxError::Scratch {
                path: self.path().to_path_buf(),
                source,
            })
    }

    /// Copy the workbook to `dest` (temp file + rename, so `dest` is never
    /// left half-written), then drop the scratch copy.
    pub async fn persist(self, dest: &Path) -> Result<(), Pdf2XlsxError> {
        let write_err = |source: io::Error| Pdf2XlsxError::Scratch {
            path: dest.to_path_buf(),
            source,
        };

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let tmp_path = dest.with_extension("xlsx.tmp");
        if let Err(source) = tokio::fs::copy(self.path(), &tmp_path).await {
            remove_quietly(&tmp_path);
            return Err(write_err(source));
        }
        if let Err(source) = tokio::fs::rename(&tmp_path, dest).await {
            remove_quietly(&tmp_path);
            return Err(write_err(source));
        }
        Ok(())
    }
}
