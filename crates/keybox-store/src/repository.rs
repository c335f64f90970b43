//! Byte persistence for the box document

use anyhow::Context;
use keybox_core::KeyboxResult;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Loads and saves the serialized box as an opaque blob.
///
/// An empty blob is a valid "new store" state.
pub trait Repository: Send + Sync {
    fn load(&self) -> KeyboxResult<Vec<u8>>;
    fn save(&self, data: &[u8]) -> KeyboxResult<()>;
}

/// Repository backed by a single file. A missing file loads as empty.
#[derive(Debug, Clone)]
pub struct FileRepository {
    path: PathBuf,
}

impl FileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Repository for FileRepository {
    fn load(&self) -> KeyboxResult<Vec<u8>> {
        match std::fs::read(&self.path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("store file not found: {} (new store)", self.path.display());
                Ok(Vec::new())
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("reading store: {}", self.path.display()))
                .into()),
        }
    }

    fn save(&self, data: &[u8]) -> KeyboxResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating store dir: {}", parent.display()))?;
            }
        }
        std::fs::write(&self.path, data)
            .with_context(|| format!("writing store: {}", self.path.display()))?;
        restrict_permissions(&self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> KeyboxResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("setting permissions: {}", path.display()))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> KeyboxResult<()> {
    Ok(())
}

/// In-memory repository, used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemRepository {
    data: Mutex<Vec<u8>>,
    saves: Mutex<usize>,
}

impl MemRepository {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Mutex::new(data),
            saves: Mutex::new(0),
        }
    }

    /// Copy of the currently stored bytes
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.lock().map(|d| d.clone()).unwrap_or_default()
    }

    /// Number of successful `save` calls
    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|n| *n).unwrap_or_default()
    }
}

impl Repository for MemRepository {
    fn load(&self) -> KeyboxResult<Vec<u8>> {
        let data = self
            .data
            .lock()
            .map_err(|_| anyhow::anyhow!("memory repository lock poisoned"))?;
        Ok(data.clone())
    }

    fn save(&self, data: &[u8]) -> KeyboxResult<()> {
        let mut stored = self
            .data
            .lock()
            .map_err(|_| anyhow::anyhow!("memory repository lock poisoned"))?;
        *stored = data.to_vec();
        if let Ok(mut saves) = self.saves.lock() {
            *saves += 1;
        }
        Ok(())
    }
}
