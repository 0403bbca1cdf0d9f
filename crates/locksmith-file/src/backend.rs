//! File-based lock backend.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use locksmith_core::error::{LockError, LockResult};
use locksmith_core::token::Token;
use locksmith_core::traits::LockBackend;
use tracing::{debug, instrument, warn};

use crate::handle::FileLockHandle;
use crate::name::lock_file_path;

/// Attempts made when the lock directory disappears between creating it and
/// opening a file inside it.
const MAX_OPEN_RETRIES: u32 = 16;

/// Builder for [`FileBackend`].
#[derive(Debug, Default)]
pub struct FileBackendBuilder {
    directory: Option<PathBuf>,
}

impl FileBackendBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the directory for lock files.
    ///
    /// The directory will be created if it doesn't exist.
    pub fn directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.directory = Some(path.into());
        self
    }

    /// Builds the backend.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Configuration`] if no directory is specified and
    /// [`LockError::BackendUnavailable`] if it cannot be created.
    pub fn build(self) -> LockResult<FileBackend> {
        let directory = self
            .directory
            .ok_or_else(|| LockError::Configuration("lock directory not specified".to_string()))?;

        std::fs::create_dir_all(&directory)
            .map_err(|e| LockError::unavailable(format!("file:{}", directory.display()), e))?;

        Ok(FileBackend::from_directory(directory))
    }
}

/// Advisory file lock per key.
///
/// Each key maps to one file inside the backend's directory (see
/// [`crate::name`]). Holding the lock means holding an exclusive OS lock on
/// that file, so it is visible to every process sharing the directory and is
/// dropped by the OS if the holder dies. The TTL argument is ignored.
///
/// Lock files are left in place on release: deleting them would let a waiter
/// that already opened the old file lock an unlinked inode.
pub struct FileBackend {
    directory: PathBuf,
    name: String,
    held: Mutex<HashMap<String, HeldFile>>,
}

struct HeldFile {
    token: Token,
    _handle: FileLockHandle,
}

impl FileBackend {
    /// Returns a new builder for configuring the backend.
    pub fn builder() -> FileBackendBuilder {
        FileBackendBuilder::new()
    }

    /// Creates a backend using the specified directory.
    pub fn new(directory: impl Into<PathBuf>) -> LockResult<Self> {
        Self::builder().directory(directory).build()
    }

    fn from_directory(directory: PathBuf) -> Self {
        let name = format!("file:{}", directory.display());
        Self {
            directory,
            name,
            held: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the directory where lock files are stored.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Returns the lock file used for `key`.
    pub fn lock_path(&self, key: &str) -> LockResult<PathBuf> {
        lock_file_path(&self.directory, key)
    }

    fn open_lock_file(&self, path: &Path) -> LockResult<std::fs::File> {
        let mut retries = 0;
        loop {
            let result = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                // Never truncate: the file may be locked by someone else.
                .truncate(false)
                .open(path);

            match result {
                Ok(file) => return Ok(file),
                Err(e) if e.kind() == ErrorKind::NotFound && retries < MAX_OPEN_RETRIES => {
                    retries += 1;
                    std::fs::create_dir_all(&self.directory)
                        .map_err(|e| LockError::unavailable(self.name.clone(), e))?;
                }
                Err(_) if path.is_dir() => {
                    return Err(LockError::InvalidKey(format!(
                        "lock file '{}' is already the name of a directory",
                        path.display()
                    )));
                }
                Err(e) => return Err(LockError::unavailable(self.name.clone(), e)),
            }
        }
    }
}

impl LockBackend for FileBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_expiry(&self) -> bool {
        false
    }

    #[instrument(skip(self, token, _ttl), fields(backend = "file", lock.key = %key))]
    async fn try_acquire(&self, key: &str, token: &Token, _ttl: Duration) -> LockResult<bool> {
        let path = self.lock_path(key)?;

        // Fast path: this process already holds the key.
        if self
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
        {
            return Ok(false);
        }

        let file = self.open_lock_file(&path)?;
        let mut handle = match FileLockHandle::try_new(file) {
            Ok(Some(handle)) => handle,
            Ok(None) => return Ok(false),
            Err(e) => return Err(LockError::unavailable(self.name.clone(), e)),
        };

        if let Err(e) = handle.record_holder(token.as_str()) {
            warn!(path = %path.display(), error = %e, "failed to record lock holder");
        }

        self.held.lock().unwrap_or_else(PoisonError::into_inner).insert(
            key.to_string(),
            HeldFile {
                token: token.clone(),
                _handle: handle,
            },
        );
        debug!(path = %path.display(), "file lock acquired");
        Ok(true)
    }

    #[instrument(skip(self, token), fields(backend = "file", lock.key = %key))]
    async fn release(&self, key: &str, token: &Token) -> LockResult<bool> {
        let released = {
            let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
            let owned = held.get(key).is_some_and(|entry| entry.token == *token);
            if owned { held.remove(key) } else { None }
        };

        match released {
            Some(entry) => {
                // Dropping the handle unlocks the file.
                drop(entry);
                debug!("file lock released");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
