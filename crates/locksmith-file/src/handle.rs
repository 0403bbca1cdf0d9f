//! Owned advisory lock on an open file.

use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::mem::ManuallyDrop;
use std::ptr::NonNull;

use fd_lock::{RwLock, RwLockWriteGuard};

/// Exclusive OS lock on a file, released when dropped.
///
/// `fd_lock` guards borrow the lock they came from; this type owns both so the
/// guard can live in a map next to the token it belongs to.
pub(crate) struct FileLockHandle {
    guard: ManuallyDrop<RwLockWriteGuard<'static, File>>,
    lock: NonNull<RwLock<File>>,
}

// SAFETY: the handle uniquely owns the heap allocation behind `lock`; the
// guard is the only borrow of it and moves together with the handle.
unsafe impl Send for FileLockHandle {}
unsafe impl Sync for FileLockHandle {}

impl FileLockHandle {
    /// Tries to take the exclusive lock without blocking.
    ///
    /// Returns `Ok(None)` when another descriptor holds the lock, and `Err`
    /// for genuine I/O failures.
    pub(crate) fn try_new(file: File) -> io::Result<Option<Self>> {
        let lock = NonNull::from(Box::leak(Box::new(RwLock::new(file))));

        // SAFETY: `lock` points to a live allocation that nothing else borrows.
        let attempt = unsafe { (*lock.as_ptr()).try_write() };
        match attempt {
            Ok(guard) => {
                // SAFETY: the allocation is only freed in `Drop`, after the
                // guard has been dropped, so extending the borrow is sound.
                let guard: RwLockWriteGuard<'static, File> = unsafe { std::mem::transmute(guard) };
                Ok(Some(Self {
                    guard: ManuallyDrop::new(guard),
                    lock,
                }))
            }
            Err(e) => {
                // SAFETY: the failed attempt left no borrow behind.
                drop(unsafe { Box::from_raw(lock.as_ptr()) });
                if is_contended(&e) { Ok(None) } else { Err(e) }
            }
        }
    }

    /// Overwrites the file contents with the holder's token.
    pub(crate) fn record_holder(&mut self, token: &str) -> io::Result<()> {
        let file: &mut File = &mut self.guard;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(token.as_bytes())?;
        file.flush()
    }
}

impl Drop for FileLockHandle {
    fn drop(&mut self) {
        // SAFETY: the guard is dropped exactly once, before the allocation it
        // borrows is freed.
        unsafe {
            ManuallyDrop::drop(&mut self.guard);
            drop(Box::from_raw(self.lock.as_ptr()));
        }
    }
}

fn is_contended(error: &io::Error) -> bool {
    if error.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    // ERROR_LOCK_VIOLATION
    cfg!(windows) && error.raw_os_error() == Some(33)
}
