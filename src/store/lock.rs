//! Scoped advisory file locks.
//!
//! One lock file serializes all mutation within a directory (a team's
//! inboxes share one, a team's tasks share one, the team config has its
//! own). The lock is an OS-level exclusive advisory lock, released on every
//! exit path by the guard's `Drop`. Nested acquisition of the same lock is
//! not permitted, and holders must not perform subprocess spawns or sleeps
//! while the guard lives.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::{Result, TeamsError};

/// RAII guard for an exclusive advisory lock on a lock file.
#[derive(Debug)]
pub struct ScopedLock {
    file: File,
    path: PathBuf,
}

impl ScopedLock {
    /// Create the lock file if absent and block until the exclusive lock is
    /// acquired.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| TeamsError::Storage(format!("open lock {}: {}", path.display(), e)))?;
        file.lock()
            .map_err(|e| TeamsError::Storage(format!("lock {}: {}", path.display(), e)))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_creates_lock_file() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("sub").join(".lock");
        let guard = ScopedLock::acquire(&lock_path).unwrap();
        assert!(lock_path.exists());
        assert_eq!(guard.path(), lock_path);
    }

    #[test]
    fn test_reacquire_after_drop() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join(".lock");
        drop(ScopedLock::acquire(&lock_path).unwrap());
        // Released on drop: a second acquisition must not block.
        let _guard = ScopedLock::acquire(&lock_path).unwrap();
    }

    #[test]
    fn test_serializes_concurrent_read_modify_write() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join(".lock");
        let counter_path = dir.path().join("counter");
        std::fs::write(&counter_path, "0").unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let lock_path = lock_path.clone();
            let counter_path = counter_path.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..25 {
                    let _guard = ScopedLock::acquire(&lock_path).unwrap();
                    let n: u64 = std::fs::read_to_string(&counter_path)
                        .unwrap()
                        .trim()
                        .parse()
                        .unwrap();
                    std::fs::write(&counter_path, (n + 1).to_string()).unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let n: u64 = std::fs::read_to_string(&counter_path)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert_eq!(n, 100);
    }
}
