use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::trace;

/// Exclusive advisory lock on `<target>.lock`, released when dropped.
///
/// Serializes read-modify-write cycles on shared files such as `~/.aws/config`
/// between concurrent invocations.
#[derive(Debug)]
pub struct FileLockGuard {
    file: File,
    lock_path: PathBuf,
}

pub fn lock_path_for(target: &Path) -> PathBuf {
    let mut lock_path = target.as_os_str().to_owned();
    lock_path.push(".lock");
    PathBuf::from(lock_path)
}

impl FileLockGuard {
    pub fn acquire(target: &Path) -> io::Result<Self> {
        let lock_path = lock_path_for(target);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        file.lock()?;
        trace!(path = %lock_path.display(), "acquired file lock");
        Ok(Self { file, lock_path })
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        trace!(path = %self.lock_path.display(), "released file lock");
    }
}
