//! The corpus-wide writer lock (§4.10): one OS-backed advisory lock so two
//! processes sharing a data directory can never both run an indexing job.
//! Adapted directly from the single-writer file lock used elsewhere in this
//! crate's storage layer, minus the shared-lock mode this job never needs.

use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::core::error::{Error, Result};

pub struct CorpusLock {
    _file: File,
}

impl CorpusLock {
    /// Attempts to acquire the exclusive lock without blocking. Failure is
    /// reported as a transient error — the job runtime is expected to treat
    /// it as "nothing enqueued" rather than wait.
    pub fn try_acquire(lock_path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).write(true).open(lock_path)?;

        #[cfg(unix)]
        {
            use libc::{flock, LOCK_EX, LOCK_NB};
            use std::os::unix::io::AsRawFd;

            let fd = file.as_raw_fd();
            let rc = unsafe { flock(fd, LOCK_EX | LOCK_NB) };
            if rc != 0 {
                return Err(Error::transient("corpus lock already held by another indexing job"));
            }
        }

        Ok(CorpusLock { _file: file })
    }
}

impl Drop for CorpusLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use libc::{flock, LOCK_UN};
            use std::os::unix::io::AsRawFd;

            let fd = self._file.as_raw_fd();
            unsafe {
                flock(fd, LOCK_UN);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquire_fails_while_first_is_held() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".lock");
        let first = CorpusLock::try_acquire(&path).unwrap();
        assert!(CorpusLock::try_acquire(&path).is_err());
        drop(first);
        assert!(CorpusLock::try_acquire(&path).is_ok());
    }
}
