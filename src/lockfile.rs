//! advisory file locks with a last-writer marker
//!
//! the lock file doubles as a change detector: whoever writes the protected
//! data stores a fresh random writer ID in it (`touch`). other handles compare
//! the file contents with the last ID they saw (`modified`) to find out
//! whether their in-memory copy is stale.

use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tracing::debug;

use crate::error::{Error, IoResultExt, Result};

/// a lock file shared between processes
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
    read_only: bool,
    last_writer: String,
}

/// guard that holds a lock until dropped
pub struct LockGuard {
    #[allow(dead_code)]
    flock: Flock<File>,
}
// lock is released automatically when Flock is dropped

impl LockFile {
    /// open a read-write lock file, creating it if necessary
    ///
    /// the returned handle is unlocked.
    pub fn open(path: &Path) -> Result<Self> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(path)
            .with_path(path)?;
        Self::new(path, false)
    }

    /// open an existing lock file for shared use only
    pub fn open_read_only(path: &Path) -> Result<Self> {
        File::open(path).with_path(path)?;
        Self::new(path, true)
    }

    fn new(path: &Path, read_only: bool) -> Result<Self> {
        let last_writer = read_writer(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            read_only,
            last_writer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// acquire the exclusive lock, waiting for other holders
    pub fn lock(&self) -> Result<LockGuard> {
        self.ensure_writable()?;
        self.acquire(FlockArg::LockExclusive)
    }

    /// acquire a shared lock, waiting for an exclusive holder
    pub fn lock_shared(&self) -> Result<LockGuard> {
        self.acquire(FlockArg::LockShared)
    }

    /// try to acquire the exclusive lock, returning None if it is held elsewhere
    pub fn try_lock(&self) -> Result<Option<LockGuard>> {
        self.ensure_writable()?;
        match self.acquire(FlockArg::LockExclusiveNonblock) {
            Ok(guard) => Ok(Some(guard)),
            Err(Error::Io { source, .. })
                if source.raw_os_error() == Some(Errno::EWOULDBLOCK as i32) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn acquire(&self, arg: FlockArg) -> Result<LockGuard> {
        // every acquisition uses its own open file description so that two
        // handles in one process exclude each other like two processes would
        let file = if self.read_only {
            File::open(&self.path)
        } else {
            OpenOptions::new().read(true).write(true).open(&self.path)
        }
        .with_path(&self.path)?;

        let flock = Flock::lock(file, arg).map_err(|(_, errno)| Error::Io {
            path: self.path.clone(),
            source: std::io::Error::from(errno),
        })?;
        Ok(LockGuard { flock })
    }

    /// record that this handle just changed the protected data
    pub fn touch(&mut self) -> Result<()> {
        self.ensure_writable()?;

        let writer = uuid::Uuid::new_v4().to_string();
        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .with_path(&self.path)?;
        file.write_all_at(writer.as_bytes(), 0).with_path(&self.path)?;
        file.set_len(writer.len() as u64).with_path(&self.path)?;
        file.sync_all().with_path(&self.path)?;

        debug!(path = %self.path.display(), writer = %writer, "touched lock file");
        self.last_writer = writer;
        Ok(())
    }

    /// whether someone else touched the lock since this handle last looked
    pub fn modified(&mut self) -> Result<bool> {
        let current = read_writer(&self.path)?;
        let changed = current != self.last_writer;
        self.last_writer = current;
        Ok(changed)
    }

    /// writer ID seen by the latest `touch` or `modified`
    pub fn last_writer(&self) -> &str {
        &self.last_writer
    }

    /// go back to an earlier observed writer ID, so that `modified` reports
    /// the current one again
    pub(crate) fn restore_writer(&mut self, writer: String) {
        self.last_writer = writer;
    }

    /// whether the lock file was touched after `when`
    pub fn touched_since(&self, when: SystemTime) -> bool {
        match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(mtime) => mtime > when,
            Err(_) => true,
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(Error::ReadOnlyLock(self.path.clone()));
        }
        Ok(())
    }
}

fn read_writer(path: &Path) -> Result<String> {
    let mut contents = String::new();
    File::open(path)
        .and_then(|mut f| f.read_to_string(&mut contents))
        .with_path(path)?;
    Ok(contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("images.lock");

        let lock = LockFile::open(&path).unwrap();
        assert!(path.is_file());
        assert!(!lock.is_read_only());
    }

    #[test]
    fn test_open_read_only_requires_file() {
        let dir = tempdir().unwrap();
        let result = LockFile::open_read_only(&dir.path().join("missing.lock"));
        assert!(matches!(result, Err(Error::Io { .. })));
    }

    #[test]
    fn test_exclusive_lock_excludes_other_handles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("images.lock");
        let a = LockFile::open(&path).unwrap();
        let b = LockFile::open(&path).unwrap();

        let guard = a.lock().unwrap();
        assert!(b.try_lock().unwrap().is_none());

        drop(guard);
        assert!(b.try_lock().unwrap().is_some());
    }

    #[test]
    fn test_shared_locks_coexist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("images.lock");
        let a = LockFile::open(&path).unwrap();
        let b = LockFile::open_read_only(&path).unwrap();

        let _g1 = a.lock_shared().unwrap();
        let _g2 = b.lock_shared().unwrap();
        assert!(a.try_lock().unwrap().is_none());
    }

    #[test]
    fn test_read_only_handle_rejects_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("images.lock");
        LockFile::open(&path).unwrap();

        let mut ro = LockFile::open_read_only(&path).unwrap();
        assert!(matches!(ro.lock(), Err(Error::ReadOnlyLock(_))));
        assert!(matches!(ro.try_lock(), Err(Error::ReadOnlyLock(_))));
        assert!(matches!(ro.touch(), Err(Error::ReadOnlyLock(_))));
    }

    #[test]
    fn test_touch_and_modified() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("images.lock");
        let mut writer = LockFile::open(&path).unwrap();
        let mut reader = LockFile::open_read_only(&path).unwrap();

        assert!(!reader.modified().unwrap());

        writer.touch().unwrap();
        assert!(!writer.modified().unwrap());
        assert!(reader.modified().unwrap());
        // the new state has now been observed
        assert!(!reader.modified().unwrap());

        writer.touch().unwrap();
        assert!(reader.modified().unwrap());
    }

    #[test]
    fn test_restore_writer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("images.lock");
        let mut writer = LockFile::open(&path).unwrap();
        let mut reader = LockFile::open(&path).unwrap();

        let seen = reader.last_writer().to_string();
        writer.touch().unwrap();
        assert!(reader.modified().unwrap());
        assert_eq!(reader.last_writer(), writer.last_writer());

        reader.restore_writer(seen);
        assert!(reader.modified().unwrap());
        assert!(!reader.modified().unwrap());
    }

    #[test]
    fn test_touched_since() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("images.lock");
        let mut lock = LockFile::open(&path).unwrap();

        let before = SystemTime::now() - Duration::from_secs(60);
        lock.touch().unwrap();
        assert!(lock.touched_since(before));

        let later = SystemTime::now() + Duration::from_secs(60);
        assert!(!lock.touched_since(later));
    }
}
