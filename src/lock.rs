//! Writer lock on the data directory.
//!
//! `classify`, `aggregate` and `embed` rewrite the store files, so each holds
//! a non-blocking exclusive `flock` on `<base>/faultfinder.lock` for its run.
//! Read-only commands never take it.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

const LOCK_FILE: &str = "faultfinder.lock";

/// Held for as long as the value lives.
pub struct DirLock {
    #[cfg_attr(not(unix), allow(dead_code))]
    file: File,
}

impl DirLock {
    /// Lock `dir` or fail with `WouldBlock` when another job already has it.
    pub fn acquire(dir: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?;
        lock_exclusive(&file).map_err(|err| match err.kind() {
            io::ErrorKind::WouldBlock => io::Error::new(
                io::ErrorKind::WouldBlock,
                format!("another faultfinder job is writing {}", dir.display()),
            ),
            _ => err,
        })?;
        Ok(Self { file })
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> io::Result<()> {
    // EWOULDBLOCK and EAGAIN both map to ErrorKind::WouldBlock
    match unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } {
        0 => Ok(()),
        _ => Err(io::Error::last_os_error()),
    }
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
impl Drop for DirLock {
    fn drop(&mut self) {
        unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
    }
}
