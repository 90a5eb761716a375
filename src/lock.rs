//! One `cm` process at a time per data directory.
//!
//! Each table is kept in memory and rewritten whole on every change, so two
//! processes writing the same directory would silently drop each other's rows.
//! `cm.lock` carries a non-blocking `flock`: a CLI command keeps it for one
//! invocation, `cm daemon` until shutdown. While the daemon runs, CLI commands
//! fail immediately and changes go through its web UI or JSON API.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "cm.lock";

pub fn lock_path(base_path: &Path) -> PathBuf {
    base_path.join(LOCK_FILE)
}

/// Exclusive claim on a data directory, released when dropped.
pub struct DataDirLock {
    file: File,
}

impl DataDirLock {
    /// Claims `base_path` or fails with `WouldBlock` when another `cm`
    /// process already has it.
    pub fn claim(base_path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path(base_path))?;

        if !flock(&file, Flock::TryExclusive)? {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                format!(
                    "{} is in use by another cm process; stop `cm daemon` or wait for the running command",
                    base_path.display()
                ),
            ));
        }

        Ok(DataDirLock { file })
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        if let Err(err) = flock(&self.file, Flock::Release) {
            log::warn!("couldnt release {LOCK_FILE}: {err}");
        }
    }
}

#[cfg_attr(not(unix), allow(dead_code))]
enum Flock {
    TryExclusive,
    Release,
}

/// `Ok(false)` means the lock is held elsewhere.
#[cfg(unix)]
fn flock(file: &File, op: Flock) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    let op = match op {
        Flock::TryExclusive => libc::LOCK_EX | libc::LOCK_NB,
        Flock::Release => libc::LOCK_UN,
    };
    if unsafe { libc::flock(file.as_raw_fd(), op) } == 0 {
        return Ok(true);
    }

    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(code) if code == libc::EWOULDBLOCK || code == libc::EAGAIN => Ok(false),
        _ => Err(err),
    }
}

// advisory locks are unix only; elsewhere every claim succeeds
#[cfg(not(unix))]
fn flock(_file: &File, _op: Flock) -> io::Result<bool> {
    Ok(true)
}
