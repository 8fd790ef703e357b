//! Advisory per-scope lock files.
//!
//! A lock file holds the pid of its holder. A new holder reclaims the file
//! when the recorded process is gone; otherwise it logs a warning and
//! proceeds. This is a best-effort guard, not a mutex.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Outcome of a lock attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    /// The lock file was created by this process.
    Acquired,
    /// A stale lock was removed and recreated.
    Reclaimed { stale_pid: Option<u32> },
    /// Another live process holds the lock; continuing anyway.
    HeldElsewhere { pid: u32 },
}

/// Strategy for guarding a scope directory.
///
/// Platforms without signal probing can substitute lease or heartbeat
/// semantics behind this trait.
pub trait ScopeLock: Send + Sync {
    fn acquire(&self, lock_path: &Path) -> std::io::Result<LockState>;
}

/// Lock file containing the holder's pid, reclaimed when that pid is dead.
#[derive(Debug, Default, Clone, Copy)]
pub struct PidFileLock;

impl PidFileLock {
    fn try_create(lock_path: &Path) -> std::io::Result<bool> {
        match OpenOptions::new().write(true).create_new(true).open(lock_path) {
            Ok(mut file) => {
                write!(file, "{}", std::process::id())?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl ScopeLock for PidFileLock {
    fn acquire(&self, lock_path: &Path) -> std::io::Result<LockState> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if Self::try_create(lock_path)? {
            debug!(path = %lock_path.display(), "Lock acquired");
            return Ok(LockState::Acquired);
        }

        let recorded = std::fs::read_to_string(lock_path)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok());

        match recorded {
            Some(pid) if pid == std::process::id() || process_alive(pid) => {
                if pid != std::process::id() {
                    warn!(
                        path = %lock_path.display(),
                        pid,
                        "Live config lock held by another process, continuing"
                    );
                }
                Ok(LockState::HeldElsewhere { pid })
            }
            stale_pid => {
                let _ = std::fs::remove_file(lock_path);
                if Self::try_create(lock_path)? {
                    debug!(path = %lock_path.display(), ?stale_pid, "Reclaimed stale lock");
                    Ok(LockState::Reclaimed { stale_pid })
                } else {
                    warn!(path = %lock_path.display(), "Lost race reclaiming lock, continuing");
                    Ok(LockState::HeldElsewhere { pid: 0 })
                }
            }
        }
    }
}

/// Probe whether a process exists.
#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs permission and existence checks only.
    let rc = unsafe { libc::kill(pid, 0) };
    if rc == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
}

/// Without a liveness probe every recorded holder is treated as alive.
#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}
