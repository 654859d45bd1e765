//! Rendezvous semaphore (spec §4.2).
//!
//! A single System-V semaphore keyed by `ftok(argv0, 'D')`, mirroring
//! `examples/original_source/source/watchdog.c`'s `SetSemId`/`ChangeSemVal`/
//! `CloseSem`. There is no safe `nix` wrapper for SysV semaphores, so this
//! module talks to `libc` directly.
#![allow(unsafe_code)]

use std::ffi::CString;
use std::io;
use std::path::Path;

use nix::libc;

use crate::error::WatchdogError;

/// Project byte used with `ftok`, matching the original's key.
const PROJECT_ID: libc::c_int = b'D' as libc::c_int;
const RW_PERMS: libc::c_int = 0o600;

/// A startup/post-revival rendezvous point between the two supervised
/// processes, backed by a single semaphore with initial value 0.
pub struct RendezvousSemaphore {
    sem_id: libc::c_int,
}

impl RendezvousSemaphore {
    /// Open (creating if necessary) the semaphore keyed off `key_path`.
    ///
    /// `key_path` must name a file that exists for the lifetime of the
    /// semaphore (the original uses `argv[0]`, the supervised binary
    /// itself).
    pub fn open(key_path: &Path) -> Result<Self, WatchdogError> {
        let c_path = path_to_cstring(key_path)?;
        // SAFETY: `c_path` is a valid NUL-terminated string for the
        // duration of this call.
        let key = unsafe { libc::ftok(c_path.as_ptr(), PROJECT_ID) };
        if key == -1 {
            return Err(WatchdogError::Semaphore {
                details: format!("ftok({}) failed: {}", key_path.display(), io::Error::last_os_error()),
            });
        }

        // SAFETY: `key` is a valid IPC key; `semget` has no other
        // preconditions.
        let sem_id = unsafe { libc::semget(key, 1, RW_PERMS | libc::IPC_CREAT) };
        if sem_id == -1 {
            return Err(WatchdogError::Semaphore {
                details: format!("semget failed: {}", io::Error::last_os_error()),
            });
        }

        Ok(Self { sem_id })
    }

    /// Block until the semaphore's value is non-zero, then decrement it.
    ///
    /// Retries transparently on `EINTR` — a `BEAT`/`STOP` signal arriving
    /// mid-wait must not be mistaken for failure.
    pub fn wait(&self) -> Result<(), WatchdogError> {
        self.op(-1)
    }

    /// Increment the semaphore's value by one, waking a waiter if any.
    pub fn post(&self) -> Result<(), WatchdogError> {
        self.op(1)
    }

    fn op(&self, delta: libc::c_short) -> Result<(), WatchdogError> {
        let mut sem_op = libc::sembuf {
            sem_num: 0,
            sem_op: delta,
            sem_flg: 0,
        };
        loop {
            // SAFETY: `sem_op` is a valid single-element array for this call.
            let rc = unsafe { libc::semop(self.sem_id, &mut sem_op, 1) };
            if rc == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(WatchdogError::Semaphore {
                details: format!("semop failed: {err}"),
            });
        }
    }

    /// Remove the semaphore from the system. Called once, by whichever
    /// process performs final teardown.
    pub fn remove(&self) -> Result<(), WatchdogError> {
        // SAFETY: `self.sem_id` was obtained from a prior successful
        // `semget`.
        let rc = unsafe { libc::semctl(self.sem_id, 0, libc::IPC_RMID) };
        if rc == -1 {
            return Err(WatchdogError::Semaphore {
                details: format!("semctl(IPC_RMID) failed: {}", io::Error::last_os_error()),
            });
        }
        Ok(())
    }
}

fn path_to_cstring(path: &Path) -> Result<CString, WatchdogError> {
    let bytes = path.as_os_str().as_encoded_bytes().to_vec();
    CString::new(bytes).map_err(|err| WatchdogError::Semaphore {
        details: format!("key path contains a NUL byte: {err}"),
    })
}

#[cfg(test)]
mod tests {
    use super::RendezvousSemaphore;
    use std::path::Path;

    #[test]
    fn open_wait_post_round_trip_on_this_binary() {
        // `/proc/self/exe` always exists and is stable for the test's
        // lifetime, making it a valid ftok key path.
        let path = Path::new("/proc/self/exe");
        let sem = RendezvousSemaphore::open(path).expect("open semaphore");

        sem.post().expect("post");
        sem.wait().expect("wait should not block after a post");

        sem.remove().expect("remove");
    }

    #[test]
    fn open_on_a_nonexistent_key_path_fails_cleanly() {
        // ftok requires the key path to name an existing file; a missing
        // path must return an error, not panic.
        let path = Path::new("/nonexistent/rendezvous-test-path");
        let result = RendezvousSemaphore::open(path);
        assert!(result.is_err());
    }
}
