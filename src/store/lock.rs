use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::{AgoraError, Result};

/// Poll interval for threads of this process queued on the same path.
const LOCAL_POLL: Duration = Duration::from_millis(1);

/// Per-path mutexes shared by every lock manager in the process. An entry
/// lives only while some caller holds or waits on it.
static LOCAL_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Contents of a `<target>.lock` marker file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LockMarker {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

/// Path of the marker file guarding `target`.
pub fn marker_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    target.with_file_name(name)
}

/// Mutual exclusion over file paths, across threads and processes.
///
/// A lock on `target` is held by exclusively creating `target.lock`. Markers
/// whose recorded pid no longer exists are treated as stale and removed.
/// Locking the same path twice in one call chain deadlocks until timeout.
#[derive(Debug, Clone)]
pub struct LockManager {
    timeout: Duration,
    retry_interval: Duration,
}

impl LockManager {
    pub fn new(timeout: Duration, retry_interval: Duration) -> Self {
        Self {
            timeout,
            retry_interval,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.lock_timeout, config.lock_retry_interval)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `op` while holding the lock on `target`.
    ///
    /// The marker is removed after `op` returns, whether or not it failed.
    pub fn with_lock<T, F>(&self, target: &Path, op: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let start = Instant::now();
        let deadline = start + self.timeout;
        let marker = marker_path(target);
        if let Some(parent) = marker.parent() {
            fs::create_dir_all(parent)?;
        }

        let key = local_key(&marker);
        let local = local_mutex(&key);
        let result = self.run_locked(&local, &marker, start, deadline, op);
        release_local(&key, local);
        result
    }

    fn run_locked<T, F>(
        &self,
        local: &Mutex<()>,
        marker: &Path,
        start: Instant,
        deadline: Instant,
        op: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let _local_guard =
            lock_local(local, deadline).ok_or_else(|| timeout_error(marker, start))?;
        let _marker_guard = self.acquire_marker(marker, start, deadline)?;
        op()
    }

    fn acquire_marker(
        &self,
        marker: &Path,
        start: Instant,
        deadline: Instant,
    ) -> Result<MarkerGuard> {
        loop {
            match OpenOptions::new().write(true).create_new(true).open(marker) {
                Ok(mut file) => {
                    let guard = MarkerGuard {
                        path: marker.to_path_buf(),
                    };
                    let owner = LockMarker {
                        pid: std::process::id(),
                        acquired_at: Utc::now(),
                    };
                    file.write_all(serde_json::to_string(&owner)?.as_bytes())?;
                    return Ok(guard);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if self.clear_if_stale(marker)? {
                        continue;
                    }
                }
                Err(e) => return Err(e.into()),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(timeout_error(marker, start));
            }
            debug!(path = %marker.display(), "lock busy, backing off");
            std::thread::sleep(self.retry_interval.min(deadline - now));
        }
    }

    /// Remove `marker` if its owner is gone. Returns true when it was removed
    /// (or vanished on its own), meaning the caller should retry at once.
    fn clear_if_stale(&self, marker: &Path) -> Result<bool> {
        let content = match fs::read_to_string(marker) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };

        let stale = match serde_json::from_str::<LockMarker>(&content) {
            // This thread holds the process-local mutex for the path, so a
            // marker carrying our own pid is a leftover from a failed release.
            Ok(owner) => owner.pid == std::process::id() || !pid_alive(owner.pid),
            // Owner may still be writing its marker; only give up on it once
            // it has sat unreadable for longer than a full lock timeout.
            Err(_) => marker_age(marker).is_some_and(|age| age > self.timeout),
        };
        if !stale {
            return Ok(false);
        }

        // Re-check right before removing so a marker freshly created by a
        // competitor that cleared the same stale one is left alone.
        match fs::read_to_string(marker) {
            Ok(current) if current == content => {}
            Ok(_) => return Ok(false),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        }
        match fs::remove_file(marker) {
            Ok(()) => {
                debug!(path = %marker.display(), owner = %content, "removed stale lock marker");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_LOCK_TIMEOUT,
            crate::config::DEFAULT_LOCK_RETRY_INTERVAL,
        )
    }
}

/// Removes the marker file when dropped.
struct MarkerGuard {
    path: PathBuf,
}

impl Drop for MarkerGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove lock marker");
        }
    }
}

fn timeout_error(marker: &Path, start: Instant) -> AgoraError {
    AgoraError::LockTimeout {
        path: marker.display().to_string(),
        waited_ms: start.elapsed().as_millis() as u64,
    }
}

/// Registry key: the marker path with its directory canonicalized, so two
/// spellings of the same directory share one mutex.
fn local_key(marker: &Path) -> PathBuf {
    match (marker.parent(), marker.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|dir| dir.join(name))
            .unwrap_or_else(|_| marker.to_path_buf()),
        _ => marker.to_path_buf(),
    }
}

fn local_mutex(key: &Path) -> Arc<Mutex<()>> {
    let mut map = LOCAL_LOCKS.lock().unwrap_or_else(|e| e.into_inner());
    Arc::clone(
        map.entry(key.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(()))),
    )
}

/// Drop the registry entry for `key` once no other caller references it.
/// Clones are only taken under the registry lock, so a count of two (the map
/// and `local`) cannot grow while we decide.
fn release_local(key: &Path, local: Arc<Mutex<()>>) {
    let mut map = LOCAL_LOCKS.lock().unwrap_or_else(|e| e.into_inner());
    let unused = map
        .get(key)
        .is_some_and(|entry| Arc::ptr_eq(entry, &local) && Arc::strong_count(&local) == 2);
    if unused {
        map.remove(key);
    }
}

fn lock_local(mutex: &Mutex<()>, deadline: Instant) -> Option<MutexGuard<'_, ()>> {
    loop {
        match mutex.try_lock() {
            Ok(guard) => return Some(guard),
            // The mutex guards no data, so a panic in another holder leaves
            // nothing inconsistent behind.
            Err(TryLockError::Poisoned(poisoned)) => return Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {
                if Instant::now() >= deadline {
                    return None;
                }
                std::thread::sleep(LOCAL_POLL);
            }
        }
    }
}

fn marker_age(marker: &Path) -> Option<Duration> {
    fs::metadata(marker)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
}

/// Whether a process with this pid currently exists.
#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        // Exists, but belongs to someone we may not signal.
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    // No cheap liveness probe; stale markers must be removed by hand.
    true
}
