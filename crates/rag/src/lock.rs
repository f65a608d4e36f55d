use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(0);

#[derive(Error, Debug)]
#[error("timed out after {waited:?} waiting for build lock {path:?}")]
pub struct BuildLockTimeout {
    pub path: PathBuf,
    pub waited: Duration,
}

/// Exclusive, cross-process guard over artifact builds.
///
/// Held as a lock file created with `create_new` and stamped with an owner
/// token; released on drop only while the file still carries that token. A
/// lock file older than `stale_after` is treated as abandoned by a crashed
/// builder and reclaimed by renaming it aside, so one waiter wins.
#[derive(Debug)]
pub struct BuildLock {
    path: PathBuf,
    token: String,
}

impl BuildLock {
    pub fn acquire(path: &Path, timeout: Duration, stale_after: Duration) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let token = owner_token();
        let started = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    if let Err(err) = writeln!(file, "{token}").and_then(|_| file.sync_all()) {
                        let _ = fs::remove_file(path);
                        return Err(err)
                            .with_context(|| format!("failed to write lock {}", path.display()));
                    }
                    tracing::debug!(lock = %path.display(), %token, "acquired build lock");
                    return Ok(Self {
                        path: path.to_path_buf(),
                        token,
                    });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    if is_stale(path, stale_after) && reclaim(path, &token, stale_after) {
                        continue;
                    }
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(BuildLockTimeout {
                            path: path.to_path_buf(),
                            waited,
                        }
                        .into());
                    }
                    sleep(POLL_INTERVAL.min(timeout - waited));
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("failed to create lock {}", path.display()))
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        match fs::read_to_string(&self.path) {
            Ok(owner) if owner.trim() == self.token => {
                if let Err(err) = fs::remove_file(&self.path) {
                    if err.kind() != ErrorKind::NotFound {
                        tracing::warn!(
                            lock = %self.path.display(),
                            error = %err,
                            "failed to release build lock"
                        );
                    }
                }
            }
            Ok(owner) => {
                tracing::warn!(
                    lock = %self.path.display(),
                    owner = owner.trim(),
                    "build lock was reclaimed by another builder; leaving it in place"
                );
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(
                    lock = %self.path.display(),
                    error = %err,
                    "failed to read build lock"
                );
            }
        }
    }
}

/// Unique per acquisition attempt, across processes and threads.
fn owner_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or(0);
    let seq = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    format!("{}-{nanos}-{seq}", std::process::id())
}

/// Moves an abandoned lock aside under a name only this waiter uses. Losing
/// the rename means another waiter got there first. If the file moved aside
/// turns out to be fresh, a racing waiter already replaced the stale lock and
/// it is linked back.
fn reclaim(path: &Path, token: &str, stale_after: Duration) -> bool {
    let mut aside = path.as_os_str().to_owned();
    aside.push(format!(".stale-{token}"));
    let aside = PathBuf::from(aside);
    if fs::rename(path, &aside).is_err() {
        return false;
    }
    let abandoned = is_stale(&aside, stale_after);
    if abandoned {
        tracing::warn!(lock = %path.display(), "removed abandoned build lock");
    } else if let Err(err) = fs::hard_link(&aside, path) {
        tracing::warn!(
            lock = %path.display(),
            error = %err,
            "failed to restore live build lock"
        );
    }
    let _ = fs::remove_file(&aside);
    abandoned
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .map(|age| age > stale_after)
        .unwrap_or(false)
}
