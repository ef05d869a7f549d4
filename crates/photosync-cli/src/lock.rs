//! Cross-process lock on a profile data directory.
//!
//! Upload and watch hold it for their whole run so that recovering
//! interrupted uploads never resets records another process is still
//! sending.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CliError;

const LOCK_FILE_NAME: &str = "upload.lock";

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    created_at_rfc3339: String,
    command: String,
}

/// Removed again on drop.
#[derive(Debug)]
pub struct DataDirLock {
    path: PathBuf,
}

impl DataDirLock {
    /// Take the lock for `command`, replacing a lock whose owner has exited.
    pub fn acquire(data_dir: &Path, command: &str) -> Result<Self, CliError> {
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join(LOCK_FILE_NAME);

        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<LockInfo>(&contents) {
                Ok(info) if pid_is_alive(info.pid) => {
                    return Err(CliError::Locked(format!(
                        "`{}` (pid {}) has held {} since {}; remove it if that process is gone",
                        info.command,
                        info.pid,
                        path.display(),
                        info.created_at_rfc3339
                    )));
                }
                Ok(info) => {
                    tracing::warn!("Replacing lock left by exited pid {}", info.pid);
                    archive_lock(&path, "stale")?;
                }
                Err(error) => {
                    tracing::warn!("Replacing unreadable lock {}: {}", path.display(), error);
                    archive_lock(&path, "corrupt")?;
                }
            },
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => return Err(error.into()),
        }

        let info = LockInfo {
            pid: std::process::id(),
            created_at_rfc3339: chrono::Utc::now().to_rfc3339(),
            command: command.to_string(),
        };
        let mut file = match OpenOptions::new().create_new(true).write(true).open(&path) {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                return Err(CliError::Locked(format!(
                    "{} was taken by another process",
                    path.display()
                )));
            }
            Err(error) => return Err(error.into()),
        };
        file.write_all(serde_json::to_string_pretty(&info)?.as_bytes())?;
        file.sync_all()?;

        Ok(Self { path })
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(&self.path) {
            tracing::warn!("Could not remove lock {}: {}", self.path.display(), error);
        }
    }
}

fn archive_lock(path: &Path, reason: &str) -> Result<(), CliError> {
    let timestamp = chrono::Utc::now().timestamp_millis();
    fs::rename(
        path,
        path.with_file_name(format!("{LOCK_FILE_NAME}.{reason}.{timestamp}.json")),
    )?;
    Ok(())
}

#[cfg(target_os = "linux")]
fn pid_is_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

// No portable liveness check; a leftover lock must be removed by hand.
#[cfg(not(target_os = "linux"))]
const fn pid_is_alive(_pid: u32) -> bool {
    true
}
