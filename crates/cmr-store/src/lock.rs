// SPDX-License-Identifier: Apache-2.0

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::{StoreError, StoreErrorCode};

/// Single-writer guard for batch jobs against one database. Held for the
/// lifetime of the value; the lock file is removed on drop.
#[derive(Debug)]
pub struct RunLock {
    lock_path: PathBuf,
}

impl RunLock {
    /// Lock path is `<db>.lock` next to the database file.
    pub fn acquire(db_path: &Path, job: &str) -> Result<Self, StoreError> {
        let mut name = db_path.as_os_str().to_owned();
        name.push(".lock");
        let lock_path = PathBuf::from(name);
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| {
                if e.kind() != std::io::ErrorKind::AlreadyExists {
                    return StoreError::new(
                        StoreErrorCode::Io,
                        format!("failed to create run lock {}: {e}", lock_path.display()),
                    );
                }
                let holder = fs::read_to_string(&lock_path).unwrap_or_default();
                StoreError::new(
                    StoreErrorCode::Locked,
                    format!(
                        "failed to acquire run lock {}: {e} (held by: {})",
                        lock_path.display(),
                        holder.trim()
                    ),
                )
            })?;
        writeln!(file, "{job} pid={}", std::process::id())
            .map_err(|e| StoreError::new(StoreErrorCode::Io, e.to_string()))?;
        Ok(Self { lock_path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}
