/// Scratch directories for Tier2 runs
/// One owner-only directory per analysis, named by a fresh UUID so
/// concurrent analyses never collide. Removed on drop.
use crate::config::types::{Result, SandboxError};
use crate::observability::audit::{self, AuditEvent};
use std::fs::{self, DirBuilder, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

const DIR_PREFIX: &str = "sentinel-";

pub struct ScratchDir {
    run_id: Uuid,
    path: PathBuf,
    removed: bool,
}

impl ScratchDir {
    /// Create `<root>/sentinel-<uuid>` with mode 0700
    ///
    /// Failure here is resource exhaustion: the analysis cannot continue.
    pub fn create(root: &Path) -> Result<Self> {
        let run_id = Uuid::new_v4();
        let path = root.join(format!("{}{}", DIR_PREFIX, run_id));

        DirBuilder::new().mode(0o700).create(&path).map_err(|e| {
            SandboxError::ResourceExhausted(format!(
                "cannot create scratch directory {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(Self {
            run_id,
            path,
            removed: false,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the candidate owner-only, then mark it executable
    ///
    /// The file handle is closed before returning so the path can be exec'd.
    pub fn write_candidate(&self, name: &str, content: &[u8]) -> Result<PathBuf> {
        let target = self.path.join(name);
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(0o600)
                .open(&target)
                .map_err(|e| io_context(e, "create candidate", &target))?;
            file.write_all(content)
                .map_err(|e| io_context(e, "write candidate", &target))?;
            file.sync_all()
                .map_err(|e| io_context(e, "sync candidate", &target))?;
        }
        fs::set_permissions(&target, fs::Permissions::from_mode(0o700))
            .map_err(|e| io_context(e, "mark candidate executable", &target))?;
        Ok(target)
    }

    /// Remove the directory tree; idempotent
    pub fn remove(&mut self) -> Result<()> {
        if self.removed {
            return Ok(());
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_context(e, "remove scratch directory", &self.path)),
        }
        self.removed = true;
        Ok(())
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            log::warn!("{}", e);
            audit::emit(&AuditEvent::CleanupFailed {
                path: self.path.display().to_string(),
                error: e.to_string(),
            });
        }
    }
}

fn io_context(err: std::io::Error, action: &str, path: &Path) -> SandboxError {
    SandboxError::Io(std::io::Error::new(
        err.kind(),
        format!("failed to {} {}: {}", action, path.display(), err),
    ))
}

/// Remove scratch directories left behind by a crashed process
///
/// Only `sentinel-*` directories older than `max_age` are touched.
pub fn sweep_stale(root: &Path, max_age: Duration) -> Result<usize> {
    let mut cleaned = 0;
    let now = SystemTime::now();

    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(io_context(e, "read scratch root", root)),
    };

    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::warn!("Failed to read directory entry: {}", e);
                continue;
            }
        };
        if !entry.file_name().to_string_lossy().starts_with(DIR_PREFIX) {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(m) if m.is_dir() => m,
            _ => continue,
        };
        let age = match metadata.modified().map(|m| now.duration_since(m)) {
            Ok(Ok(age)) => age,
            _ => continue,
        };
        if age <= max_age {
            continue;
        }

        let path = entry.path();
        match fs::remove_dir_all(&path) {
            Ok(()) => {
                log::info!("Removed stale scratch directory {}", path.display());
                cleaned += 1;
            }
            Err(e) => log::warn!("Failed to remove stale scratch directory {}: {}", path.display(), e),
        }
    }

    Ok(cleaned)
}
