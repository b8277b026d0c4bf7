//! Local working directories.
//!
//! ```text
//! <root>/
//! ├── raw/         freshly downloaded files
//! ├── processed/   filtered files (empty ones removed)
//! └── reconstructed.htm
//! ```
//!
//! A harvest wipes the root, including read-only entries left by earlier
//! runs, and recreates both subdirectories.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::info;
use walkdir::WalkDir;

use crate::error::HarvestError;

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    raw: PathBuf,
    processed: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            raw: root.join("raw"),
            processed: root.join("processed"),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw
    }

    pub fn processed_dir(&self) -> &Path {
        &self.processed
    }

    /// Wipe the whole workspace and recreate `raw/` and `processed/`.
    pub fn prepare(&self) -> Result<(), HarvestError> {
        info!("Preparing working directories in {}", self.root.display());
        self.wrap(remove_tree(&self.root), &self.root)?;
        for dir in [&self.root, &self.raw, &self.processed] {
            self.wrap(fs::create_dir_all(dir), dir)?;
            info!("Created {}", dir.display());
        }
        Ok(())
    }

    /// Keep `raw/` as is and recreate `processed/`, for offline reconstruction.
    pub fn reopen(&self) -> Result<(), HarvestError> {
        if !self.raw.is_dir() {
            return Err(HarvestError::Workspace {
                path: self.raw.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "raw directory does not exist"),
            });
        }
        self.wrap(remove_tree(&self.processed), &self.processed)?;
        self.wrap(fs::create_dir_all(&self.processed), &self.processed)?;
        info!("Recreated {}", self.processed.display());
        Ok(())
    }

    fn wrap<T>(&self, result: io::Result<T>, path: &Path) -> Result<T, HarvestError> {
        result.map_err(|source| HarvestError::Workspace {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Remove `path` recursively, clearing read-only bits first.
///
/// A missing path is not an error.
pub fn remove_tree(path: &Path) -> io::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    for entry in WalkDir::new(path) {
        let entry = entry?;
        make_writable(entry.path())?;
    }
    if path.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    info!("Removed {}", path.display());
    Ok(())
}

fn make_writable(path: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.file_type().is_symlink() {
        return Ok(());
    }
    let mut perms = metadata.permissions();
    if perms.readonly() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            perms.set_mode(perms.mode() | 0o700);
        }
        #[cfg(not(unix))]
        {
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(false);
        }
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}
