//! On-disk animation store.
//!
//! One `<name>.wasm` file per animation. Writes go to a temp file with a
//! PID+TID suffix in the same directory, are synced, then renamed over the
//! target, so readers never see a partial artifact.

use crate::config::StoreConfig;
use crate::{LightsError, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use tracing::{debug, info};

/// Directory of validated animation artifacts keyed by name.
#[derive(Debug, Clone)]
pub struct AnimationStore {
    root: PathBuf,
}

impl AnimationStore {
    /// Open the store, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| LightsError::io_with_path(e, &root))?;
        debug!("Opened animation store at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check that `name` can be used as an animation key.
    pub fn validate_name(name: &str) -> Result<()> {
        let reason = if name.is_empty() {
            Some("name is empty")
        } else if name.chars().count() > StoreConfig::MAX_NAME_LEN {
            Some("name is too long")
        } else if name.contains(['/', '\\']) {
            Some("name contains a path separator")
        } else if name.starts_with('.') {
            Some("name starts with '.'")
        } else if name.contains('\0') {
            Some("name contains a NUL byte")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(LightsError::InvalidAnimationName {
                name: name.to_string(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Atomically write the artifact for `name`, replacing any previous one.
    pub fn save(&self, name: &str, artifact: &[u8]) -> Result<()> {
        let path = self.artifact_path(name)?;
        let temp_path = self.root.join(format!(
            ".{}.{}.{}.{}.tmp",
            name,
            StoreConfig::ARTIFACT_EXTENSION,
            process::id(),
            thread_id()
        ));

        if let Err(e) = write_synced(&temp_path, artifact) {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(LightsError::Io {
                message: format!(
                    "Failed to rename {} to {}",
                    temp_path.display(),
                    path.display()
                ),
                path: Some(path),
                source: Some(e),
            });
        }

        info!("Stored animation '{}' ({} bytes)", name, artifact.len());
        Ok(())
    }

    /// Read the artifact for `name`.
    pub fn load(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.artifact_path(name)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(LightsError::UnknownAnimation {
                name: name.to_string(),
            }),
            Err(e) => Err(LightsError::io_with_path(e, path)),
        }
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.artifact_path(name)?.is_file())
    }

    /// Delete the artifact for `name`. Removing a missing animation succeeds.
    pub fn remove(&self, name: &str) -> Result<()> {
        let path = self.artifact_path(name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Removed animation '{}'", name);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Animation '{}' was not stored", name);
                Ok(())
            }
            Err(e) => Err(LightsError::io_with_path(e, path)),
        }
    }

    /// Names of all stored animations, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.root).map_err(|e| LightsError::io_with_path(e, &self.root))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| LightsError::io_with_path(e, &self.root))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|ext| ext.to_str()) != Some(StoreConfig::ARTIFACT_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                if Self::validate_name(stem).is_ok() {
                    names.push(stem.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    fn artifact_path(&self, name: &str) -> Result<PathBuf> {
        Self::validate_name(name)?;
        Ok(self
            .root
            .join(format!("{}.{}", name, StoreConfig::ARTIFACT_EXTENSION)))
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| LightsError::Io {
            message: format!("Failed to create temp file {}", path.display()),
            path: Some(path.to_path_buf()),
            source: Some(e),
        })?;

    file.write_all(bytes)
        .and_then(|()| file.flush())
        .and_then(|()| file.sync_all())
        .map_err(|e| LightsError::Io {
            message: format!("Failed to write temp file {}", path.display()),
            path: Some(path.to_path_buf()),
            source: Some(e),
        })
}

fn thread_id() -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    thread::current().id().hash(&mut hasher);
    hasher.finish()
}
