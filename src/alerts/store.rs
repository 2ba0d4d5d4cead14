//! Persisted alert definitions (`definitions.json`)

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::config::ClusterCommand;
use super::AlertError;

/// Definitions file inside the cache directory
pub struct DefinitionStore {
    dir: PathBuf,
    path: PathBuf,
}

impl DefinitionStore {
    pub const FILENAME: &'static str = "definitions.json";

    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let path = dir.join(Self::FILENAME);
        Self { dir, path }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the cache directory if needed
    pub fn ensure_dir(&self) -> Result<(), AlertError> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Replace the definitions file with `commands`, pretty-printed
    pub fn save(&self, commands: &[Value]) -> Result<(), AlertError> {
        let data = serde_json::to_string_pretty(commands)?;
        let tmp = self.path.with_extension("json.tmp");

        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;

        tracing::debug!(
            path = %self.path.display(),
            commands = commands.len(),
            "Alert definitions saved"
        );
        Ok(())
    }

    /// Parse the definitions file
    pub fn try_load(&self) -> Result<Vec<ClusterCommand>, AlertError> {
        let data = fs::read(&self.path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Parse the definitions file; a missing or corrupt file yields no commands
    pub fn load(&self) -> Vec<ClusterCommand> {
        match self.try_load() {
            Ok(commands) => commands,
            Err(e) => {
                tracing::debug!(
                    path = %self.path.display(),
                    error = %e,
                    "Unable to load alert definitions"
                );
                Vec::new()
            }
        }
    }

    /// Raw JSON documents as written by `save`
    pub fn load_raw(&self) -> Result<Vec<Value>, AlertError> {
        let data = fs::read(&self.path)?;
        Ok(serde_json::from_slice(&data)?)
    }
}
