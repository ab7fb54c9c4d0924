//! Compensation state storage backends

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use contracts::{CompensationState, ContractError, StatePersistence};
use parking_lot::Mutex;
use tracing::{debug, instrument};

/// Stores the triple as a JSON file
///
/// Saves go to a sibling temp file which is then renamed over the target, so
/// a reader sees either the old or the new file.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    /// Persist to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_atomically(&self, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let temp = self.temp_path();
        {
            let mut file = File::create(&temp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &self.path)
    }
}

impl StatePersistence for JsonFilePersistence {
    fn load(&self) -> Result<Option<CompensationState>, ContractError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ContractError::persistence(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )))
            }
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            ContractError::persistence(format!("corrupt state in {}: {e}", self.path.display()))
        })
    }

    #[instrument(name = "compensation_persist", skip(self, state), fields(path = %self.path.display()))]
    fn save(&self, state: &CompensationState) -> Result<(), ContractError> {
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| ContractError::persistence(format!("failed to encode state: {e}")))?;
        self.write_atomically(&bytes).map_err(|e| {
            ContractError::persistence(format!("failed to write {}: {e}", self.path.display()))
        })?;
        debug!(delay_nanos = state.delay_nanos, "compensation state saved");
        Ok(())
    }

    fn clear(&self) -> Result<(), ContractError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ContractError::persistence(format!(
                "failed to remove {}: {e}",
                self.path.display()
            ))),
        }
    }
}

/// In-memory backend for tests and ephemeral services
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    state: Mutex<Option<CompensationState>>,
}

impl MemoryPersistence {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `state`
    pub fn with_state(state: CompensationState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }
}

impl StatePersistence for MemoryPersistence {
    fn load(&self) -> Result<Option<CompensationState>, ContractError> {
        Ok(*self.state.lock())
    }

    fn save(&self, state: &CompensationState) -> Result<(), ContractError> {
        *self.state.lock() = Some(*state);
        Ok(())
    }

    fn clear(&self) -> Result<(), ContractError> {
        *self.state.lock() = None;
        Ok(())
    }
}
