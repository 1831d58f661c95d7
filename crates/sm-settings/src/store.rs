use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use serde::Serialize;
use sm_common::{ManagerError, Result};
use tracing::{debug, info, warn};

use crate::format;
use crate::fs::{DiskFs, SettingsFs};

/// A key the owning entity expects, with its default and a human readable
/// description written above it (empty for none).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingDef {
    pub key: &'static str,
    pub default: &'static str,
    pub description: &'static str,
}

impl SettingDef {
    pub const fn new(key: &'static str, default: &'static str, description: &'static str) -> Self {
        Self {
            key,
            default,
            description,
        }
    }
}

/// Result of a guarded write-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    /// The value was already current; nothing was written.
    Unchanged,
    Written,
    /// The file changed since it was last read; the write was dropped.
    Conflict,
}

impl WriteOutcome {
    pub fn is_success(self) -> bool {
        !matches!(self, Self::Conflict)
    }
}

#[derive(Debug)]
struct SettingsState {
    values: HashMap<&'static str, String>,
    /// Modification stamp of the file at the last successful load or write.
    last_read: Option<SystemTime>,
}

/// Settings container backed by one file.
///
/// The in-memory key set is always exactly the declared set: unknown keys in
/// the file are ignored and dropped on rewrite, missing keys keep their
/// default and cause the file to be rewritten.
#[derive(Debug)]
pub struct Settings {
    path: PathBuf,
    header: String,
    defs: &'static [SettingDef],
    fs: Arc<dyn SettingsFs>,
    state: Mutex<SettingsState>,
}

impl Settings {
    /// Open a settings file that must already exist, loading it immediately
    /// (which completes the file if declared keys are missing).
    pub fn open(
        path: impl Into<PathBuf>,
        header: impl Into<String>,
        defs: &'static [SettingDef],
        fs: Arc<dyn SettingsFs>,
    ) -> Result<Self> {
        let path = path.into();
        if !fs.is_file(&path) {
            return Err(ManagerError::NotFound(format!(
                "File {} not found!",
                path.display()
            )));
        }

        let values = defs
            .iter()
            .map(|def| (def.key, def.default.to_string()))
            .collect();

        let settings = Self {
            path,
            header: header.into(),
            defs,
            fs,
            state: Mutex::new(SettingsState {
                values,
                last_read: None,
            }),
        };
        settings.refresh()?;
        Ok(settings)
    }

    pub fn open_on_disk(
        path: impl Into<PathBuf>,
        header: impl Into<String>,
        defs: &'static [SettingDef],
    ) -> Result<Self> {
        Self::open(path, header, defs, Arc::new(DiskFs))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn defs(&self) -> &'static [SettingDef] {
        self.defs
    }

    /// Current value of a declared key, reloading first if the file is stale.
    pub fn get(&self, key: &str) -> Result<String> {
        let mut state = self.lock();
        self.reload_if_stale(&mut state)?;
        state
            .values
            .get(key)
            .cloned()
            .ok_or_else(|| self.undeclared(key))
    }

    /// Store a new value and write the file back, unless the file changed
    /// since it was last read. On conflict or write failure the previous
    /// in-memory value is restored.
    pub fn set(&self, key: &str, value: impl Into<String>) -> Result<WriteOutcome> {
        let value = value.into();
        let mut state = self.lock();
        self.reload_if_stale(&mut state)?;

        let def = self
            .defs
            .iter()
            .find(|def| def.key == key)
            .ok_or_else(|| self.undeclared(key))?;
        let expected = state.last_read;

        let previous = state
            .values
            .insert(def.key, value.clone())
            .unwrap_or_else(|| def.default.to_string());
        if previous == value {
            return Ok(WriteOutcome::Unchanged);
        }

        match self.write_back(&mut state, expected) {
            Ok(WriteOutcome::Conflict) => {
                warn!(
                    path = %self.path.display(),
                    key,
                    "Settings file changed since last read, dropping write"
                );
                state.values.insert(def.key, previous);
                Ok(WriteOutcome::Conflict)
            }
            Ok(outcome) => {
                debug!(path = %self.path.display(), key, "Setting written");
                Ok(outcome)
            }
            Err(e) => {
                state.values.insert(def.key, previous);
                Err(e)
            }
        }
    }

    /// Run the staleness check without reading a key.
    pub fn refresh(&self) -> Result<()> {
        let mut state = self.lock();
        self.reload_if_stale(&mut state)
    }

    fn lock(&self) -> MutexGuard<'_, SettingsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn undeclared(&self, key: &str) -> ManagerError {
        ManagerError::NotFound(format!(
            "Setting {} could not be found in {}",
            key,
            self.path.display()
        ))
    }

    fn missing_file(&self) -> ManagerError {
        ManagerError::NotFound(format!("File {} not found!", self.path.display()))
    }

    fn reload_if_stale(&self, state: &mut SettingsState) -> Result<()> {
        let modified = self
            .fs
            .modified(&self.path)?
            .ok_or_else(|| self.missing_file())?;

        if state.last_read.is_some_and(|last| modified <= last) {
            return Ok(());
        }

        let content = self.fs.read_to_string(&self.path)?;
        state.last_read = Some(modified);

        let loaded = format::parse(&content);
        let mut missing = Vec::new();
        for def in self.defs {
            match loaded.get(def.key) {
                Some(value) => {
                    state.values.insert(def.key, value.clone());
                }
                None => missing.push(def.key),
            }
        }
        debug!(path = %self.path.display(), "Settings loaded");

        if !missing.is_empty() {
            // The loaded values stay usable even if the file cannot be completed
            match self.write_back(state, Some(modified)) {
                Ok(WriteOutcome::Conflict) => warn!(
                    path = %self.path.display(),
                    "Could not complete settings file, it changed while loading"
                ),
                Ok(_) => info!(
                    path = %self.path.display(),
                    missing = ?missing,
                    "Completed settings file with default values"
                ),
                Err(e) => warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Could not complete settings file"
                ),
            }
        }

        Ok(())
    }

    fn write_back(
        &self,
        state: &mut SettingsState,
        expected: Option<SystemTime>,
    ) -> Result<WriteOutcome> {
        let current = self
            .fs
            .modified(&self.path)?
            .ok_or_else(|| self.missing_file())?;
        if Some(current) != expected {
            return Ok(WriteOutcome::Conflict);
        }

        let content = format::render(&self.header, self.defs, &state.values);
        self.fs.write(&self.path, &content)?;
        state.last_read = self.fs.modified(&self.path)?;
        Ok(WriteOutcome::Written)
    }
}
