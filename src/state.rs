//! Persisted application state of the upload, manage and results steps.
//!
//! State is stored as one JSON blob per key in a [`StateStore`]. Tables keep
//! their value kinds across a save/load round trip.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::backend::OptimizationResult;
use crate::domain::InvError;
use crate::table::Table;
use crate::value::CellValue;

pub const KEY_UPLOADED_FILES: &str = "uploadedFiles";
pub const KEY_FILES_TO_OPTIMIZE: &str = "filesToOptimize";
pub const KEY_USING_DEMO_DATA: &str = "usingDemoData";
pub const KEY_DATA_READY: &str = "dataReady";
pub const KEY_OPTIMIZATION_RESULTS: &str = "optimizationResults";

pub const ALL_KEYS: [&str; 5] = [
    KEY_UPLOADED_FILES,
    KEY_FILES_TO_OPTIMIZE,
    KEY_USING_DEMO_DATA,
    KEY_DATA_READY,
    KEY_OPTIMIZATION_RESULTS,
];

/// String key-value store holding JSON blobs.
pub trait StateStore {
    fn get(&self, key: &str) -> Result<Option<String>, InvError>;
    fn put(&mut self, key: &str, value: &str) -> Result<(), InvError>;
    fn remove(&mut self, key: &str) -> Result<(), InvError>;
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileStore { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StateStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, InvError> {
        match fs::read_to_string(self.path(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(InvError::Read(e)),
        }
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), InvError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path(key), value)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), InvError> {
        match fs::remove_file(self.path(key)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(InvError::Read(e)),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, InvError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), InvError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), InvError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub name: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub table: Table,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, size: u64, table: Table) -> Self {
        UploadedFile {
            name: name.into(),
            size,
            uploaded_at: Utc::now(),
            table,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    Upload,
    Manage,
    Results,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub uploaded_files: Vec<UploadedFile>,
    /// Names of uploaded files selected for the next optimization run.
    pub files_to_optimize: Vec<String>,
    pub using_demo_data: bool,
    pub data_ready: bool,
    pub optimization_results: Option<OptimizationResult>,
}

fn read_key<T: DeserializeOwned>(store: &dyn StateStore, key: &str) -> Result<Option<T>, InvError> {
    match store.get(key)? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

fn write_key<T: Serialize>(store: &mut dyn StateStore, key: &str, value: &T) -> Result<(), InvError> {
    let json = serde_json::to_string(value)?;
    trace!("Writing state key {key} ({} bytes)", json.len());
    store.put(key, &json)
}

impl AppState {
    pub fn load(store: &dyn StateStore) -> Result<Self, InvError> {
        let state = AppState {
            uploaded_files: read_key(store, KEY_UPLOADED_FILES)?.unwrap_or_default(),
            files_to_optimize: read_key(store, KEY_FILES_TO_OPTIMIZE)?.unwrap_or_default(),
            using_demo_data: read_key(store, KEY_USING_DEMO_DATA)?.unwrap_or(false),
            data_ready: read_key(store, KEY_DATA_READY)?.unwrap_or(false),
            optimization_results: read_key(store, KEY_OPTIMIZATION_RESULTS)?,
        };
        debug!(
            "Loaded state: {} files, results: {}",
            state.uploaded_files.len(),
            state.optimization_results.is_some()
        );
        Ok(state)
    }

    pub fn save(&self, store: &mut dyn StateStore) -> Result<(), InvError> {
        if self.uploaded_files.is_empty() {
            store.remove(KEY_UPLOADED_FILES)?;
        } else {
            write_key(store, KEY_UPLOADED_FILES, &self.uploaded_files)?;
        }
        write_key(store, KEY_FILES_TO_OPTIMIZE, &self.files_to_optimize)?;
        write_key(store, KEY_USING_DEMO_DATA, &self.using_demo_data)?;
        write_key(store, KEY_DATA_READY, &self.data_ready)?;
        match &self.optimization_results {
            Some(results) => write_key(store, KEY_OPTIMIZATION_RESULTS, results)?,
            None => store.remove(KEY_OPTIMIZATION_RESULTS)?,
        }
        Ok(())
    }

    pub fn clear(store: &mut dyn StateStore) -> Result<(), InvError> {
        for key in ALL_KEYS {
            store.remove(key)?;
        }
        Ok(())
    }

    pub fn current_step(&self) -> WizardStep {
        if self.optimization_results.is_some() {
            WizardStep::Results
        } else if !self.uploaded_files.is_empty() {
            WizardStep::Manage
        } else {
            WizardStep::Upload
        }
    }

    pub fn available_steps(&self) -> Vec<WizardStep> {
        let mut steps = vec![WizardStep::Upload];
        if !self.uploaded_files.is_empty() {
            steps.push(WizardStep::Manage);
        }
        if self.optimization_results.is_some() {
            steps.push(WizardStep::Results);
        }
        steps
    }

    /// Adds a file, replacing an earlier upload with the same name.
    pub fn add_file(&mut self, file: UploadedFile) {
        if !self.files_to_optimize.contains(&file.name) {
            self.files_to_optimize.push(file.name.clone());
        }
        match self.uploaded_files.iter_mut().find(|f| f.name == file.name) {
            Some(slot) => *slot = file,
            None => self.uploaded_files.push(file),
        }
        self.data_ready = true;
        self.using_demo_data = false;
    }

    pub fn remove_file(&mut self, name: &str) -> Option<UploadedFile> {
        let idx = self.uploaded_files.iter().position(|f| f.name == name)?;
        let removed = self.uploaded_files.remove(idx);
        self.files_to_optimize.retain(|n| n != name);
        if self.uploaded_files.is_empty() {
            self.data_ready = false;
        }
        Some(removed)
    }

    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.uploaded_files.iter().find(|f| f.name == name)
    }

    /// Restricts the next optimization run to `names`. Unknown names are an error.
    pub fn select_for_optimization(&mut self, names: &[String]) -> Result<(), InvError> {
        if let Some(unknown) = names.iter().find(|n| self.file(n).is_none()) {
            return Err(InvError::out_of_range(format!("unknown file \"{unknown}\"")));
        }
        self.files_to_optimize = names.to_vec();
        Ok(())
    }

    pub fn files_for_optimization(&self) -> Vec<&UploadedFile> {
        self.uploaded_files
            .iter()
            .filter(|f| self.files_to_optimize.contains(&f.name))
            .collect()
    }

    pub fn edit_cell(
        &mut self,
        file: &str,
        column: &str,
        row: usize,
        raw: &str,
    ) -> Result<CellValue, InvError> {
        let slot = self
            .uploaded_files
            .iter_mut()
            .find(|f| f.name == file)
            .ok_or_else(|| InvError::out_of_range(format!("unknown file \"{file}\"")))?;
        Ok(slot.table.set_cell(column, row, raw)?.clone())
    }
}
