//! Upload, optimize and export steps on top of the persisted [`AppState`].

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{info, warn};

use crate::backend::{OptimizationBackend, OptimizationResult, OptimizationSummary};
use crate::demo;
use crate::domain::{AppConfig, FallbackPolicy, InvError};
use crate::loader::load_data_file;
use crate::parser::normalize_header;
use crate::serializer::rows_to_csv;
use crate::state::{AppState, StateStore, UploadedFile};
use crate::value::CellValue;
use crate::view::{ViewQuery, filter_and_sort};

/// Outcome of uploading one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub name: String,
    pub rows: usize,
    pub columns: usize,
    /// Number of data lines that were padded or truncated.
    pub recovered_lines: usize,
}

pub fn export_file_name() -> String {
    format!("optimization_results_{}.csv", Local::now().format("%Y-%m-%d"))
}

pub struct Workflow<S: StateStore, B: OptimizationBackend> {
    config: AppConfig,
    store: S,
    backend: B,
    state: AppState,
}

impl<S: StateStore, B: OptimizationBackend> Workflow<S, B> {
    pub fn new(config: AppConfig, store: S, backend: B) -> Result<Self, InvError> {
        let state = AppState::load(&store)?;
        Ok(Workflow {
            config,
            store,
            backend,
            state,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn save(&mut self) -> Result<(), InvError> {
        self.state.save(&mut self.store)
    }

    /// Reads and parses `paths` one after the other. Nothing is stored unless
    /// every file loads.
    pub fn upload(&mut self, paths: &[PathBuf]) -> Result<Vec<UploadReport>, InvError> {
        let mut loaded = Vec::with_capacity(paths.len());
        for path in paths {
            let mut file = load_data_file(path)?;
            if self.config.normalize_headers {
                file.table.rename_columns(normalize_header)?;
            }
            loaded.push(file);
        }

        let mut reports = Vec::with_capacity(loaded.len());
        for file in loaded {
            reports.push(UploadReport {
                name: file.name.clone(),
                rows: file.table.row_count(),
                columns: file.table.column_count(),
                recovered_lines: file.recoveries.len(),
            });
            self.state
                .add_file(UploadedFile::new(file.name, file.info.file_size, file.table));
        }
        self.save()?;
        info!("Uploaded {} files", reports.len());
        Ok(reports)
    }

    /// Uploads `paths` for an interactive session. With `FallbackPolicy::Demo`
    /// and nothing stored yet, unreadable files are replaced by the demo
    /// inventory. Malformed content is always an error.
    pub fn open(
        &mut self,
        paths: &[PathBuf],
        policy: FallbackPolicy,
    ) -> Result<Vec<UploadReport>, InvError> {
        match self.upload(paths) {
            Err(e)
                if e.is_read_error()
                    && policy == FallbackPolicy::Demo
                    && self.state.uploaded_files.is_empty() =>
            {
                warn!("Cannot read input ({e}), loading demo data");
                self.load_demo_data()?;
                Ok(Vec::new())
            }
            result => result,
        }
    }

    /// Stores the built-in inventory sample as the only file.
    pub fn load_demo_data(&mut self) -> Result<(), InvError> {
        self.state = AppState::default();
        self.state
            .add_file(UploadedFile::new(demo::DEMO_INVENTORY_NAME, 0, demo::inventory()));
        self.state.using_demo_data = true;
        self.save()
    }

    pub fn remove_file(&mut self, name: &str) -> Result<UploadedFile, InvError> {
        let removed = self
            .state
            .remove_file(name)
            .ok_or_else(|| InvError::out_of_range(format!("unknown file \"{name}\"")))?;
        self.save()?;
        Ok(removed)
    }

    pub fn select_for_optimization(&mut self, names: &[String]) -> Result<(), InvError> {
        self.state.select_for_optimization(names)?;
        self.save()
    }

    pub fn edit_cell(
        &mut self,
        file: &str,
        column: &str,
        row: usize,
        raw: &str,
    ) -> Result<CellValue, InvError> {
        let stored = self.state.edit_cell(file, column, row, raw)?;
        self.save()?;
        Ok(stored)
    }

    pub fn run_optimization(&mut self, policy: FallbackPolicy) -> Result<&OptimizationResult, InvError> {
        let files = self.state.files_for_optimization();
        if files.is_empty() {
            return Err(InvError::Workflow("no files selected for optimization".to_string()));
        }
        let (mut result, demo_data) = match self.backend.optimize(&files) {
            Ok(result) => (result, self.state.using_demo_data),
            Err(e) if e.is_backend_error() && policy == FallbackPolicy::Demo => {
                warn!("Optimization backend failed, using demo results: {e}");
                (demo::optimization_results(), true)
            }
            Err(e) => return Err(e),
        };
        if !result.summary.total_savings.is_finite()
            || !result.summary.average_stock_reduction.is_finite()
        {
            result.summary = OptimizationSummary::from_table(&result.data);
        }
        info!(
            "Optimization finished: savings {:.2}, stock reduction {:.1}%",
            result.summary.total_savings, result.summary.average_stock_reduction
        );
        self.state.using_demo_data = demo_data;
        self.state.optimization_results = Some(result);
        self.save()?;
        self.state
            .optimization_results
            .as_ref()
            .ok_or_else(|| InvError::Workflow("optimization results missing".to_string()))
    }

    /// Writes the results, filtered and sorted by `query` (pagination is
    /// ignored), as `optimization_results_<date>.csv` into `dir`.
    pub fn export_results(&self, dir: &Path, query: &ViewQuery) -> Result<PathBuf, InvError> {
        let results = self
            .state
            .optimization_results
            .as_ref()
            .ok_or_else(|| InvError::Workflow("no optimization results to export".to_string()))?;
        let snapshot = results.data.snapshot();
        let rows = filter_and_sort(&snapshot, query)?;
        fs::create_dir_all(dir)?;
        let path = dir.join(export_file_name());
        fs::write(&path, rows_to_csv(snapshot.header(), &rows))?;
        info!("Exported {} rows to {}", rows.len(), path.display());
        Ok(path)
    }

    pub fn reset(&mut self) -> Result<(), InvError> {
        AppState::clear(&mut self.store)?;
        self.state = AppState::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HealthStatus;
    use crate::state::MemoryStore;
    use crate::view::SortKey;
    use std::io::Write;

    struct StubBackend {
        result: Option<OptimizationResult>,
    }

    impl OptimizationBackend for StubBackend {
        fn health(&self) -> Result<HealthStatus, InvError> {
            Ok(HealthStatus {
                status: "healthy".to_string(),
                version: None,
            })
        }

        fn optimize(&self, _files: &[&UploadedFile]) -> Result<OptimizationResult, InvError> {
            self.result
                .clone()
                .ok_or_else(|| InvError::BackendStatus("503 Service Unavailable".to_string()))
        }
    }

    fn workflow(result: Option<OptimizationResult>) -> Workflow<MemoryStore, StubBackend> {
        Workflow::new(
            AppConfig::default(),
            MemoryStore::default(),
            StubBackend { result },
        )
        .unwrap()
    }

    fn csv_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        write!(file, "{content}").unwrap();
        file
    }

    #[test]
    fn upload_stores_files_and_marks_data_ready() {
        let file = csv_file("Product ID,Stock\nA001,150\nA002\n");
        let mut wf = workflow(None);
        wf.config.normalize_headers = true;
        let reports = wf.upload(&[file.path().to_path_buf()]).unwrap();
        assert_eq!(reports[0].rows, 2);
        assert_eq!(reports[0].recovered_lines, 1);
        assert!(wf.state().data_ready);
        let stored = &wf.state().uploaded_files[0];
        assert_eq!(stored.table.column_names(), vec!["product_id", "stock"]);
        // persisted, not only in memory
        assert_eq!(AppState::load(&wf.store).unwrap(), *wf.state());
    }

    #[test]
    fn failed_upload_stores_nothing() {
        let good = csv_file("a\n1\n");
        let mut wf = workflow(None);
        let err = wf
            .upload(&[good.path().to_path_buf(), PathBuf::from("/not/here.csv")])
            .unwrap_err();
        assert!(err.is_read_error());
        assert!(wf.state().uploaded_files.is_empty());
    }

    #[test]
    fn unreadable_files_open_the_demo_inventory() {
        let mut wf = workflow(None);
        let reports = wf
            .open(&[PathBuf::from("/not/here.csv")], FallbackPolicy::Demo)
            .unwrap();
        assert!(reports.is_empty());
        assert!(wf.state().using_demo_data);
        assert_eq!(wf.state().uploaded_files[0].name, demo::DEMO_INVENTORY_NAME);

        let mut wf = workflow(None);
        let err = wf
            .open(&[PathBuf::from("/not/here.csv")], FallbackPolicy::Fail)
            .unwrap_err();
        assert!(err.is_read_error());
        assert!(wf.state().uploaded_files.is_empty());

        let broken = csv_file("a,a\n1,2\n");
        let err = wf
            .open(&[broken.path().to_path_buf()], FallbackPolicy::Demo)
            .unwrap_err();
        assert!(matches!(err, InvError::MalformedInput(_)));
        assert!(wf.state().uploaded_files.is_empty());
    }

    #[test]
    fn stored_files_are_kept_when_a_new_file_is_unreadable() {
        let good = csv_file("a\n1\n");
        let mut wf = workflow(None);
        wf.upload(&[good.path().to_path_buf()]).unwrap();
        let err = wf
            .open(&[PathBuf::from("/not/here.csv")], FallbackPolicy::Demo)
            .unwrap_err();
        assert!(err.is_read_error());
        assert!(!wf.state().using_demo_data);
        assert_eq!(wf.state().uploaded_files.len(), 1);
    }

    #[test]
    fn backend_failure_falls_back_to_demo_results() {
        let mut wf = workflow(None);
        wf.load_demo_data().unwrap();
        let result = wf.run_optimization(FallbackPolicy::Demo).unwrap();
        assert_eq!(result.output_file, demo::DEMO_OUTPUT_FILE);
        assert!(wf.state().using_demo_data);
    }

    #[test]
    fn backend_failure_propagates_without_fallback() {
        let mut wf = workflow(None);
        wf.load_demo_data().unwrap();
        let err = wf.run_optimization(FallbackPolicy::Fail).unwrap_err();
        assert!(err.is_backend_error());
        assert!(wf.state().optimization_results.is_none());
    }

    #[test]
    fn optimization_needs_selected_files() {
        let mut wf = workflow(Some(demo::optimization_results()));
        assert!(matches!(
            wf.run_optimization(FallbackPolicy::Demo),
            Err(InvError::Workflow(_))
        ));
    }

    #[test]
    fn backend_result_replaces_demo_flag() {
        let mut wf = workflow(Some(demo::optimization_results()));
        let file = csv_file("product_id,current_stock\nA001,150\n");
        wf.upload(&[file.path().to_path_buf()]).unwrap();
        wf.run_optimization(FallbackPolicy::Fail).unwrap();
        assert!(!wf.state().using_demo_data);
        assert!(wf.state().optimization_results.is_some());
    }

    #[test]
    fn export_writes_filtered_sorted_results() {
        let dir = tempfile::tempdir().unwrap();
        let mut wf = workflow(None);
        wf.load_demo_data().unwrap();
        wf.run_optimization(FallbackPolicy::Demo).unwrap();
        let query = ViewQuery::default()
            .with_filter("widget")
            .with_sort(SortKey::descending("cost_savings"));
        let path = wf.export_results(dir.path(), &query).unwrap();
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), export_file_name());
        let csv = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("product_id,name,current_stock"));
        assert!(lines[1].starts_with("A001,"));
        assert!(lines[2].starts_with("A003,"));
        assert!(lines[3].starts_with("A002,"));
    }

    #[test]
    fn export_without_results_fails() {
        let dir = tempfile::tempdir().unwrap();
        let wf = workflow(None);
        assert!(wf.export_results(dir.path(), &ViewQuery::default()).is_err());
    }

    #[test]
    fn edit_and_remove_are_persisted() {
        let mut wf = workflow(None);
        wf.load_demo_data().unwrap();
        wf.edit_cell(demo::DEMO_INVENTORY_NAME, "current_stock", 0, "140")
            .unwrap();
        let loaded = AppState::load(&wf.store).unwrap();
        assert_eq!(
            loaded.uploaded_files[0]
                .table
                .get_cell("current_stock", 0)
                .unwrap(),
            &CellValue::Number(140.0)
        );
        wf.remove_file(demo::DEMO_INVENTORY_NAME).unwrap();
        assert!(!wf.state().data_ready);
        wf.reset().unwrap();
        assert_eq!(*wf.state(), AppState::default());
    }
}
