use std::io::Error;
use std::path::PathBuf;

use derive_setters::Setters;
use polars::error::PolarsError;
use ratatui::crossterm::event::KeyEvent;
use thiserror::Error;

/// Error type shared by the core pipeline, the workflow and the terminal UI.
#[derive(Debug, Error)]
pub enum InvError {
    /// Input text does not contain a valid header + data row structure.
    #[error("malformed input: {0}")]
    MalformedInput(String),
    /// Accessor called with an unknown column or a row index past the end.
    #[error("out of range: {0}")]
    OutOfRange(String),
    #[error("read failed: {0}")]
    Read(#[from] Error),
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),
    #[error("unknown file type: {}", .0.display())]
    UnknownFileType(PathBuf),
    #[error("columnar import failed: {0}")]
    Columnar(#[from] PolarsError),
    #[error("backend request failed: {0}")]
    Backend(#[from] reqwest::Error),
    #[error("backend rejected request: {0}")]
    BackendStatus(String),
    #[error("state store: {0}")]
    State(#[from] serde_json::Error),
    #[error("terminal: {0}")]
    Terminal(String),
    #[error("{0}")]
    Workflow(String),
}

impl InvError {
    pub fn out_of_range(msg: impl Into<String>) -> Self {
        InvError::OutOfRange(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        InvError::MalformedInput(msg.into())
    }

    /// True for failures of the underlying file read, as opposed to bad content.
    pub fn is_read_error(&self) -> bool {
        matches!(
            self,
            InvError::Read(_) | InvError::FileNotFound(_) | InvError::PermissionDenied(_)
        )
    }

    /// True when the optimization backend could not deliver a result.
    pub fn is_backend_error(&self) -> bool {
        matches!(self, InvError::Backend(_) | InvError::BackendStatus(_))
    }
}

/// What the workflow does when the optimization backend is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Substitute demonstration results and flag the state as demo data.
    #[default]
    Demo,
    /// Propagate the backend error.
    Fail,
}

pub const DEFAULT_PAGE_SIZE: usize = 25;
pub const PAGE_SIZE_OPTIONS: [usize; 4] = [10, 25, 50, 100];

#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct AppConfig {
    pub event_poll_time: u64,
    pub max_column_width: usize,
    pub page_size: usize,
    pub backend_url: String,
    pub request_timeout_secs: u64,
    #[setters(into)]
    pub state_dir: PathBuf,
    #[setters(into)]
    pub export_dir: PathBuf,
    pub fallback: FallbackPolicy,
    pub normalize_headers: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            event_poll_time: 100,
            max_column_width: 32,
            page_size: DEFAULT_PAGE_SIZE,
            backend_url: "http://localhost:5000/api".to_string(),
            request_timeout_secs: 30,
            state_dir: PathBuf::from(".invopt"),
            export_dir: PathBuf::from("."),
            fallback: FallbackPolicy::Demo,
            normalize_headers: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CMDMode {
    Filter,
    EditCell,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Quit,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    MoveBeginning,
    MoveEnd,
    NextPage,
    PreviousPage,
    CyclePageSize,
    NextFile,
    PreviousFile,
    SortAscending,
    SortDescending,
    Filter,
    ClearFilter,
    EditCell,
    ToggleIndex,
    CopyCell,
    CopyRow,
    Optimize,
    ShowResults,
    ExportResults,
    DeleteFile,
    Help,
    Enter,
    Exit,
    Resize(usize, usize),
    RawKey(KeyEvent),
}

pub const HELP_TEXT: &str = "\
Navigation
  Up/Down/Left/Right  move the cursor (also k/j/h/l)
  g / G               first / last row of the page
  PgUp / PgDn, p / n  previous / next page
  z                   cycle page size (10, 25, 50, 100)
  Tab / BackTab       next / previous file

Data
  s / S               sort current column ascending / descending
  /                   filter rows (all cells, case-insensitive)
  c                   clear filter and sort
  e                   edit current cell
  Enter               show current row as record
  i                   toggle id column
  y / Y               copy cell / row (CSV) to the clipboard
  d                   remove current file

Optimization
  o                   run optimization on the selected files
  r                   show optimization results
  x                   export results to CSV

  ?                   this help
  Esc                 back
  q                   quit";
