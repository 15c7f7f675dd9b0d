use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use polars::prelude::{
    DataFrame, DataType, LazyFrame, PlPath, PolarsError, ScanArgsParquet, UnifiedScanArgs,
};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::domain::InvError;
use crate::parser::{RowRecovery, parse_csv};
use crate::table::{Column, Table};
use crate::value::CellValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    CSV,
    PARQUET,
    ARROW,
}

#[derive(Debug)]
pub struct FileInfo {
    pub path: PathBuf,
    pub file_size: u64,
    pub file_type: FileType,
}

/// A file read from disk and converted into the table model.
#[derive(Debug)]
pub struct LoadedFile {
    pub name: String,
    pub info: FileInfo,
    pub table: Table,
    pub recoveries: Vec<RowRecovery>,
}

pub fn detect_file_type(path: &Path) -> Result<FileType, InvError> {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_uppercase())
        .as_deref()
    {
        Some("CSV") => Ok(FileType::CSV),
        Some("PARQUET") | Some("PQ") => Ok(FileType::PARQUET),
        Some("ARROW") | Some("IPC") | Some("FEATHER") => Ok(FileType::ARROW),
        _ => Err(InvError::UnknownFileType(path.to_path_buf())),
    }
}

pub fn get_file_info(path: &Path) -> Result<FileInfo, InvError> {
    let metadata = fs::metadata(path).map_err(|e| read_error(path, e))?;
    if !metadata.is_file() {
        return Err(InvError::Read(std::io::Error::new(
            ErrorKind::InvalidInput,
            format!("{} is not a file", path.display()),
        )));
    }
    Ok(FileInfo {
        path: path.to_path_buf(),
        file_size: metadata.len(),
        file_type: detect_file_type(path)?,
    })
}

fn read_error(path: &Path, e: std::io::Error) -> InvError {
    match e.kind() {
        ErrorKind::NotFound => InvError::FileNotFound(path.to_path_buf()),
        ErrorKind::PermissionDenied => InvError::PermissionDenied(path.to_path_buf()),
        _ => InvError::Read(e),
    }
}

/// Reads `path` and converts it into a [`Table`]. CSV goes through the
/// comma-split parser, parquet and arrow files through polars.
pub fn load_data_file(path: &Path) -> Result<LoadedFile, InvError> {
    let info = get_file_info(path)?;
    let start_time = Instant::now();

    let (table, recoveries) = match info.file_type {
        FileType::CSV => {
            let text = fs::read_to_string(&info.path).map_err(|e| read_error(&info.path, e))?;
            let parsed = parse_csv(&text)?;
            (parsed.table, parsed.recoveries)
        }
        FileType::PARQUET | FileType::ARROW => {
            let df = load_frame(&info)?;
            (frame_to_table(&df)?, Vec::new())
        }
    };

    let name = info
        .path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("???")
        .to_string();
    info!(
        "Loaded {} ({:?}, {} bytes): {} rows x {} columns in {}ms",
        name,
        info.file_type,
        info.file_size,
        table.row_count(),
        table.column_count(),
        start_time.elapsed().as_millis()
    );
    Ok(LoadedFile {
        name,
        info,
        table,
        recoveries,
    })
}

fn load_frame(info: &FileInfo) -> Result<DataFrame, PolarsError> {
    let frame = match info.file_type {
        FileType::ARROW => LazyFrame::scan_ipc(
            PlPath::Local(info.path.as_path().into()),
            polars::io::ipc::IpcScanOptions,
            UnifiedScanArgs::default(),
        )?,
        _ => LazyFrame::scan_parquet(
            PlPath::Local(info.path.as_path().into()),
            ScanArgsParquet::default(),
        )?,
    };
    frame.collect()
}

/// Converts a polars frame into the table model, one column per rayon task.
pub fn frame_to_table(df: &DataFrame) -> Result<Table, InvError> {
    let columns: Result<Vec<Column>, PolarsError> = df
        .get_column_names()
        .par_iter()
        .map(|name| convert_column(df, name))
        .collect();
    let columns = columns?;
    for c in columns.iter() {
        debug!("Column \"{}\": {} values", c.name, c.len());
    }
    Table::from_columns(columns)
}

fn is_numeric_type(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

fn convert_column(df: &DataFrame, name: &str) -> Result<Column, PolarsError> {
    let col = df.column(name)?;
    let values: Vec<CellValue> = if is_numeric_type(col.dtype()) {
        let cast = col.cast(&DataType::Float64)?;
        cast.f64()?
            .into_iter()
            .map(|v| match v {
                Some(n) if n.is_finite() => CellValue::Number(n),
                Some(n) => CellValue::text(n.to_string()),
                None => CellValue::Empty,
            })
            .collect()
    } else if *col.dtype() == DataType::Boolean {
        col.bool()?
            .into_iter()
            .map(|v| v.map(CellValue::Bool).unwrap_or(CellValue::Empty))
            .collect()
    } else {
        let cast = col.cast(&DataType::String)?;
        cast.str()?
            .into_iter()
            .map(|v| v.map(CellValue::text).unwrap_or(CellValue::Empty))
            .collect()
    };
    Ok(Column::new(name, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn detects_file_types_by_extension() {
        assert_eq!(detect_file_type(Path::new("a.csv")).unwrap(), FileType::CSV);
        assert_eq!(detect_file_type(Path::new("a.PQ")).unwrap(), FileType::PARQUET);
        assert_eq!(detect_file_type(Path::new("a.feather")).unwrap(), FileType::ARROW);
        assert!(matches!(
            detect_file_type(Path::new("a.xlsx")),
            Err(InvError::UnknownFileType(_))
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = load_data_file(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, InvError::FileNotFound(_)));
        assert!(err.is_read_error());
    }

    #[test]
    fn loads_csv_files() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        write!(file, "sku,qty\nA,1\nB,2,9\n").unwrap();
        let loaded = load_data_file(file.path()).unwrap();
        assert_eq!(loaded.table.row_count(), 2);
        assert_eq!(loaded.recoveries.len(), 1);
        assert_eq!(loaded.info.file_type, FileType::CSV);
    }

    #[test]
    fn converts_frames_by_dtype() {
        let df = polars::df!(
            "sku" => ["A", "B"],
            "qty" => [Some(3i64), None],
            "active" => [true, false],
        )
        .unwrap();
        let table = frame_to_table(&df).unwrap();
        assert_eq!(table.column_names(), vec!["sku", "qty", "active"]);
        assert_eq!(table.get_cell("qty", 0).unwrap(), &CellValue::Number(3.0));
        assert_eq!(table.get_cell("qty", 1).unwrap(), &CellValue::Empty);
        assert_eq!(table.get_cell("active", 1).unwrap(), &CellValue::Bool(false));
    }
}
