use calamine::{Data, Reader as _, Xls, Xlsx};
use serde_json::Value;
use std::io::Cursor;

use crate::error::ApiError;

/// A parsed row: column name → JSON value. Blank cells are omitted, so
/// a sparse first row really does carry fewer keys than later rows.
pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Csv,
    Xlsx,
    Xls,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
            Self::Xls => "xls",
        }
    }
}

/// How the column list is derived from parsed rows.
///
/// `FirstRow` keeps the upstream behavior: keys of the first row, in
/// insertion order, silently dropping keys that only appear later.
/// `Union` collects every key in first-seen order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnInference {
    FirstRow,
    Union,
}

/// Extension gate. Runs before any byte of the file is parsed.
pub fn detect_file_type(filename: &str) -> Result<FileType, ApiError> {
    let extension = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("csv") => Ok(FileType::Csv),
        Some("xlsx") => Ok(FileType::Xlsx),
        Some("xls") => Ok(FileType::Xls),
        _ => Err(ApiError::Validation(
            "Unsupported file type. Please upload an xlsx, xls or csv file.".into(),
        )),
    }
}

/// The dataset name defaults to the filename without its extension.
pub fn filename_stem(filename: &str) -> String {
    std::path::Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
        .to_string()
}

/// Parses the uploaded bytes into row objects. Fails with a validation
/// error if the file is unreadable or holds zero data rows.
pub fn parse(bytes: &[u8], file_type: FileType) -> Result<Vec<Row>, ApiError> {
    let rows = match file_type {
        FileType::Csv => parse_csv(bytes)?,
        FileType::Xlsx => {
            let workbook = Xlsx::new(Cursor::new(bytes)).map_err(|e| {
                tracing::debug!("xlsx open failed: {e}");
                ApiError::Validation("Could not read the Excel workbook.".into())
            })?;
            parse_spreadsheet(workbook)?
        }
        FileType::Xls => {
            let workbook = Xls::new(Cursor::new(bytes)).map_err(|e| {
                tracing::debug!("xls open failed: {e}");
                ApiError::Validation("Could not read the Excel workbook.".into())
            })?;
            parse_spreadsheet(workbook)?
        }
    };

    if rows.is_empty() {
        return Err(ApiError::Validation(
            "The uploaded file contains no data rows.".into(),
        ));
    }
    Ok(rows)
}

pub fn infer_columns(rows: &[Row], mode: ColumnInference) -> Vec<String> {
    match mode {
        ColumnInference::FirstRow => rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default(),
        ColumnInference::Union => {
            let mut columns: Vec<String> = Vec::new();
            for row in rows {
                for key in row.keys() {
                    if !columns.iter().any(|c| c == key) {
                        columns.push(key.clone());
                    }
                }
            }
            columns
        }
    }
}

// ── CSV ─────────────────────────────────────────────────────────

fn parse_csv(bytes: &[u8]) -> Result<Vec<Row>, ApiError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);

    // (position, name) for non-blank header cells only.
    let headers: Vec<(usize, String)> = reader
        .headers()
        .map_err(|e| {
            tracing::debug!("csv header read failed: {e}");
            ApiError::Validation("Could not parse the CSV header row.".into())
        })?
        .iter()
        .enumerate()
        .filter_map(|(i, cell)| {
            let name = cell.trim();
            (!name.is_empty()).then(|| (i, name.to_string()))
        })
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| {
            tracing::debug!("csv record read failed: {e}");
            ApiError::Validation("Could not parse the CSV file.".into())
        })?;

        let mut row = Row::new();
        for (position, name) in &headers {
            if let Some(value) = record.get(*position).and_then(coerce_text) {
                row.insert(name.clone(), value);
            }
        }
        if !row.is_empty() {
            rows.push(row);
        }
    }
    Ok(rows)
}

fn coerce_text(cell: &str) -> Option<Value> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    if let Ok(n) = cell.parse::<i64>() {
        return Some(Value::from(n));
    }
    if let Ok(f) = cell.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Some(Value::Number(n));
        }
    }
    if cell.eq_ignore_ascii_case("true") {
        return Some(Value::Bool(true));
    }
    if cell.eq_ignore_ascii_case("false") {
        return Some(Value::Bool(false));
    }
    Some(Value::String(cell.to_string()))
}

// ── Excel ───────────────────────────────────────────────────────

fn parse_spreadsheet<RS, R>(mut workbook: R) -> Result<Vec<Row>, ApiError>
where
    RS: std::io::Read + std::io::Seek,
    R: calamine::Reader<RS>,
    R::Error: std::fmt::Display,
{
    // First sheet only.
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ApiError::Validation("The workbook contains no sheets.".into()))?
        .map_err(|e| {
            tracing::debug!("sheet read failed: {e}");
            ApiError::Validation("Could not read the first sheet.".into())
        })?;

    Ok(rows_from_range(&range))
}

fn rows_from_range(range: &calamine::Range<Data>) -> Vec<Row> {
    let mut sheet_rows = range.rows();

    let headers: Vec<(usize, String)> = match sheet_rows.next() {
        Some(header_row) => header_row
            .iter()
            .enumerate()
            .filter_map(|(i, cell)| header_name(cell).map(|name| (i, name)))
            .collect(),
        None => return Vec::new(),
    };

    let mut rows = Vec::new();
    for sheet_row in sheet_rows {
        let mut row = Row::new();
        for (position, name) in &headers {
            if let Some(value) = sheet_row.get(*position).and_then(coerce_cell) {
                row.insert(name.clone(), value);
            }
        }
        if !row.is_empty() {
            rows.push(row);
        }
    }
    rows
}

fn header_name(cell: &Data) -> Option<String> {
    let name = match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 => (*f as i64).to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!name.is_empty()).then_some(name)
}

fn coerce_cell(cell: &Data) -> Option<Value> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => coerce_text(s),
        Data::Int(i) => Some(Value::from(*i)),
        Data::Float(f) => serde_json::Number::from_f64(*f).map(Value::Number),
        Data::Bool(b) => Some(Value::Bool(*b)),
        Data::DateTime(dt) => serde_json::Number::from_f64(dt.as_f64()).map(Value::Number),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(Value::String(s.clone())),
    }
}
