//! Raw tabular input: a header row plus string cells, read from CSV or a
//! spreadsheet workbook.

use calamine::{open_workbook_auto, Data, Reader};
use std::fs::File;
use std::path::Path;

use super::sample::sample_indices;
use crate::error::LoadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Spreadsheet,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Some(Self::Spreadsheet),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn read(path: &Path) -> Result<Self, LoadError> {
        match TableFormat::from_path(path) {
            Some(TableFormat::Csv) => Self::read_csv(path),
            Some(TableFormat::Spreadsheet) => Self::read_spreadsheet(path),
            None => Err(LoadError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    pub fn read_csv(path: &Path) -> Result<Self, LoadError> {
        let file = File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let csv_err = |source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);
        let headers = reader
            .byte_headers()
            .map_err(csv_err)?
            .iter()
            .map(|h| String::from_utf8_lossy(h).trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.byte_records() {
            let record = record.map_err(csv_err)?;
            rows.push(
                record
                    .iter()
                    .map(|cell| String::from_utf8_lossy(cell).into_owned())
                    .collect(),
            );
        }

        Ok(Self { headers, rows })
    }

    /// First sheet with data; its first non-empty row is the header.
    pub fn read_spreadsheet(path: &Path) -> Result<Self, LoadError> {
        let mut workbook = open_workbook_auto(path).map_err(|e| LoadError::Spreadsheet {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
        for sheet_name in &sheet_names {
            let range = match workbook.worksheet_range(sheet_name) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(sheet = %sheet_name, "Skipping unreadable sheet: {}", e);
                    continue;
                }
            };

            let mut rows = range
                .rows()
                .map(|row| row.iter().map(cell_to_string).collect::<Vec<String>>())
                .filter(|row| !row.iter().all(|c| c.is_empty()));

            let Some(headers) = rows.next() else {
                continue;
            };
            let headers = headers.into_iter().map(|h| h.trim().to_string()).collect();

            return Ok(Self {
                headers,
                rows: rows.collect(),
            });
        }

        Err(LoadError::Empty(path.to_path_buf()))
    }

    /// Index of the first header matching any of `names`, ignoring case.
    pub fn column(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|name| {
            self.headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
        })
    }

    /// Cell at (`row`, `col`), empty when the row is short.
    pub fn cell<'a>(&'a self, row: &'a [String], col: Option<usize>) -> &'a str {
        col.and_then(|c| row.get(c)).map(String::as_str).unwrap_or("")
    }

    /// Keep a reproducible sample of `n` rows, in file order.
    pub fn sample(self, n: usize) -> Self {
        if n >= self.rows.len() {
            return self;
        }
        let keep = sample_indices(self.rows.len(), n);
        let mut rows: Vec<Option<Vec<String>>> = self.rows.into_iter().map(Some).collect();
        let rows = keep.into_iter().filter_map(|i| rows[i].take()).collect();
        Self {
            headers: self.headers,
            rows,
        }
    }
}

/// Convert a calamine cell to a clean string representation.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            // Use integer display when the float is a whole number (e.g. 1500.0 → "1500")
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::Error(e) => format!("#ERR:{:?}", e),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| dt.to_string()),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
    }
}
