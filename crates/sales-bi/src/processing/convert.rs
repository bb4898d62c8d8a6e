//! Workbook → CSV export, optionally sampled, so the chatbot can start from a
//! smaller file than the raw Excel dump.

use serde::Serialize;
use std::path::Path;

use super::table::Table;
use crate::error::LoadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConvertSummary {
    /// Data rows in the input.
    pub rows: usize,
    pub columns: usize,
    /// Data rows written to the output.
    pub written: usize,
}

pub fn convert_to_csv(
    input: &Path,
    output: &Path,
    sample: Option<usize>,
) -> Result<ConvertSummary, LoadError> {
    let table = Table::read(input)?;
    let rows = table.rows.len();
    let columns = table.headers.len();
    tracing::info!(rows, columns, input = %input.display(), "Read input table");

    let table = match sample {
        Some(n) => table.sample(n),
        None => table,
    };

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| LoadError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let csv_err = |source| LoadError::Csv {
        path: output.to_path_buf(),
        source,
    };
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(output)
        .map_err(csv_err)?;
    writer.write_record(&table.headers).map_err(csv_err)?;
    for row in &table.rows {
        writer.write_record(row).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| LoadError::Io {
        path: output.to_path_buf(),
        source,
    })?;

    let summary = ConvertSummary {
        rows,
        columns,
        written: table.rows.len(),
    };
    tracing::info!(written = summary.written, output = %output.display(), "Wrote CSV");
    Ok(summary)
}
