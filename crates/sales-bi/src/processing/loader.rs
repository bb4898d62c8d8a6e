//! Builds the record store from a CSV or spreadsheet export.
//!
//! Column names follow the Online Retail export (`Country`, `Description`,
//! `InvoiceDate`) with the plain names (`Region`, `Product`, `Date`) accepted
//! too. `Sales` is read directly or derived as `Quantity × Price`.

use std::path::Path;

use super::table::Table;
use crate::error::LoadError;
use crate::types::{RecordStore, SalesRecord};

const REGION_COLUMNS: &[&str] = &["Region", "Country"];
const PRODUCT_COLUMNS: &[&str] = &["Product", "Description"];
const DATE_COLUMNS: &[&str] = &["Date", "InvoiceDate"];
const SALES_COLUMNS: &[&str] = &["Sales"];
const QUANTITY_COLUMNS: &[&str] = &["Quantity"];
const PRICE_COLUMNS: &[&str] = &["Price", "UnitPrice"];

/// Load every row of `path` (or a reproducible sample of `sample_size` rows).
pub fn load_records(path: &Path, sample_size: Option<usize>) -> Result<RecordStore, LoadError> {
    let mut table = Table::read(path)?;
    tracing::info!(rows = table.rows.len(), path = %path.display(), "Loaded sales table");

    if let Some(n) = sample_size {
        if n < table.rows.len() {
            table = table.sample(n);
            tracing::info!(rows = n, "Sampled rows");
        }
    }

    Ok(RecordStore::new(records_from_table(&table)?))
}

/// Map table rows onto records. Fails only when no `Sales` value can be derived.
pub fn records_from_table(table: &Table) -> Result<Vec<SalesRecord>, LoadError> {
    let region = table.column(REGION_COLUMNS);
    let product = table.column(PRODUCT_COLUMNS);
    let date = table.column(DATE_COLUMNS);

    let sales = match table.column(SALES_COLUMNS) {
        Some(col) => SalesSource::Column(col),
        None => match (table.column(QUANTITY_COLUMNS), table.column(PRICE_COLUMNS)) {
            (Some(quantity), Some(price)) => {
                tracing::info!("Computed 'Sales' as Quantity * Price");
                SalesSource::Derived { quantity, price }
            }
            _ => return Err(LoadError::MissingSales),
        },
    };

    Ok(table
        .rows
        .iter()
        .map(|row| {
            let sales = match sales {
                SalesSource::Column(col) => parse_number(table.cell(row, Some(col))),
                SalesSource::Derived { quantity, price } => {
                    parse_number(table.cell(row, Some(quantity)))
                        * parse_number(table.cell(row, Some(price)))
                }
            };
            SalesRecord::new(
                table.cell(row, region).trim(),
                table.cell(row, product).trim(),
                sales,
                table.cell(row, date).trim(),
            )
        })
        .collect())
}

#[derive(Clone, Copy)]
enum SalesSource {
    Column(usize),
    Derived { quantity: usize, price: usize },
}

/// Blank, non-numeric and non-finite cells count as zero.
fn parse_number(raw: &str) -> f64 {
    let raw = raw.trim();
    let value = raw
        .parse::<f64>()
        .or_else(|_| raw.replace(',', "").parse::<f64>())
        .unwrap_or(0.0);
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
