use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::fallback::format_records;

/// One row of sales data. Field names serialize as `Region`, `Product`,
/// `Sales`, `Date` so index metadata matches the source columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SalesRecord {
    pub region: String,
    pub product: String,
    pub sales: f64,
    #[serde(default)]
    pub date: String,
}

impl SalesRecord {
    pub fn new(
        region: impl Into<String>,
        product: impl Into<String>,
        sales: f64,
        date: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            product: product.into(),
            sales,
            date: date.into(),
        }
    }

    /// Text that gets embedded and shown in fallback answers:
    /// `"{Region} | {Product} | {Sales}"`.
    pub fn document_text(&self) -> String {
        format!("{} | {} | {}", self.region, self.product, self.sales)
    }
}

/// A record returned by a similarity search, with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedRecord {
    pub record: SalesRecord,
    pub score: f32,
}

/// Read-only collection of loaded records. Cloning shares the underlying rows.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: Arc<[SalesRecord]>,
}

impl RecordStore {
    pub fn new(records: Vec<SalesRecord>) -> Self {
        Self {
            records: records.into(),
        }
    }

    pub fn records(&self) -> &[SalesRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SalesRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl From<Vec<SalesRecord>> for RecordStore {
    fn from(records: Vec<SalesRecord>) -> Self {
        Self::new(records)
    }
}

/// Outcome of resolving one query. The variant records which strategy
/// produced it; `Display` renders the text shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// Generator output, or the deterministic aggregator's result.
    GeneratedText(String),
    /// Retrieval-only fallback: the top-k records, in rank order.
    RawRecords(Vec<SalesRecord>),
    /// The semantic index could not serve this query.
    Unavailable(String),
}

impl Answer {
    pub fn strategy(&self) -> &'static str {
        match self {
            Self::GeneratedText(_) => "generated_text",
            Self::RawRecords(_) => "raw_records",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GeneratedText(text) => f.write_str(text),
            Self::RawRecords(records) => f.write_str(&format_records(records)),
            Self::Unavailable(message) => f.write_str(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_text_layout() {
        let record = SalesRecord::new("United Kingdom", "WHITE METAL LANTERN", 20.34, "2010-12-01");
        assert_eq!(record.document_text(), "United Kingdom | WHITE METAL LANTERN | 20.34");
    }

    #[test]
    fn test_whole_number_sales_render_without_fraction() {
        let record = SalesRecord::new("France", "POSTAGE", 18.0, "");
        assert_eq!(record.document_text(), "France | POSTAGE | 18");
    }

    #[test]
    fn test_metadata_uses_source_column_names() {
        let record = SalesRecord::new("EIRE", "CANDLE", 3.5, "2011-01-04");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["Region"], "EIRE");
        assert_eq!(json["Product"], "CANDLE");
        assert_eq!(json["Sales"], 3.5);
        assert_eq!(json["Date"], "2011-01-04");
    }

    #[test]
    fn test_store_clone_shares_rows() {
        let store = RecordStore::new(vec![SalesRecord::new("A", "B", 1.0, "")]);
        let copy = store.clone();
        assert_eq!(copy.len(), 1);
        assert!(std::ptr::eq(store.records(), copy.records()));
    }

    #[test]
    fn test_answer_display() {
        assert_eq!(Answer::GeneratedText("hi".into()).to_string(), "hi");
        assert_eq!(Answer::Unavailable("down".into()).to_string(), "down");
        let raw = Answer::RawRecords(vec![SalesRecord::new("UK", "MUG", 2.5, "")]);
        assert_eq!(
            raw.to_string(),
            "Here are some relevant records:\nUK | MUG | 2.5"
        );
    }
}
