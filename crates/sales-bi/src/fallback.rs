//! Retrieval-only answers: raw records rendered one per line.

use crate::types::SalesRecord;

pub const FALLBACK_HEADER: &str = "Here are some relevant records:";

/// Render records under the fixed header, one `"{Region} | {Product} | {Sales}"`
/// line each. Empty input yields the header alone.
pub fn format_records(records: &[SalesRecord]) -> String {
    let mut out = String::from(FALLBACK_HEADER);
    for record in records {
        out.push('\n');
        out.push_str(&record.document_text());
    }
    out
}

/// Split a formatted record line back into region, product and sales.
/// Only exact for fields that contain no `|`.
pub fn parse_record_line(line: &str) -> Option<(String, String, f64)> {
    let mut parts = line.splitn(3, " | ");
    let region = parts.next()?;
    let product = parts.next()?;
    let sales = parts.next()?.trim().parse::<f64>().ok()?;
    Some((region.to_string(), product.to_string(), sales))
}
