pub mod convert;
pub mod loader;
pub mod sample;
pub mod table;

pub use convert::{convert_to_csv, ConvertSummary};
pub use loader::{load_records, records_from_table};
pub use table::{Table, TableFormat};
