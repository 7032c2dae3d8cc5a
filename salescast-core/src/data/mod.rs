//! Data loading: source trait, CSV export reader, in-memory fixtures.

pub mod csv_source;
pub mod source;

pub use csv_source::CsvSalesSource;
pub use source::{InMemorySource, LoadError, SalesSource};
