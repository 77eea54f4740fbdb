//! Storage backends.
//!
//! - `CsvDatasetStore`: CSV files laid out per position and city
//! - `MemoryDatasetStore`: in-memory storage for tests and dry runs

pub mod csv;
pub mod memory;

pub use self::csv::CsvDatasetStore;
pub use memory::MemoryDatasetStore;
