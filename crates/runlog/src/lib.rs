//! Run log backends for naturalmaps.
//!
//! - `json_file`: whole-file JSON document, human-inspectable (default)
//! - `in_memory`: for tests and throwaway runs

pub mod in_memory;
pub mod json_file;

pub use in_memory::InMemoryRunLog;
pub use json_file::JsonFileRunLog;
