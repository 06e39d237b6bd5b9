//! Types and methods for reading genome files and writing matrix stores.

pub mod file;
pub mod store;

pub use file::{read_seqlens, InputFile, OutputFile};
pub use store::{write_imputed_matrices, write_raw_matrices, StoreNames};
