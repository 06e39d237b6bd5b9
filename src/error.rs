//! The [`MethBinsError`] `enum` definition and error messages.
//!
//! Errors here are *run-level*: they abort a run (or, for persistence, the
//! artifact being written). Per-bin and per-density failures have their own
//! types, [`BinExtractionFailure`] and [`ModelError`], because they are
//! recovered locally and never escalate to this type.
//!
//! [`BinExtractionFailure`]: crate::extract::BinExtractionFailure
//! [`ModelError`]: crate::model::ModelError
use std::num::ParseIntError;
use thiserror::Error;

/// The [`MethBinsError`] defines the standard set of errors that should
/// be passed to the user.
#[derive(Debug, Error)]
pub enum MethBinsError {
    // IO related errors
    #[error("File reading/writing error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Could not write .npz archive: {0}")]
    NpzWriteError(#[from] ndarray_npy::WriteNpzError),

    // Genome file parsing related errors
    #[error("Integer parsing error: {0}")]
    ParseIntError(#[from] ParseIntError),
    #[error("Genome file is invalid: {0}")]
    InvalidGenomeFile(String),
    #[error("Genome file could not be parsed: {0}")]
    CsvError(#[from] csv::Error),

    // Alignment file errors (catalog phase only; per-bin errors never get here)
    #[error("Alignment file error: {0}")]
    Bam(String),

    // Run configuration errors
    #[error("Sequence '{0}' is not in the sequence catalog")]
    UnknownSequence(String),
    #[error("Invalid run configuration: {0}")]
    InvalidConfig(String),

    // Worker pool errors
    #[error("Could not build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    // Command line tool related errors
    #[error("Command line argument error: {0}")]
    ArgumentError(#[from] clap::error::Error),
}
