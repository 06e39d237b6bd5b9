//! Run-scoped configuration, built and validated once.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::MethBinsError;
use crate::io::store::{StoreNames, ALL_SCOPE};
use crate::pool::{DEFAULT_CHUNK_SIZE, DEFAULT_THREADS};
use crate::postprocess::Thresholds;
use crate::progress::DEFAULT_INTERVAL;
use crate::seqlens::SequenceFilter;
use crate::Position;

/// Everything a run needs to know. Passed by reference to every component.
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    pub bin_size: Position,
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub chromosome: Option<String>,
    pub threads: usize,
    pub chunk_size: usize,
    pub progress_interval: Duration,
    pub sequence_filter: SequenceFilter,
    /// Genome file to use instead of the read source's own catalog.
    pub seqlens_path: Option<PathBuf>,
    pub thresholds: Thresholds,
}

impl RunConfig {
    /// A configuration with default settings. The output directory defaults
    /// to the directory containing `input`.
    pub fn new(bin_size: Position, input: impl Into<PathBuf>) -> Result<Self, MethBinsError> {
        let input = input.into();
        let output_dir = default_output_dir(&input);
        Self {
            bin_size,
            input,
            output_dir,
            chromosome: None,
            threads: DEFAULT_THREADS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_interval: DEFAULT_INTERVAL,
            sequence_filter: SequenceFilter::default(),
            seqlens_path: None,
            thresholds: Thresholds::default(),
        }
        .validate()
    }

    /// Check the invariants every component relies on.
    pub fn validate(self) -> Result<Self, MethBinsError> {
        if self.bin_size == 0 {
            return Err(MethBinsError::InvalidConfig(
                "bin size must be a positive integer".to_string(),
            ));
        }
        if self.threads == 0 {
            return Err(MethBinsError::InvalidConfig(
                "number of threads must be at least 1".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(MethBinsError::InvalidConfig(
                "chunk size must be at least 1".to_string(),
            ));
        }
        if self.progress_interval.is_zero() {
            return Err(MethBinsError::InvalidConfig(
                "progress interval must be positive".to_string(),
            ));
        }
        if let Some(chromosome) = &self.chromosome {
            if chromosome.is_empty() {
                return Err(MethBinsError::InvalidConfig(
                    "chromosome name is empty".to_string(),
                ));
            }
        }
        Ok(self)
    }

    /// The input file name, used to name outputs.
    pub fn sample_name(&self) -> String {
        self.input
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sample".to_string())
    }

    /// The selected sequence, or `all`.
    pub fn scope(&self) -> &str {
        self.chromosome.as_deref().unwrap_or(ALL_SCOPE)
    }

    pub fn store_names(&self) -> StoreNames {
        StoreNames::new(&self.output_dir, self.sample_name(), self.scope())
    }
}

fn default_output_dir(input: &Path) -> PathBuf {
    match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
