//! The per-bin worker: fetch reads, build the matrix, and retry once with
//! corrected positions when the first matrix is unusable.
//!
//! Failures here are always local to one bin. They are returned as
//! [`BinOutcome::Failed`] and never abort the batch.

use log::{debug, error, info};
use thiserror::Error;

use crate::bins::Bin;
use crate::matrix::{MatrixError, ObservationMatrix};
use crate::reads::ReadSource;
use crate::Position;

/// Why a bin produced no matrix.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BinExtractionFailure {
    #[error("could not open read source: {0}")]
    Open(String),
    #[error("read request failed: {0}")]
    ReadRequest(String),
    #[error("matrix construction failed after correction: {0}")]
    Matrix(MatrixError),
    #[error("invalid index after correction: {0}")]
    IndexConflict(MatrixError),
    #[error("matrix still empty after position correction")]
    CorrectionFailed,
    #[error("worker panicked: {0}")]
    Panicked(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum BinOutcome {
    /// The first matrix build succeeded.
    Extracted(ObservationMatrix),
    /// The first build was empty or failed; the corrected rebuild succeeded.
    Corrected(ObservationMatrix),
    Failed(BinExtractionFailure),
}

/// The outcome of extracting one bin.
#[derive(Clone, Debug, PartialEq)]
pub struct BinResult {
    pub bin: Bin,
    pub outcome: BinOutcome,
}

impl BinResult {
    pub fn new(bin: Bin, outcome: BinOutcome) -> Self {
        Self { bin, outcome }
    }

    pub fn failed(bin: Bin, failure: BinExtractionFailure) -> Self {
        Self::new(bin, BinOutcome::Failed(failure))
    }

    /// The matrix, if extraction (with or without correction) succeeded.
    pub fn matrix(&self) -> Option<&ObservationMatrix> {
        match &self.outcome {
            BinOutcome::Extracted(matrix) | BinOutcome::Corrected(matrix) => Some(matrix),
            BinOutcome::Failed(_) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.matrix().is_some()
    }

    pub fn was_corrected(&self) -> bool {
        matches!(self.outcome, BinOutcome::Corrected(_))
    }

    pub fn failure(&self) -> Option<&BinExtractionFailure> {
        match &self.outcome {
            BinOutcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Extract the observation matrix of `bin` from `source`.
///
/// A failed read request fails the bin immediately. A matrix that cannot be
/// built, or is empty once all-missing rows are dropped, triggers exactly one
/// correction-and-rebuild.
pub fn extract_bin<S>(bin: &Bin, source: &mut S, bin_size: Position) -> BinResult
where
    S: ReadSource + ?Sized,
{
    let (start, end) = bin.interval(bin_size);

    let batch = match source.fetch_reads(&bin.seqname, start, end) {
        Ok(batch) => batch,
        Err(e) => {
            debug!("{}: read request failed: {}", bin, e);
            return BinResult::failed(bin.clone(), BinExtractionFailure::ReadRequest(e.to_string()));
        }
    };

    match source.build_matrix(&batch) {
        Ok(matrix) => {
            let matrix = matrix.drop_missing_rows();
            if !matrix.is_empty() {
                return BinResult::new(bin.clone(), BinOutcome::Extracted(matrix));
            }
            debug!("{}: matrix empty after dropping missing rows", bin);
        }
        Err(e) => debug!("{}: {}", bin, e),
    }

    let corrected = source.correct_positions(batch);
    let outcome = match source.build_matrix(&corrected) {
        Ok(matrix) => {
            let matrix = matrix.drop_missing_rows();
            if matrix.is_empty() {
                info!("Correction attempt at bin {}: FAILED", bin);
                BinOutcome::Failed(BinExtractionFailure::CorrectionFailed)
            } else {
                info!("Correction attempt at bin {}: SUCCESS", bin);
                BinOutcome::Corrected(matrix)
            }
        }
        Err(e @ MatrixError::IndexConflict { .. }) => {
            error!("Invalid index error when creating matrices at bin {}", bin);
            debug!("{}", e);
            BinOutcome::Failed(BinExtractionFailure::IndexConflict(e))
        }
        Err(e) => {
            info!("Correction attempt at bin {}: FAILED ({})", bin, e);
            BinOutcome::Failed(BinExtractionFailure::Matrix(e))
        }
    };
    BinResult::new(bin.clone(), outcome)
}
