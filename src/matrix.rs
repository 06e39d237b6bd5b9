//! Observation matrices: reads (rows) × CpG sites (columns) of methylation calls.
//!
//! Cells are a tri-state [`Call`] rather than floats with a NaN sentinel, so
//! "missing" is never a floating point comparison. Numeric views are produced
//! at the edges: [`ObservationMatrix::sentinel_fill()`] for model input
//! (missing → `-1.0`) and [`ObservationMatrix::to_nan_array()`] for storage
//! (missing → `NaN`).

use std::collections::BTreeSet;
use std::fmt;

use ndarray::{Array2, Axis};
use thiserror::Error;

use crate::reads::ReadBatch;
use crate::Position;

/// Value that stands in for a missing call in model input matrices.
pub const SENTINEL: f64 = -1.0;

/// A single methylation call at one CpG site in one read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Call {
    Zero,
    One,
    Missing,
}

impl Call {
    pub fn is_missing(self) -> bool {
        matches!(self, Call::Missing)
    }

    /// Numeric value of the call, with `missing` substituted for [`Call::Missing`].
    pub fn to_f64_or(self, missing: f64) -> f64 {
        match self {
            Call::Zero => 0.0,
            Call::One => 1.0,
            Call::Missing => missing,
        }
    }

    /// Exact 0 and 1 are calls; everything else (including NaN and the
    /// sentinel) is missing.
    pub fn from_f64(value: f64) -> Self {
        if value == 0.0 {
            Call::Zero
        } else if value == 1.0 {
            Call::One
        } else {
            Call::Missing
        }
    }
}

/// Why a matrix could not be built from a batch of reads.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MatrixError {
    #[error("no reads with CpG calls in window")]
    NoData,
    #[error("malformed read data: {0}")]
    Malformed(String),
    #[error("read '{read}' has conflicting calls at position {position}")]
    IndexConflict { read: String, position: Position },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ObservationMatrix {
    positions: Vec<Position>,
    calls: Array2<Call>,
}

impl ObservationMatrix {
    /// Create a new matrix, checking that there is one (strictly increasing)
    /// position per column.
    pub fn new(positions: Vec<Position>, calls: Array2<Call>) -> Result<Self, MatrixError> {
        if positions.len() != calls.ncols() {
            return Err(MatrixError::Malformed(format!(
                "{} positions for {} columns",
                positions.len(),
                calls.ncols()
            )));
        }
        if positions.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(MatrixError::Malformed(
                "positions must be strictly increasing".to_string(),
            ));
        }
        Ok(Self { positions, calls })
    }

    /// Convenience constructor from row vectors.
    pub fn from_rows(positions: Vec<Position>, rows: Vec<Vec<Call>>) -> Result<Self, MatrixError> {
        let ncols = positions.len();
        if let Some(row) = rows.iter().find(|row| row.len() != ncols) {
            return Err(MatrixError::Malformed(format!(
                "row of length {} in a matrix with {} columns",
                row.len(),
                ncols
            )));
        }
        let nrows = rows.len();
        let flat: Vec<Call> = rows.into_iter().flatten().collect();
        let calls = Array2::from_shape_vec((nrows, ncols), flat)
            .map_err(|e| MatrixError::Malformed(e.to_string()))?;
        Self::new(positions, calls)
    }

    /// Build the matrix for a batch of reads.
    ///
    /// Columns are the sorted union of every call position inside the batch
    /// window; each read becomes one row. Calls outside the window are
    /// ignored. A read without calls in the window becomes an all-missing row
    /// (see [`ObservationMatrix::drop_missing_rows()`]).
    pub fn from_reads(batch: &ReadBatch) -> Result<Self, MatrixError> {
        if batch.start == 0 || batch.start > batch.end {
            return Err(MatrixError::Malformed(format!(
                "invalid window {}:{}-{}",
                batch.seqname, batch.start, batch.end
            )));
        }
        if batch.reads.is_empty() {
            return Err(MatrixError::NoData);
        }

        let in_window = |position: Position| position >= batch.start && position <= batch.end;
        let positions: Vec<Position> = batch
            .reads
            .iter()
            .flat_map(|read| read.calls.iter().map(|(position, _)| *position))
            .filter(|position| in_window(*position))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if positions.is_empty() {
            return Err(MatrixError::NoData);
        }

        let mut calls = Array2::from_elem((batch.reads.len(), positions.len()), Call::Missing);
        for (row, read) in batch.reads.iter().enumerate() {
            for (position, call) in read.calls.iter().filter(|(p, _)| in_window(*p)) {
                // present by construction of `positions`
                let col = positions
                    .binary_search(position)
                    .map_err(|_| MatrixError::Malformed(format!("lost position {}", position)))?;
                let cell = &mut calls[[row, col]];
                if !cell.is_missing() && !call.is_missing() && *cell != *call {
                    return Err(MatrixError::IndexConflict {
                        read: read.name.clone(),
                        position: *position,
                    });
                }
                if cell.is_missing() {
                    *cell = *call;
                }
            }
        }
        Self::new(positions, calls)
    }

    /// Drop every row that has no observed call.
    pub fn drop_missing_rows(self) -> Self {
        let keep: Vec<usize> = self
            .calls
            .axis_iter(Axis(0))
            .enumerate()
            .filter(|(_, row)| row.iter().any(|call| !call.is_missing()))
            .map(|(index, _)| index)
            .collect();
        let calls = self.calls.select(Axis(0), &keep);
        Self {
            positions: self.positions,
            calls,
        }
    }

    /// Number of reads.
    pub fn nrows(&self) -> usize {
        self.calls.nrows()
    }

    /// Number of CpG sites, i.e. the feature density of the bin.
    pub fn ncols(&self) -> usize {
        self.calls.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.nrows() == 0
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn calls(&self) -> &Array2<Call> {
        &self.calls
    }

    /// Numeric model input: observed calls as 0.0/1.0, missing as [`SENTINEL`].
    pub fn sentinel_fill(&self) -> Array2<f64> {
        self.calls.mapv(|call| call.to_f64_or(SENTINEL))
    }

    /// Numeric storage form: observed calls as 0.0/1.0, missing as NaN.
    pub fn to_nan_array(&self) -> Array2<f64> {
        self.calls.mapv(|call| call.to_f64_or(f64::NAN))
    }
}

/// Renders rows of right-aligned `1.0`/`0.0`/`NaN` cells, one line per read,
/// without a trailing newline.
impl fmt::Display for ObservationMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self
            .calls
            .axis_iter(Axis(0))
            .map(|row| {
                row.iter()
                    .map(|call| format!("{:>3}", format_call(*call)))
                    .collect::<Vec<_>>()
                    .join("  ")
            })
            .collect();
        write!(f, "{}", lines.join("\n"))
    }
}

fn format_call(call: Call) -> &'static str {
    match call {
        Call::Zero => "0.0",
        Call::One => "1.0",
        Call::Missing => "NaN",
    }
}
