//! # methbins
//!
//! Tile a genome into fixed-size bins, extract a read-by-CpG methylation
//! matrix for every bin in parallel, group the matrices by their number of
//! CpG sites ("feature density"), and impute the missing calls with one
//! model per density.
//!
//! The two external collaborators are traits: a [`ReadSource`] produces
//! per-read CpG calls for a window (see [`BamReadSource`] for the BAM
//! implementation), and an [`ImputationModel`] is trained on and then fills
//! the matrices of one density class (see [`ConcordanceModel`]).
//!
//! [`ReadSource`]: crate::reads::ReadSource
//! [`BamReadSource`]: crate::bam::BamReadSource
//! [`ImputationModel`]: crate::model::ImputationModel
//! [`ConcordanceModel`]: crate::model::ConcordanceModel

/// Create an [`indexmap::IndexMap`] of sequence names and their lengths.
#[macro_export]
macro_rules! seqlens {
    ($($key:expr => $value:expr),* $(,)?) => {
        $crate::indexmap::IndexMap::<String, $crate::Position>::from_iter(vec![$(($key.to_string(), $value)),*])
    };
}

#[doc(hidden)]
pub use indexmap;

pub mod aggregate;
pub mod bam;
pub mod bins;
pub mod config;
pub mod error;
pub mod extract;
pub mod impute;
pub mod io;
pub mod matrix;
pub mod model;
pub mod pipeline;
pub mod pool;
pub mod postprocess;
pub mod progress;
pub mod reads;
pub mod reporting;
pub mod seqlens;
pub mod test_utilities;

/// 1-based genomic coordinate.
#[cfg(not(feature = "big-position"))]
pub type Position = u32;
#[cfg(feature = "big-position")]
pub type Position = u64;

pub mod prelude {
    pub use crate::aggregate::{aggregate, Aggregation, ClassMatrices, Density, DensityClasses};
    pub use crate::bins::{generate_bins, Bin};
    pub use crate::config::RunConfig;
    pub use crate::error::MethBinsError;
    pub use crate::extract::{extract_bin, BinExtractionFailure, BinOutcome, BinResult};
    pub use crate::io::file::read_seqlens;
    pub use crate::matrix::{Call, MatrixError, ObservationMatrix};
    pub use crate::model::{ConcordanceModel, ImputationModel, ModelError, TrainedModel};
    pub use crate::postprocess::{postprocess, Thresholds};
    pub use crate::reads::{MethylationRead, ReadBatch, ReadSource, ReadSourceOpener};
    pub use crate::seqlens::{restrict, select_sequence, SequenceFilter};
}
