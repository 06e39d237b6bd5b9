//! Per-read CpG calls and the [`ReadSource`] trait that produces them.
//!
//! A read source is opened once per worker through a [`ReadSourceOpener`]:
//! handles are never shared across threads.

use std::collections::{BTreeMap, BTreeSet};
use std::io;

use indexmap::IndexMap;

use crate::error::MethBinsError;
use crate::matrix::{Call, MatrixError, ObservationMatrix};
use crate::Position;

/// The CpG calls of one read, as `(position, call)` pairs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethylationRead {
    pub name: String,
    pub calls: Vec<(Position, Call)>,
}

impl MethylationRead {
    pub fn new(name: impl Into<String>, calls: Vec<(Position, Call)>) -> Self {
        Self {
            name: name.into(),
            calls,
        }
    }
}

/// The reads overlapping one window, `start..=end` (1-based).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadBatch {
    pub seqname: String,
    pub start: Position,
    pub end: Position,
    pub reads: Vec<MethylationRead>,
}

impl ReadBatch {
    pub fn new(
        seqname: impl Into<String>,
        start: Position,
        end: Position,
        reads: Vec<MethylationRead>,
    ) -> Self {
        Self {
            seqname: seqname.into(),
            start,
            end,
            reads,
        }
    }

    pub fn len(&self) -> usize {
        self.reads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }
}

/// A source of methylation calls, e.g. an indexed alignment file.
pub trait ReadSource {
    /// Every sequence name and length the source knows about, unfiltered.
    fn sequence_catalog(&mut self) -> Result<IndexMap<String, Position>, MethBinsError>;

    /// Fetch all reads overlapping `start..=end` on `seqname`.
    fn fetch_reads(&mut self, seqname: &str, start: Position, end: Position) -> io::Result<ReadBatch>;

    /// Build the observation matrix for a batch.
    fn build_matrix(&self, batch: &ReadBatch) -> Result<ObservationMatrix, MatrixError> {
        ObservationMatrix::from_reads(batch)
    }

    /// Re-anchor site positions of already-fetched reads.
    fn correct_positions(&self, batch: ReadBatch) -> ReadBatch {
        correct_cpg_positions(batch)
    }
}

/// Opens independent [`ReadSource`] handles, one per worker.
pub trait ReadSourceOpener: Sync {
    type Source: ReadSource;

    fn open(&self) -> Result<Self::Source, MethBinsError>;
}

/// Merge off-by-one CpG positions across a batch.
///
/// The C of a CpG on the reverse strand is reported one base downstream of the
/// forward-strand C. Scanning positions in increasing order, a position `p + 1`
/// whose neighbour `p` is an anchor (i.e. was not itself moved) is re-anchored
/// to `p`. If a read then holds two calls for the same site they are kept when
/// they agree and become [`Call::Missing`] when they don't.
pub fn correct_cpg_positions(batch: ReadBatch) -> ReadBatch {
    let observed: BTreeSet<Position> = batch
        .reads
        .iter()
        .flat_map(|read| read.calls.iter().map(|(position, _)| *position))
        .collect();

    let mut remap: BTreeMap<Position, Position> = BTreeMap::new();
    let mut last_anchor: Option<Position> = None;
    for position in observed {
        match last_anchor {
            Some(anchor) if anchor + 1 == position => {
                remap.insert(position, anchor);
                // a moved position cannot anchor the next one
                last_anchor = None;
            }
            _ => last_anchor = Some(position),
        }
    }

    if remap.is_empty() {
        return batch;
    }

    let reads = batch
        .reads
        .into_iter()
        .map(|read| {
            let mut merged: BTreeMap<Position, Call> = BTreeMap::new();
            for (position, call) in read.calls {
                let position = remap.get(&position).copied().unwrap_or(position);
                merged
                    .entry(position)
                    .and_modify(|existing| {
                        if *existing != call {
                            *existing = Call::Missing;
                        }
                    })
                    .or_insert(call);
            }
            MethylationRead::new(read.name, merged.into_iter().collect())
        })
        .collect();

    ReadBatch { reads, ..batch }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Call::*;

    #[test]
    fn test_correct_shifts_reverse_strand() {
        let batch = ReadBatch::new(
            "chr1",
            101,
            200,
            vec![
                MethylationRead::new("fwd", vec![(110, One), (130, Zero)]),
                MethylationRead::new("rev", vec![(111, One), (131, One)]),
            ],
        );
        let corrected = correct_cpg_positions(batch);
        assert_eq!(corrected.reads[0].calls, vec![(110, One), (130, Zero)]);
        assert_eq!(corrected.reads[1].calls, vec![(110, One), (130, One)]);
    }

    #[test]
    fn test_correct_chain_of_sites() {
        // CGCG on both strands: Cs at 110, 112 and reverse calls at 111, 113
        let batch = ReadBatch::new(
            "chr1",
            101,
            200,
            vec![MethylationRead::new(
                "r1",
                vec![(110, One), (111, One), (112, Zero), (113, Zero)],
            )],
        );
        let corrected = correct_cpg_positions(batch);
        assert_eq!(corrected.reads[0].calls, vec![(110, One), (112, Zero)]);
    }

    #[test]
    fn test_correct_disagreement_is_missing() {
        let batch = ReadBatch::new(
            "chr1",
            101,
            200,
            vec![MethylationRead::new("r1", vec![(110, One), (111, Zero)])],
        );
        let corrected = correct_cpg_positions(batch);
        assert_eq!(corrected.reads[0].calls, vec![(110, Missing)]);
    }

    #[test]
    fn test_correct_noop() {
        let batch = ReadBatch::new(
            "chr1",
            101,
            200,
            vec![MethylationRead::new("r1", vec![(110, One), (150, Zero)])],
        );
        assert_eq!(correct_cpg_positions(batch.clone()), batch);
    }
}
