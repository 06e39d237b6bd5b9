//! Test cases and test utility functions.
//!

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use rand::{thread_rng, Rng};

use crate::error::MethBinsError;
use crate::matrix::{Call, ObservationMatrix};
use crate::reads::{correct_cpg_positions, MethylationRead, ReadBatch, ReadSource, ReadSourceOpener};
use crate::Position;

// chromosome sizes
pub const MIN_CHROM_LEN: Position = 50_000_000;
pub const MAX_CHROM_LEN: Position = 250_000_000;

/// Build random sequence lengths
pub fn random_seqlen() -> Position {
    let mut rng = thread_rng();
    rng.gen_range(MIN_CHROM_LEN..=MAX_CHROM_LEN)
}

/// Build an [`ObservationMatrix`] from rows of calls. Columns sit at positions
/// 10, 20, 30, ...
pub fn observation_matrix(rows: &[&[Call]]) -> ObservationMatrix {
    let ncols = rows.first().map_or(0, |row| row.len());
    let positions = (1..=ncols as Position).map(|i| i * 10).collect();
    ObservationMatrix::from_rows(positions, rows.iter().map(|row| row.to_vec()).collect())
        .expect("test rows must all have the same length")
}

/// A random batch of `nreads` reads over `nsites` CpGs spaced 10bp apart in
/// the window `1..=10 * nsites`. Roughly a third of the calls are absent.
pub fn random_read_batch(nreads: usize, nsites: usize) -> ReadBatch {
    let mut rng = thread_rng();
    let reads = (0..nreads)
        .map(|i| {
            let calls = (1..=nsites as Position)
                .filter_map(|site| {
                    if !rng.gen_bool(2.0 / 3.0) {
                        return None;
                    }
                    let call = if rng.gen_bool(0.5) { Call::One } else { Call::Zero };
                    Some((site * 10, call))
                })
                .collect();
            MethylationRead::new(format!("read{}", i), calls)
        })
        .collect();
    ReadBatch::new("chr1", 1, 10 * nsites as Position, reads)
}

/// An in-memory [`ReadSource`].
///
/// Reads are stored per sequence; a fetch returns every read with at least
/// one call inside the requested window. Individual bins (by sequence and end
/// coordinate) can be made to fail or panic on fetch.
#[derive(Clone, Debug, Default)]
pub struct MockReadSource {
    seqlens: IndexMap<String, Position>,
    reads: HashMap<String, Vec<MethylationRead>>,
    failing: HashSet<(String, Position)>,
    panicking: HashSet<(String, Position)>,
    skip_correction: bool,
    corrections: Arc<AtomicUsize>,
}

impl MockReadSource {
    pub fn new(seqlens: IndexMap<String, Position>) -> Self {
        Self {
            seqlens,
            ..Self::default()
        }
    }

    pub fn with_reads(mut self, seqname: &str, reads: Vec<MethylationRead>) -> Self {
        self.reads.entry(seqname.to_string()).or_default().extend(reads);
        self
    }

    /// Make the fetch for the window ending at `end` return an error.
    pub fn failing_fetch(mut self, seqname: &str, end: Position) -> Self {
        self.failing.insert((seqname.to_string(), end));
        self
    }

    /// Make the fetch for the window ending at `end` panic.
    pub fn panicking_fetch(mut self, seqname: &str, end: Position) -> Self {
        self.panicking.insert((seqname.to_string(), end));
        self
    }

    /// Position correction returns the batch unchanged (but is still counted).
    pub fn without_correction(mut self) -> Self {
        self.skip_correction = true;
        self
    }

    /// How many times [`ReadSource::correct_positions()`] was called, across
    /// all clones of this source.
    pub fn corrections(&self) -> usize {
        self.corrections.load(Ordering::SeqCst)
    }
}

impl ReadSource for MockReadSource {
    fn sequence_catalog(&mut self) -> Result<IndexMap<String, Position>, MethBinsError> {
        Ok(self.seqlens.clone())
    }

    fn fetch_reads(&mut self, seqname: &str, start: Position, end: Position) -> io::Result<ReadBatch> {
        let key = (seqname.to_string(), end);
        if self.panicking.contains(&key) {
            panic!("simulated read source panic at {}_{}", seqname, end);
        }
        if self.failing.contains(&key) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("simulated read failure at {}_{}", seqname, end),
            ));
        }
        if !self.seqlens.contains_key(seqname) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("unknown sequence '{}'", seqname),
            ));
        }
        let reads = self
            .reads
            .get(seqname)
            .map(|reads| {
                reads
                    .iter()
                    .filter(|read| read.calls.iter().any(|(p, _)| *p >= start && *p <= end))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(ReadBatch::new(seqname, start, end, reads))
    }

    fn correct_positions(&self, batch: ReadBatch) -> ReadBatch {
        self.corrections.fetch_add(1, Ordering::SeqCst);
        if self.skip_correction {
            batch
        } else {
            correct_cpg_positions(batch)
        }
    }
}

/// Hands every worker a clone of one [`MockReadSource`].
#[derive(Debug)]
pub struct MockOpener {
    source: MockReadSource,
    fail: bool,
    opened: AtomicUsize,
}

impl MockOpener {
    pub fn new(source: MockReadSource) -> Self {
        Self {
            source,
            fail: false,
            opened: AtomicUsize::new(0),
        }
    }

    /// Every `open()` fails.
    pub fn failing_open(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn source(&self) -> &MockReadSource {
        &self.source
    }
}

impl ReadSourceOpener for MockOpener {
    type Source = MockReadSource;

    fn open(&self) -> Result<MockReadSource, MethBinsError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(MethBinsError::Bam("simulated open failure".to_string()));
        }
        Ok(self.source.clone())
    }
}

/// A small genome with a known outcome for bin size 100.
///
/// `chrT` (length 250) tiles into `chrT_100`, `chrT_200` and `chrT_300`:
///  - `chrT_100`: three reads over two CpGs, one read without calls;
///  - `chrT_200`: no reads at all;
///  - `chrT_300`: two reads over three CpGs.
///
/// A scaffold, `scaffold_1`, carries reads but is not a primary sequence.
pub fn chrt_scenario() -> MockReadSource {
    use Call::*;
    MockReadSource::new(seqlens!("chrT" => 250, "scaffold_1" => 100))
        .with_reads(
            "chrT",
            vec![
                MethylationRead::new("r1", vec![(20, One), (40, Zero)]),
                MethylationRead::new("r2", vec![(20, One), (40, One)]),
                MethylationRead::new("r3", vec![(20, Missing), (40, Missing)]),
                MethylationRead::new("r4", vec![(210, One), (220, Zero), (230, One)]),
                MethylationRead::new("r5", vec![(210, Zero), (220, Missing), (230, One)]),
            ],
        )
        .with_reads(
            "scaffold_1",
            vec![MethylationRead::new("s1", vec![(10, One), (30, One)])],
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_fetch_window() {
        let mut source = chrt_scenario();
        let batch = source.fetch_reads("chrT", 101, 200).unwrap();
        assert!(batch.is_empty());
        let batch = source.fetch_reads("chrT", 1, 100).unwrap();
        assert_eq!(batch.len(), 3);
        assert!(source.fetch_reads("chrZ", 1, 100).is_err());
    }

    #[test]
    fn test_mock_opener_counts() {
        let opener = MockOpener::new(chrt_scenario());
        opener.open().unwrap();
        opener.open().unwrap();
        assert_eq!(opener.opened(), 2);
        assert!(MockOpener::new(chrt_scenario()).failing_open().open().is_err());
    }

    #[test]
    fn test_random_read_batch() {
        let batch = random_read_batch(20, 4);
        assert_eq!(batch.len(), 20);
        assert_eq!(batch.end, 40);
        assert!(batch
            .reads
            .iter()
            .all(|read| read.calls.iter().all(|(p, _)| *p % 10 == 0 && *p <= 40)));
    }
}
