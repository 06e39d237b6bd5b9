//! The extraction worker pool.
//!
//! One [`rayon::ThreadPool`] is built per sequence and drained before the next
//! sequence starts. Bins are handed out in chunks; each worker thread opens its
//! own read source handle. Results come back in the same order as the input
//! bins.

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use log::info;
use rayon::prelude::*;

use crate::bins::Bin;
use crate::config::RunConfig;
use crate::error::MethBinsError;
use crate::extract::{extract_bin, BinExtractionFailure, BinResult};
use crate::progress::{ChunkCounter, ProgressMonitor};
use crate::reads::{ReadSource, ReadSourceOpener};
use crate::Position;

/// Default number of worker threads.
pub const DEFAULT_THREADS: usize = 24;

/// Default number of bins per scheduling chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 16;

#[derive(Clone, Debug)]
pub struct ExtractionPool {
    threads: usize,
    chunk_size: usize,
    progress_interval: Duration,
}

impl ExtractionPool {
    pub fn new(threads: usize, chunk_size: usize, progress_interval: Duration) -> Self {
        Self {
            threads: threads.max(1),
            chunk_size: chunk_size.max(1),
            progress_interval,
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.threads, config.chunk_size, config.progress_interval)
    }

    /// Extract every bin of one sequence on a fresh pool, blocking until all
    /// bins are done. `results[i]` belongs to `bins[i]`.
    pub fn extract_sequence<O>(
        &self,
        seqname: &str,
        bins: &[Bin],
        opener: &O,
        bin_size: Position,
    ) -> Result<Vec<BinResult>, MethBinsError>
    where
        O: ReadSourceOpener,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|index| format!("methbins-worker-{}", index))
            .build()?;

        info!(
            "{}: extracting {} bins on {} workers",
            seqname,
            bins.len(),
            self.threads
        );

        let counter = ChunkCounter::new(bins.len(), self.chunk_size);
        let monitor = ProgressMonitor::new(seqname, self.progress_interval);

        let chunked: Vec<Vec<BinResult>> = monitor.run_monitored(&counter, || {
            pool.install(|| {
                bins.par_chunks(self.chunk_size)
                    .map_init(
                        || opener.open(),
                        |source, chunk| {
                            let results = chunk
                                .iter()
                                .map(|bin| match source {
                                    Ok(source) => extract_guarded(bin, source, bin_size),
                                    Err(e) => BinResult::failed(
                                        bin.clone(),
                                        BinExtractionFailure::Open(e.to_string()),
                                    ),
                                })
                                .collect::<Vec<_>>();
                            counter.complete_chunk();
                            results
                        },
                    )
                    .collect()
            })
        });

        Ok(chunked.into_iter().flatten().collect())
    }
}

/// Run [`extract_bin`], turning a panic in the read source into a failed bin.
fn extract_guarded<S>(bin: &Bin, source: &mut S, bin_size: Position) -> BinResult
where
    S: ReadSource,
{
    match panic::catch_unwind(AssertUnwindSafe(|| extract_bin(bin, source, bin_size))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("Unknown error: {}", bin);
            BinResult::failed(bin.clone(), BinExtractionFailure::Panicked(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bins::generate_bins;
    use crate::matrix::Call::*;
    use crate::reads::MethylationRead;
    use crate::test_utilities::{MockOpener, MockReadSource};

    fn pool() -> ExtractionPool {
        ExtractionPool::new(4, 3, Duration::from_millis(10))
    }

    #[test]
    fn test_results_in_submission_order() {
        let reads: Vec<MethylationRead> = (0..50)
            .map(|i| MethylationRead::new(format!("r{}", i), vec![(i * 100 + 10, One)]))
            .collect();
        let source = MockReadSource::new(seqlens!("chr1" => 5000)).with_reads("chr1", reads);
        let opener = MockOpener::new(source);

        let bins = generate_bins(&seqlens!("chr1" => 5000), 100).unwrap();
        let results = pool()
            .extract_sequence("chr1", &bins["chr1"], &opener, 100)
            .unwrap();

        assert_eq!(results.len(), 50);
        for (bin, result) in bins["chr1"].iter().zip(results.iter()) {
            assert_eq!(&result.bin, bin);
            let matrix = result.matrix().unwrap();
            assert_eq!(matrix.positions(), &[bin.end - 90]);
        }
    }

    #[test]
    fn test_failures_stay_local() {
        let source = MockReadSource::new(seqlens!("chr1" => 300))
            .with_reads(
                "chr1",
                vec![
                    MethylationRead::new("r1", vec![(10, One)]),
                    MethylationRead::new("r2", vec![(210, Zero)]),
                ],
            )
            .failing_fetch("chr1", 300)
            .panicking_fetch("chr1", 200);
        let opener = MockOpener::new(source);
        let bins = vec![
            Bin::new("chr1", 100),
            Bin::new("chr1", 200),
            Bin::new("chr1", 300),
        ];
        let results = pool().extract_sequence("chr1", &bins, &opener, 100).unwrap();
        assert!(results[0].is_success());
        assert!(matches!(
            results[1].failure(),
            Some(BinExtractionFailure::Panicked(_))
        ));
        assert!(matches!(
            results[2].failure(),
            Some(BinExtractionFailure::ReadRequest(_))
        ));
    }

    #[test]
    fn test_open_failure_fails_bins() {
        let opener = MockOpener::new(MockReadSource::new(seqlens!("chr1" => 300))).failing_open();
        let bins = vec![Bin::new("chr1", 100), Bin::new("chr1", 200)];
        let results = pool().extract_sequence("chr1", &bins, &opener, 100).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|result| matches!(result.failure(), Some(BinExtractionFailure::Open(_)))));
    }

    #[test]
    fn test_empty_sequence() {
        let opener = MockOpener::new(MockReadSource::new(seqlens!("chr1" => 0)));
        let results = pool().extract_sequence("chr1", &[], &opener, 100).unwrap();
        assert!(results.is_empty());
    }
}
