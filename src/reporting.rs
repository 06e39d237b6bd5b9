//! Types for standardized reports to the user about a run.
//!
//! Per-bin and per-density failures never abort a run. They are counted in a
//! [`RunSummary`] and described in a [`Report`] so the user can see what was
//! skipped and why.

use std::fmt;

use indexmap::IndexMap;

use crate::aggregate::Density;
use crate::extract::BinResult;

/// The [`CommandOutput<U>`] type output is generic over some data output
/// from a command, and a [`Report`] that reports information to the user.
#[derive(Debug)]
pub struct CommandOutput<U> {
    value: U,
    report: Report,
}

impl<U> CommandOutput<U> {
    pub fn new(value: U, report: Report) -> Self {
        Self { value, report }
    }

    pub fn value(&self) -> &U {
        &self.value
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    pub fn into_parts(self) -> (U, Report) {
        (self.value, self.report)
    }
}

/// A type to (semi) standardize reporting to the user.
#[derive(Clone, Debug, Default)]
pub struct Report {
    entries: Vec<String>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_issue(&mut self, message: String) {
        self.entries.push(message)
    }

    pub fn issues(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "  - {}", entry)?;
        }
        Ok(())
    }
}

/// Bin counts for one sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SequenceSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub corrected: usize,
    pub failed: usize,
}

impl SequenceSummary {
    pub fn from_results(results: &[BinResult]) -> Self {
        let mut summary = Self {
            attempted: results.len(),
            ..Self::default()
        };
        for result in results {
            if result.is_success() {
                summary.succeeded += 1;
                if result.was_corrected() {
                    summary.corrected += 1;
                }
            } else {
                summary.failed += 1;
            }
        }
        summary
    }
}

/// What a run produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub sequences: IndexMap<String, SequenceSummary>,
    /// Number of matrices written per imputed density class. Skipped or
    /// failed classes are absent.
    pub imputed: IndexMap<Density, usize>,
}

impl RunSummary {
    pub fn total(&self) -> SequenceSummary {
        self.sequences
            .values()
            .fold(SequenceSummary::default(), |acc, s| SequenceSummary {
                attempted: acc.attempted + s.attempted,
                succeeded: acc.succeeded + s.succeeded,
                corrected: acc.corrected + s.corrected,
                failed: acc.failed + s.failed,
            })
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "sequence\tattempted\tsucceeded\tcorrected\tfailed")?;
        for (seqname, s) in &self.sequences {
            writeln!(
                f,
                "{}\t{}\t{}\t{}\t{}",
                seqname, s.attempted, s.succeeded, s.corrected, s.failed
            )?;
        }
        for (density, count) in &self.imputed {
            writeln!(f, "imputed CpG density {}: {} matrices", density, count)?;
        }
        Ok(())
    }
}
