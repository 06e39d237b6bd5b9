//! The sequence length catalog: which sequences get binned.
//!
//! The unfiltered catalog comes from [`ReadSource::sequence_catalog()`] (or a
//! genome file, see [`read_seqlens()`]). It is then narrowed by a
//! [`SequenceFilter`] and, optionally, down to a single named sequence.
//!
//! [`ReadSource::sequence_catalog()`]: crate::reads::ReadSource::sequence_catalog
//! [`read_seqlens()`]: crate::io::file::read_seqlens

use indexmap::IndexMap;

use crate::{error::MethBinsError, Position};

/// Default prefix of primary-assembly sequence names.
pub const PRIMARY_PREFIX: &str = "chr";

/// Which sequences of the catalog to keep.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SequenceFilter {
    /// Keep only sequences whose name starts with this prefix, e.g. `"chr"` to
    /// drop unplaced scaffolds and contigs.
    Prefix(String),
    /// Keep everything.
    All,
}

impl Default for SequenceFilter {
    fn default() -> Self {
        SequenceFilter::Prefix(PRIMARY_PREFIX.to_string())
    }
}

impl SequenceFilter {
    pub fn accepts(&self, seqname: &str) -> bool {
        match self {
            SequenceFilter::Prefix(prefix) => seqname.starts_with(prefix.as_str()),
            SequenceFilter::All => true,
        }
    }
}

/// Remove every entry whose name fails `predicate`. Order is preserved.
pub fn restrict<F>(seqlens: IndexMap<String, Position>, predicate: F) -> IndexMap<String, Position>
where
    F: Fn(&str) -> bool,
{
    seqlens
        .into_iter()
        .filter(|(seqname, _)| predicate(seqname))
        .collect()
}

/// Restrict the catalog to exactly the sequence `seqname`.
pub fn select_sequence(
    seqlens: &IndexMap<String, Position>,
    seqname: &str,
) -> Result<IndexMap<String, Position>, MethBinsError> {
    let length = seqlens
        .get(seqname)
        .ok_or(MethBinsError::UnknownSequence(seqname.to_string()))?;
    let mut selected = IndexMap::new();
    selected.insert(seqname.to_string(), *length);
    Ok(selected)
}

/// Apply the filter and then the optional single-sequence selection.
pub fn filter_catalog(
    seqlens: IndexMap<String, Position>,
    filter: &SequenceFilter,
    chromosome: Option<&str>,
) -> Result<IndexMap<String, Position>, MethBinsError> {
    let retained = restrict(seqlens, |seqname| filter.accepts(seqname));
    match chromosome {
        Some(seqname) => select_sequence(&retained, seqname),
        None => Ok(retained),
    }
}
