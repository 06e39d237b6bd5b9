//! Fixed-size genomic bins.
//!
//! A [`Bin`] is named by its sequence and its *end* coordinate, e.g. `chr1_500`,
//! and covers the half-open interval `(end - bin_size, end]`. In 1-based
//! inclusive coordinates (what the read source is queried with) that is
//! `[end - bin_size + 1, end]`.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;

use crate::{error::MethBinsError, Position};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Bin {
    pub seqname: String,
    pub end: Position,
}

impl Bin {
    pub fn new(seqname: impl Into<String>, end: Position) -> Self {
        Self {
            seqname: seqname.into(),
            end,
        }
    }

    /// The 1-based, inclusive `(start, end)` interval of this bin.
    ///
    /// A bin whose end is smaller than `bin_size` (only possible for
    /// hand-made bins) is clamped to start at 1.
    pub fn interval(&self, bin_size: Position) -> (Position, Position) {
        let start = self.end.saturating_sub(bin_size).saturating_add(1);
        (start, self.end)
    }
}

impl fmt::Display for Bin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.seqname, self.end)
    }
}

impl FromStr for Bin {
    type Err = MethBinsError;

    /// Parse a `seqname_end` token. The *last* underscore separates the end
    /// coordinate, so sequence names like `chrUn_KI270302v1` still parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (seqname, end) = s
            .rsplit_once('_')
            .ok_or_else(|| MethBinsError::InvalidConfig(format!("invalid bin id '{}'", s)))?;
        if seqname.is_empty() {
            return Err(MethBinsError::InvalidConfig(format!(
                "invalid bin id '{}': empty sequence name",
                s
            )));
        }
        Ok(Bin::new(seqname, end.parse()?))
    }
}

/// Tile every sequence in `seqlens` into consecutive bins of `bin_size`.
///
/// Bin ends run `bin_size, 2 * bin_size, ...` for as long as they are below
/// `length + bin_size`, giving `ceil(length / bin_size)` bins. The last bin
/// can extend past the end of the sequence.
///
/// # Examples
///
/// ```
/// use methbins::prelude::*;
///
/// let sl = methbins::seqlens!("chrT" => 250);
/// let bins = generate_bins(&sl, 100).unwrap();
/// let ids: Vec<String> = bins["chrT"].iter().map(|bin| bin.to_string()).collect();
/// assert_eq!(ids, vec!["chrT_100", "chrT_200", "chrT_300"]);
/// ```
pub fn generate_bins(
    seqlens: &IndexMap<String, Position>,
    bin_size: Position,
) -> Result<IndexMap<String, Vec<Bin>>, MethBinsError> {
    if bin_size == 0 {
        return Err(MethBinsError::InvalidConfig(
            "bin size must be a positive integer".to_string(),
        ));
    }

    let mut all_bins = IndexMap::new();
    for (seqname, len) in seqlens {
        // u64 so that `len + bin_size` cannot overflow for long sequences
        let limit = *len as u64 + bin_size as u64;
        let mut bins = Vec::with_capacity((*len / bin_size) as usize + 1);
        let mut end = bin_size as u64;
        while end < limit {
            let end_position = Position::try_from(end).map_err(|_| {
                MethBinsError::InvalidConfig(format!(
                    "bin end {} on '{}' overflows the position type",
                    end, seqname
                ))
            })?;
            bins.push(Bin::new(seqname.clone(), end_position));
            end += bin_size as u64;
        }
        all_bins.insert(seqname.clone(), bins);
    }
    Ok(all_bins)
}
